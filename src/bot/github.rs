use std::collections::HashMap;

use tracing::trace;

use crate::{
    locale::{Locales, TemplateMissing},
    webhooks::github::StarEvent,
};

pub fn render_star_event(event: &StarEvent, locales: &Locales) -> Result<String, TemplateMissing> {
    trace!("rendering star event");
    let action = event.action.as_str();

    let emoji = locales.text(&format!("star.emoji.{}", action))?;
    let prefix = locales.text(&format!("star.prefix.{}", action))?;

    let fields = HashMap::from([
        ("emoji", emoji),
        ("prefix", prefix),
        ("repo", event.repository.full_name()),
        ("starrer", event.sender.login.clone()),
        ("count", event.repository.stargazers_count.to_string()),
    ]);

    locales.render("star.message", &fields)
}
