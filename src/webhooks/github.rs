use std::{convert::Infallible, fmt::Display};

use rocket::{
    http::Status,
    request::{FromRequest, Outcome},
    Request, State,
};
use serde_json::Value;
use tracing::{debug, info, trace};

mod signing;
pub use signing::SignedGitHubPayload;

mod events;
pub use events::*;

use crate::{
    bot::render_star_event,
    locale::Locales,
    webhooks::{Notifications, WebhookError},
};

const X_GITHUB_EVENT: &str = "X-GitHub-Event";

#[rocket::post("/webhook", data = "<payload>")]
pub async fn github_webhook(
    _path: ExactPath,
    event: GitHubEventType,
    payload: SignedGitHubPayload,
    locales: &State<Locales>,
    notifications: &State<Notifications>,
) -> Result<&'static str, WebhookError> {
    // the payload went through the signature gate, it's fine to look at it now
    let payload: Value = serde_json::from_slice(&payload.0).map_err(WebhookError::InvalidJson)?;
    let action = payload.get("action").and_then(Value::as_str);
    info!("received {} event with action {:?}", event, action);

    match event {
        GitHubEventType::Star => {}
        GitHubEventType::Ping => {
            let zen = payload.get("zen").and_then(Value::as_str);
            info!("GitHub says hi: {:?}", zen);
            return Ok("ok");
        }
        GitHubEventType::Other(_) | GitHubEventType::Missing => {
            debug!("event isn't announced, ignoring it");
            return Ok("ok");
        }
    }

    if action.and_then(StarAction::from_action).is_none() {
        debug!("star action isn't announced, ignoring it");
        return Ok("ok");
    }

    let event: StarEvent = serde_json::from_value(payload).map_err(WebhookError::MissingFields)?;
    let message = render_star_event(&event, locales)?;

    let result = notifications.0.send(&message).await;
    // delivery failures don't concern GitHub, the notifier already logged them
    if result.success {
        trace!("announced star by {}", event.sender.login);
    } else {
        debug!(
            "star by {} wasn't announced ({:?}): {:?}",
            event.sender.login, result.status_code, result.detail
        );
    }

    Ok("ok")
}

/// Only `/webhook` itself is served: a request with a query string falls through to a 404.
pub struct ExactPath;

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ExactPath {
    type Error = Infallible;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match request.uri().query() {
            Some(_) => {
                trace!("query string on webhook endpoint, forwarding");
                Outcome::Forward(Status::NotFound)
            }
            None => Outcome::Success(ExactPath),
        }
    }
}

/// Value of the `X-GitHub-Event` header.
#[derive(Debug, PartialEq, Eq)]
pub enum GitHubEventType {
    Star,
    Ping,
    Other(String),
    Missing,
}

impl Display for GitHubEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Star => f.write_str("star"),
            Self::Ping => f.write_str("ping"),
            Self::Other(event) => f.write_str(event),
            Self::Missing => f.write_str("<no event type>"),
        }
    }
}

impl From<Option<&str>> for GitHubEventType {
    fn from(header: Option<&str>) -> Self {
        match header {
            Some("star") => Self::Star,
            Some("ping") => Self::Ping,
            Some(event) => Self::Other(event.to_owned()),
            None => Self::Missing,
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for GitHubEventType {
    type Error = Infallible;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        // unknown or missing events aren't errors, they're simply not announced
        Outcome::Success(request.headers().get_one(X_GITHUB_EVENT).into())
    }
}
