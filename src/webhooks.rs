use rocket::{
    catchers,
    figment::Provider,
    http::Status,
    response::{self, Responder},
    routes, Build, Request, Rocket,
};
use thiserror::Error;
use tracing::{error, warn};

use crate::{
    bot::Notifier,
    config::WebhookSecret,
    locale::{Locales, TemplateMissing},
};

pub mod github;
pub use github::github_webhook;

/// The notifier webhook handlers post their messages with.
pub struct Notifications(pub Box<dyn Notifier>);

/// Everything that can go wrong once a payload passed the signature gate.
///
/// GitHub only ever sees a bare 500, details go to the logs.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("payload isn't valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("payload is missing expected fields: {0}")]
    MissingFields(#[source] serde_json::Error),
    #[error(transparent)]
    TemplateMissing(#[from] TemplateMissing),
}

impl<'r> Responder<'r, 'static> for WebhookError {
    fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
        match self {
            Self::InvalidJson(_) | Self::MissingFields(_) => {
                warn!("rejecting webhook payload: {}", self)
            }
            Self::TemplateMissing(_) => error!("couldn't render message: {}", self),
        }

        (Status::InternalServerError, SERVER_ERROR).respond_to(request)
    }
}

const SERVER_ERROR: &str = "Server error";

#[rocket::catch(401)]
fn unauthorized() -> &'static str {
    "Invalid signature"
}

#[rocket::catch(404)]
fn not_found() -> &'static str {
    "Not found"
}

#[rocket::catch(500)]
fn server_error() -> &'static str {
    SERVER_ERROR
}

/// Anything else Rocket comes up with (bad request, payload too large...) is a server error as
/// far as GitHub is concerned.
#[rocket::catch(default)]
fn other_error(status: Status, _request: &Request) -> (Status, &'static str) {
    warn!("answering {} with a server error", status);
    (Status::InternalServerError, SERVER_ERROR)
}

pub fn build<T: Provider>(
    figment: T,
    secret: WebhookSecret,
    locales: Locales,
    notifier: Box<dyn Notifier>,
) -> Rocket<Build> {
    rocket::custom(figment)
        .mount("/", routes![github_webhook])
        .register(
            "/",
            catchers![unauthorized, not_found, server_error, other_error],
        )
        .manage(secret)
        .manage(locales)
        .manage(Notifications(notifier))
}
