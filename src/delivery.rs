/// Webhook notification delivery.
///
/// Posts each escalation `Notification` as JSON to a single incoming
/// webhook. A 429 is honoured once using `Retry-After`; any other non-2xx
/// is a delivery failure and the escalation engine leaves it unrecorded.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use tracing::{debug, warn};

use crate::alert::escalation::Notification;
use crate::model::DeliveryError;

/// Wait used when a 429 carries no usable `Retry-After`.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

/// Longest rate-limit wait honoured before giving up on a message.
pub const MAX_RETRY_AFTER_SECS: u64 = 60;

pub struct WebhookDelivery {
    client: Client,
    url: String,
}

impl WebhookDelivery {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self { client, url: url.into() }
    }

    pub fn send(&self, notification: &Notification) -> Result<(), DeliveryError> {
        let response = self.post(notification)?;
        if response.status() != StatusCode::TOO_MANY_REQUESTS {
            return check_status(&response);
        }

        let wait = retry_after_secs(response.headers());
        if wait > MAX_RETRY_AFTER_SECS {
            return Err(DeliveryError::RateLimited(wait));
        }
        warn!(market = %notification.short_name, wait, "webhook rate limited, retrying once");
        std::thread::sleep(Duration::from_secs(wait));

        let retry = self.post(notification)?;
        if retry.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(DeliveryError::RateLimited(retry_after_secs(retry.headers())));
        }
        check_status(&retry)
    }

    fn post(&self, notification: &Notification) -> Result<Response, DeliveryError> {
        debug!(market = %notification.short_name, level = %notification.level, "posting notification");
        Ok(self.client.post(&self.url).json(notification).send()?)
    }
}

fn check_status(response: &Response) -> Result<(), DeliveryError> {
    if response.status().is_success() {
        Ok(())
    } else {
        Err(DeliveryError::Status(response.status().as_u16()))
    }
}

/// `Retry-After` in whole seconds. HTTP-date values and garbage fall back
/// to `DEFAULT_RETRY_AFTER_SECS`.
pub fn retry_after_secs(headers: &HeaderMap) -> u64 {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
}
