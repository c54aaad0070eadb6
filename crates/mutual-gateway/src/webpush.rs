use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::trace;

use mutual_types::events::PushPayload;
use mutual_types::models::PushSubscription;

use crate::notifier::{DeliveryResult, PushTransport};

/// Seconds the push service should hold an undelivered notification.
const PUSH_TTL_SECS: u32 = 24 * 60 * 60;

/// Posts the JSON payload straight to the subscription endpoint.
pub struct HttpPushTransport {
    client: reqwest::Client,
}

impl HttpPushTransport {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PushTransport for HttpPushTransport {
    async fn send(&self, subscription: &PushSubscription, payload: &PushPayload) -> DeliveryResult {
        let response = self
            .client
            .post(&subscription.endpoint)
            .header("TTL", PUSH_TTL_SECS.to_string())
            .json(payload)
            .send()
            .await;

        match response {
            Ok(resp) => {
                let status = resp.status();
                trace!("Push to {} answered {}", subscription.endpoint, status);
                classify_status(status)
            }
            Err(e) => DeliveryResult::TransientError(e.to_string()),
        }
    }
}

/// 404 and 410 mean the subscription is dead for good; everything else that
/// is not a success may work on a later attempt.
pub fn classify_status(status: StatusCode) -> DeliveryResult {
    if status.is_success() {
        DeliveryResult::Ok
    } else if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
        DeliveryResult::Gone
    } else {
        DeliveryResult::TransientError(format!("push service returned {}", status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses_are_gone() {
        assert_eq!(classify_status(StatusCode::GONE), DeliveryResult::Gone);
        assert_eq!(classify_status(StatusCode::NOT_FOUND), DeliveryResult::Gone);
    }

    #[test]
    fn other_failures_are_transient() {
        assert_eq!(classify_status(StatusCode::CREATED), DeliveryResult::Ok);
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            DeliveryResult::TransientError(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY),
            DeliveryResult::TransientError(_)
        ));
    }
}
