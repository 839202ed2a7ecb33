//! Per-recipient isolated message delivery.

use crate::models::UserId;
use crate::transport::{ChatTransport, OutboundMessage};
use crate::{Error, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::instrument;

/// Delivers one message to many recipients.
///
/// Each delivery is attempted independently and bounded by a timeout. A
/// failing recipient is logged and counted, never propagated, and never stops
/// the remaining deliveries. A fixed delay separates consecutive sends.
pub struct NotificationFanout {
    transport: Arc<dyn ChatTransport>,
    delay: Duration,
    timeout: Duration,
}

impl NotificationFanout {
    /// Creates a fanout with the given inter-message delay and per-delivery timeout.
    #[must_use]
    pub fn new(transport: Arc<dyn ChatTransport>, delay: Duration, timeout: Duration) -> Self {
        Self {
            transport,
            delay,
            timeout,
        }
    }

    /// The underlying transport.
    #[must_use]
    pub fn transport(&self) -> &Arc<dyn ChatTransport> {
        &self.transport
    }

    /// Sends `message` to every recipient and returns how many succeeded.
    #[instrument(skip(self, recipients, message), fields(recipients = recipients.len()))]
    pub async fn broadcast(&self, recipients: &[UserId], message: &OutboundMessage) -> usize {
        let start = Instant::now();
        let mut delivered = 0;

        for (i, recipient) in recipients.iter().enumerate() {
            if i > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.deliver(*recipient, message).await.is_ok() {
                delivered += 1;
            }
        }

        let failed = recipients.len() - delivered;
        tracing::info!(
            delivered,
            failed,
            duration_ms = start.elapsed().as_millis(),
            "Fanout complete"
        );
        metrics::histogram!("fanout_duration_ms")
            .record(start.elapsed().as_secs_f64() * 1000.0);
        delivered
    }

    /// Sends `message` to one recipient. Returns whether it was delivered.
    pub async fn notify(&self, recipient: UserId, message: &OutboundMessage) -> bool {
        self.deliver(recipient, message).await.is_ok()
    }

    async fn deliver(&self, recipient: UserId, message: &OutboundMessage) -> Result<()> {
        let result = match tokio::time::timeout(self.timeout, self.transport.send(recipient, message)).await {
            Ok(result) => result,
            Err(_) => Err(Error::DeliveryFailed {
                recipient: recipient.to_string(),
                cause: format!("timed out after {}ms", self.timeout.as_millis()),
            }),
        };

        let status = if result.is_ok() { "success" } else { "error" };
        metrics::counter!("fanout_deliveries_total", "status" => status).increment(1);
        if let Err(e) = &result {
            tracing::warn!(recipient = %recipient, error = %e, "Delivery failed");
        }
        result
    }
}
