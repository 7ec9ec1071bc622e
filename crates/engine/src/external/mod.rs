//! Seams for the collaborators outside this crate's scope
//!
//! Push delivery and payment-intent lookup are real services in
//! production; the engine only depends on these traits so deployments
//! and tests can plug in whatever they have.

use async_trait::async_trait;
use turfpoint_core::Result;

/// Where a payment intent stands with the processor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentIntentStatus {
    /// Settled; `points` is what the intent bought
    Succeeded { points: i64 },
    Pending,
    Failed,
}

/// Push notification delivery.
///
/// The engine fires and forgets: delivery failures are logged by the
/// caller and never fail the action that triggered the notification.
#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(
        &self,
        token: &str,
        title: &str,
        body: &str,
        data: serde_json::Value,
    ) -> Result<()>;
}

/// Payment processor lookup; the whole contract is intent id to status
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn intent_status(&self, intent_id: &str) -> Result<PaymentIntentStatus>;
}

/// Push sender that drops everything (deployments without push, tests)
pub struct NoopPushSender;

#[async_trait]
impl PushSender for NoopPushSender {
    async fn send(
        &self,
        _token: &str,
        _title: &str,
        _body: &str,
        _data: serde_json::Value,
    ) -> Result<()> {
        Ok(())
    }
}
