use async_trait::async_trait;
use wadesk_identity::PhoneNumber;

use crate::error::ChatError;

/// Outbound text delivery to the WhatsApp gateway.
///
/// Implementations must be `Send + Sync` so one sender can serve every
/// conversation from multiple Tokio tasks.
#[async_trait]
pub trait OutboundSender: Send + Sync {
    /// Deliver `text` to `number`.
    ///
    /// Returns the provider-assigned message id when the gateway reports one.
    async fn send_text(&self, number: &PhoneNumber, text: &str) -> Result<Option<String>, ChatError>;
}
