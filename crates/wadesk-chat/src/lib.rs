pub mod content;
pub mod engine;
pub mod error;
pub mod sender;
pub mod types;

pub use content::normalize;
pub use engine::ChatEngine;
pub use error::ChatError;
pub use sender::OutboundSender;
pub use types::{MediaView, SendReceipt};
