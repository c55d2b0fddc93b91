//! Message bus between the platform channel and the dispatcher.

pub mod queue;
pub mod types;

pub use queue::MessageBus;
pub use types::{InboundEvent, OutboundAction};
