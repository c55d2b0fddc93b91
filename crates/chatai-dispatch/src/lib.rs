//! Dispatch layer for ChatAI.
//!
//! - [`router::ProviderRouter`] — picks a provider from trigger args
//! - [`correlator::ReplyCorrelator`] — parked requests waiting for a quoted message
//! - [`dispatcher::Dispatcher`] — handle / suspend / resume, and the bus loop
//! - [`spacing`] — CJK/half-width spacing for answers

pub mod correlator;
pub mod dispatcher;
pub mod router;
pub mod spacing;

pub use correlator::{PendingReply, ReplyCorrelator};
pub use dispatcher::{DispatchError, DispatchOptions, DispatchResult, Dispatcher};
pub use router::{ProviderRouter, Route};
