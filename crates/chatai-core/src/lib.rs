//! ChatAI core — OneBot protocol types, message bus, configuration, utilities.
//!
//! - **onebot**: segments, message events, echo responses, outbound actions
//! - **bus**: `MessageBus` connecting the platform channel and the dispatcher
//! - **config**: JSON config schema + loader with env overrides
//! - **utils**: path helpers and string utilities

pub mod bus;
pub mod config;
pub mod onebot;
pub mod utils;
