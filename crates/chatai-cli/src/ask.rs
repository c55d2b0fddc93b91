//! `chatai ask` — dispatch one message without a OneBot connection.
//!
//! The message goes through the same router, providers and reply shaping as
//! the gateway. Actions the dispatcher queues on the bus (progress notices)
//! are printed before the answer.

use std::sync::Arc;

use anyhow::Result;
use colored::Colorize;
use tracing::debug;

use chatai_core::bus::queue::MessageBus;
use chatai_core::config::Config;
use chatai_core::onebot::{MessageEvent, Segment, Sender};
use chatai_dispatch::{DispatchResult, Dispatcher};

use crate::helpers;

const LOCAL_MESSAGE_ID: i64 = 1;

fn build_event(message: &str, user: i64, group: Option<i64>) -> MessageEvent {
    let segments = vec![Segment::text(message)];
    match group {
        Some(group_id) => MessageEvent::group(
            LOCAL_MESSAGE_ID,
            group_id,
            Sender {
                user_id: user,
                nickname: format!("user{user}"),
                card: None,
            },
            segments,
        ),
        None => MessageEvent::private(LOCAL_MESSAGE_ID, user, segments),
    }
}

pub async fn run(config: &Config, message: &str, user: i64, group: Option<i64>) -> Result<()> {
    let bus = Arc::new(MessageBus::new(16));
    let dispatcher = Dispatcher::from_config(bus.clone(), &config.chat_ai);

    let event = build_event(message, user, group);
    debug!(words = ?event.words(), "dispatching local message");
    let result = dispatcher.handle(&event).await;

    while let Some(action) = bus.try_consume_outbound().await {
        println!("{} {}", "»".dimmed(), action.summary());
    }

    match result {
        DispatchResult::Answered { answer, action } => {
            debug!(action = action.name(), "answer shaped");
            helpers::print_answer(&answer);
        }
        DispatchResult::Suspended { .. } => {
            println!("  Quoted-message lookups need a live chat; use `chatai gateway`.");
        }
        DispatchResult::Ignored => {
            if !config.chat_ai.enable {
                println!("  The plugin is disabled (chatAi.enable = false).");
            } else {
                let mut args: Vec<_> = dispatcher
                    .router()
                    .recognized_args()
                    .into_iter()
                    .collect();
                args.sort_unstable();
                if args.is_empty() {
                    println!("  No provider is active. See `chatai status`.");
                } else {
                    println!("  No provider matched. Known trigger args: {}", args.join(" "));
                    println!("  A message needs a trigger arg plus at least one more word.");
                }
            }
        }
    }

    Ok(())
}
