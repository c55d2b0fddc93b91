//! Dispatcher — routes chat messages to AI providers and shapes the replies.
//!
//! # Flow
//! 1. `handle`: tokenize, strip trigger args from the first text segment,
//!    route, then either answer or (vision provider quoting a message)
//!    suspend behind a `get_msg` lookup.
//! 2. `resume`: the lookup's echo arrives, the parked request is claimed,
//!    the quoted message's segments are appended and the vision provider
//!    answers.
//!
//! Provider failures are typed until the very end, where their text becomes
//! the reply. Nothing escapes a dispatch task.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, error, info, trace, warn};

use chatai_core::bus::queue::MessageBus;
use chatai_core::bus::types::InboundEvent;
use chatai_core::config::ChatAiConfig;
use chatai_core::onebot::{Action, EchoResponse, ForwardNode, MessageEvent, Segment};
use chatai_providers::{
    create_providers, ChatProvider, FetchedImage, ImageFetcher, ImageSource, ProviderKind,
    RegisteredProvider,
};

use crate::correlator::{PendingReply, ReplyCorrelator};
use crate::router::ProviderRouter;
use crate::spacing::spacing;

// ─────────────────────────────────────────────
// Results and errors
// ─────────────────────────────────────────────

/// Outcome of handling one inbound message or echo.
#[derive(Clone, Debug, PartialEq)]
pub enum DispatchResult {
    /// Not for us; nothing is sent.
    Ignored,
    /// Parked in the correlator; `lookup` must be sent to the platform.
    Suspended { token: String, lookup: Action },
    /// Final answer and the action delivering it.
    Answered { answer: String, action: Action },
}

impl DispatchResult {
    /// The action to publish, if any.
    pub fn action(&self) -> Option<&Action> {
        match self {
            DispatchResult::Ignored => None,
            DispatchResult::Suspended { lookup, .. } => Some(lookup),
            DispatchResult::Answered { action, .. } => Some(action),
        }
    }

    pub fn into_action(self) -> Option<Action> {
        match self {
            DispatchResult::Ignored => None,
            DispatchResult::Suspended { lookup, .. } => Some(lookup),
            DispatchResult::Answered { action, .. } => Some(action),
        }
    }
}

/// Why a lookup echo could not be resumed.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The platform rejected the `get_msg` lookup.
    #[error("Gemini reply args error")]
    LookupFailed { status: String, retcode: i64 },
    /// The echo is not a usable message payload.
    #[error("malformed lookup echo: {0}")]
    Protocol(String),
    /// No parked request under this token (unknown, claimed or expired).
    #[error("no pending reply for token {0}")]
    CorrelationMiss(String),
}

// ─────────────────────────────────────────────
// Options
// ─────────────────────────────────────────────

/// Output and behavior switches.
#[derive(Clone, Debug)]
pub struct DispatchOptions {
    pub enabled: bool,
    pub group_forward: bool,
    pub pan_gu: bool,
    pub forward_name: String,
    pub forward_uin: i64,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self::from(&ChatAiConfig::default())
    }
}

impl From<&ChatAiConfig> for DispatchOptions {
    fn from(config: &ChatAiConfig) -> Self {
        Self {
            enabled: config.enable,
            group_forward: config.group_forward,
            pan_gu: config.pan_gu,
            forward_name: config.forward_name.clone(),
            forward_uin: config.forward_uin,
        }
    }
}

/// Echo namespace for reply lookups (`gemini|<token>`).
pub fn lookup_namespace() -> &'static str {
    ProviderKind::Gemini.spec().name
}

// ─────────────────────────────────────────────
// Prompt building
// ─────────────────────────────────────────────

/// Remove whole-word trigger args from `text`.
pub fn strip_trigger_args(text: &str, args: &HashSet<&str>) -> String {
    text.split_inclusive(char::is_whitespace)
        .filter(|piece| !args.contains(piece.trim_end()))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Copy `segments` with trigger args stripped from the first text segment,
/// and join every text segment into the prompt.
pub fn build_prompt(segments: &[Segment], args: &HashSet<&str>) -> (Vec<Segment>, String) {
    let mut stripped = segments.to_vec();
    if let Some(Segment::Text { text }) = stripped
        .iter_mut()
        .find(|s| matches!(s, Segment::Text { .. }))
    {
        *text = strip_trigger_args(text, args);
    }

    let prompt = stripped
        .iter()
        .filter_map(Segment::as_text)
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string();

    (stripped, prompt)
}

/// First non-zero reply-chain reference.
fn reply_reference(segments: &[Segment]) -> Option<i64> {
    segments.iter().find_map(|s| match s {
        Segment::Reply { id } if *id != 0 => Some(*id),
        _ => None,
    })
}

// ─────────────────────────────────────────────
// Dispatcher
// ─────────────────────────────────────────────

pub struct Dispatcher {
    bus: Arc<MessageBus>,
    router: ProviderRouter,
    providers: HashMap<ProviderKind, Arc<dyn ChatProvider>>,
    correlator: Arc<ReplyCorrelator>,
    images: Arc<dyn ImageSource>,
    options: DispatchOptions,
}

impl Dispatcher {
    pub fn new(
        bus: Arc<MessageBus>,
        providers: Vec<RegisteredProvider>,
        correlator: Arc<ReplyCorrelator>,
        images: Arc<dyn ImageSource>,
        options: DispatchOptions,
    ) -> Self {
        let router = ProviderRouter::from_registered(&providers);
        let providers = providers
            .into_iter()
            .map(|p| (p.kind, p.provider))
            .collect();
        Self {
            bus,
            router,
            providers,
            correlator,
            images,
            options,
        }
    }

    /// Build everything from config: providers, HTTP image fetcher, correlator.
    pub fn from_config(bus: Arc<MessageBus>, config: &ChatAiConfig) -> Self {
        let providers = create_providers(config);
        info!(
            providers = ?providers.iter().map(|p| p.kind).collect::<Vec<_>>(),
            group_forward = config.group_forward,
            pan_gu = config.pan_gu,
            "Dispatcher configured"
        );
        Self::new(
            bus,
            providers,
            Arc::new(ReplyCorrelator::with_ttl_secs(config.pending_reply_ttl_secs)),
            Arc::new(ImageFetcher::new()),
            DispatchOptions::from(config),
        )
    }

    pub fn router(&self) -> &ProviderRouter {
        &self.router
    }

    pub fn correlator(&self) -> &Arc<ReplyCorrelator> {
        &self.correlator
    }

    /// Run the event loop: one task per inbound event, until the bus closes.
    pub async fn run(self: Arc<Self>) {
        info!("dispatcher started, waiting for events");
        while let Some(event) = self.bus.consume_inbound().await {
            let this = Arc::clone(&self);
            tokio::spawn(async move { this.process(event).await });
        }
        info!("inbound channel closed, dispatcher exiting");
    }

    /// Handle one inbound event and publish whatever it produces.
    pub async fn process(&self, event: InboundEvent) {
        let result = match &event {
            InboundEvent::Message(msg) => self.handle(msg).await,
            InboundEvent::Echo(echo) => match echo.tag() {
                Some((namespace, token)) if namespace == lookup_namespace() => {
                    self.resume(token, echo).await
                }
                _ => {
                    trace!(echo = %echo.echo, "Ignoring unrelated echo");
                    return;
                }
            },
        };

        if let Some(action) = result.into_action() {
            debug!(action = action.name(), "Publishing action");
            if let Err(e) = self.bus.publish_outbound(action).await {
                error!(error = %e, "failed to publish outbound action");
            }
        }
    }

    /// Dispatch a chat message.
    pub async fn handle(&self, event: &MessageEvent) -> DispatchResult {
        if !self.options.enabled {
            return DispatchResult::Ignored;
        }

        let words = event.words();
        let Some(kind) = self.router.select(&words) else {
            return DispatchResult::Ignored;
        };
        let Some(provider) = self.providers.get(&kind).cloned() else {
            warn!(provider = %kind, "Routed to a provider that is not built");
            return DispatchResult::Ignored;
        };

        let (segments, prompt) = build_prompt(&event.message, &self.router.recognized_args());
        let spec = kind.spec();
        debug!(
            provider = %kind,
            message_id = event.message_id,
            prompt = %chatai_core::utils::truncate_string(&prompt, 80),
            "Dispatching message"
        );

        if spec.reply_lookup {
            if let Some(reply_id) = reply_reference(&segments) {
                let (token, lookup) =
                    self.begin_lookup(event.message_id, reply_id, segments, prompt);
                return DispatchResult::Suspended { token, lookup };
            }
        }

        if let Some(notice) = spec.progress_notice {
            let action = Action::send_text(event.reply_target(), notice);
            if let Err(e) = self.bus.publish_outbound(action).await {
                warn!(error = %e, "failed to publish progress notice");
            }
        }

        let answer = self.invoke(provider.as_ref(), &prompt, &segments).await;
        let action = self.shape(event, &segments, &answer);
        DispatchResult::Answered { answer, action }
    }

    /// Resume a request parked by [`Dispatcher::begin_lookup`].
    pub async fn resume(&self, token: &str, echo: &EchoResponse) -> DispatchResult {
        if !self.options.enabled {
            return DispatchResult::Ignored;
        }

        let (pending, quoted) = match self.complete_lookup(token, echo) {
            Ok(found) => found,
            Err(err @ DispatchError::LookupFailed { .. }) => {
                warn!(token = %token, status = %echo.status, retcode = echo.retcode, "Reply lookup failed");
                // Without a payload there is nowhere to send the error.
                let Some(context) = echo.message() else {
                    return DispatchResult::Ignored;
                };
                let answer = err.to_string();
                let action = Action::send_text(context.reply_target(), answer.clone());
                return DispatchResult::Answered { answer, action };
            }
            Err(err) => {
                warn!(token = %token, error = %err, "Cannot resume reply lookup");
                return DispatchResult::Ignored;
            }
        };

        let Some(provider) = self.providers.get(&ProviderKind::Gemini).cloned() else {
            warn!(token = %token, "Vision provider not available for resume");
            return DispatchResult::Ignored;
        };

        let mut merged = pending.original_segments;
        merged.extend(quoted.message.iter().cloned());
        debug!(token = %token, segments = merged.len(), "Resuming reply lookup");

        let answer = self
            .invoke(provider.as_ref(), &pending.original_prompt, &merged)
            .await;
        let action = self.shape(&quoted, &merged, &answer);
        DispatchResult::Answered { answer, action }
    }

    /// Phase one of a reply lookup: park the request, build the `get_msg`.
    pub fn begin_lookup(
        &self,
        message_id: i64,
        reply_id: i64,
        segments: Vec<Segment>,
        prompt: String,
    ) -> (String, Action) {
        let token = message_id.to_string();
        self.correlator.insert(token.clone(), segments, prompt);
        debug!(token = %token, reply_id, pending = self.correlator.len(), "Suspended for reply lookup");
        let lookup = Action::get_msg(reply_id, format!("{}|{}", lookup_namespace(), token));
        (token, lookup)
    }

    /// Phase two: validate the echo and claim the parked request.
    ///
    /// The correlator is only touched once the echo is known to be usable.
    pub fn complete_lookup(
        &self,
        token: &str,
        echo: &EchoResponse,
    ) -> Result<(PendingReply, MessageEvent), DispatchError> {
        if !echo.is_ok() {
            return Err(DispatchError::LookupFailed {
                status: echo.status.clone(),
                retcode: echo.retcode,
            });
        }
        let quoted = echo
            .message()
            .ok_or_else(|| DispatchError::Protocol("echo carries no message".to_string()))?;
        let pending = self
            .correlator
            .claim(token)
            .ok_or_else(|| DispatchError::CorrelationMiss(token.to_string()))?;
        Ok((pending, quoted))
    }

    /// Call a provider; errors become the answer text.
    async fn invoke(&self, provider: &dyn ChatProvider, prompt: &str, segments: &[Segment]) -> String {
        let images = if provider.kind().spec().accepts_images {
            self.fetch_images(segments).await
        } else {
            Vec::new()
        };

        let answer = match provider.answer(prompt, &images).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(provider = provider.display_name(), error = %e, "Provider call failed");
                e.to_string()
            }
        };

        if self.options.pan_gu {
            spacing(&answer)
        } else {
            answer
        }
    }

    /// Fetch every image in `segments`, in order, skipping failures.
    async fn fetch_images(&self, segments: &[Segment]) -> Vec<FetchedImage> {
        let urls: Vec<&str> = segments.iter().filter_map(Segment::image_url).collect();
        let results = join_all(urls.iter().map(|url| self.images.fetch(url))).await;

        urls.iter()
            .zip(results)
            .filter_map(|(url, result)| match result {
                Ok(image) => Some(image),
                Err(e) => {
                    warn!(url = %url, error = %e, "Image processing error, skipping");
                    None
                }
            })
            .collect()
    }

    /// Build the reply action for `context` (the message that addresses it).
    fn shape(&self, context: &MessageEvent, segments: &[Segment], answer: &str) -> Action {
        match context.group_id {
            Some(group_id) if self.options.group_forward && context.is_group() => {
                let uin = if context.self_id != 0 {
                    context.self_id
                } else {
                    self.options.forward_uin
                };
                let mut question = vec![Segment::text(format!("@{}: ", context.sender.nickname))];
                question.extend(segments.iter().cloned());
                let nodes = vec![
                    ForwardNode {
                        name: self.options.forward_name.clone(),
                        uin,
                        content: question,
                    },
                    ForwardNode {
                        name: self.options.forward_name.clone(),
                        uin,
                        content: vec![Segment::text(answer)],
                    },
                ];
                Action::group_forward(group_id, nodes)
            }
            _ => Action::send_text(context.reply_target(), answer),
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
