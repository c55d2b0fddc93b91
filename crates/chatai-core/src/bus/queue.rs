//! Two bounded mpsc queues: OneBot frames in, OneBot actions out.

use super::types::{InboundEvent, OutboundAction};
use tokio::sync::mpsc;

/// The message bus connecting the platform channel ↔ dispatcher.
///
/// - The channel publishes to `inbound` (messages and echo responses)
/// - The dispatcher consumes from `inbound` and publishes actions to `outbound`
/// - The channel manager consumes from `outbound` and writes them to the platform
pub struct MessageBus {
    inbound_tx: mpsc::Sender<InboundEvent>,
    inbound_rx: tokio::sync::Mutex<mpsc::Receiver<InboundEvent>>,
    outbound_tx: mpsc::Sender<OutboundAction>,
    outbound_rx: tokio::sync::Mutex<mpsc::Receiver<OutboundAction>>,
}

impl MessageBus {
    /// Both queues get `capacity` slots; publishers wait when one is full.
    pub fn new(capacity: usize) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity);
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);

        MessageBus {
            inbound_tx,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
            outbound_tx,
            outbound_rx: tokio::sync::Mutex::new(outbound_rx),
        }
    }

    /// Publish an event from the platform (inbound).
    pub async fn publish_inbound(
        &self,
        event: InboundEvent,
    ) -> Result<(), mpsc::error::SendError<InboundEvent>> {
        self.inbound_tx.send(event).await
    }

    /// Next inbound event; `None` once the queue is closed.
    pub async fn consume_inbound(&self) -> Option<InboundEvent> {
        self.inbound_rx.lock().await.recv().await
    }

    /// Publish an action for the platform (outbound).
    pub async fn publish_outbound(
        &self,
        action: OutboundAction,
    ) -> Result<(), mpsc::error::SendError<OutboundAction>> {
        self.outbound_tx.send(action).await
    }

    pub async fn consume_outbound(&self) -> Option<OutboundAction> {
        self.outbound_rx.lock().await.recv().await
    }

    /// Take an outbound action if one is queued, without waiting.
    pub async fn try_consume_outbound(&self) -> Option<OutboundAction> {
        self.outbound_rx.lock().await.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onebot::{Action, EchoResponse, MessageEvent, ReplyTarget, Segment};

    fn message(id: i64, text: &str) -> InboundEvent {
        InboundEvent::Message(MessageEvent::private(id, 1, vec![Segment::text(text)]))
    }

    #[tokio::test]
    async fn test_inbound_flow() {
        let bus = MessageBus::new(10);

        bus.publish_inbound(message(1, "!ask hello")).await.unwrap();

        match bus.consume_inbound().await.unwrap() {
            InboundEvent::Message(event) => assert_eq!(event.raw_message, "!ask hello"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_outbound_flow() {
        let bus = MessageBus::new(10);

        bus.publish_outbound(Action::send_text(ReplyTarget::Group(5), "answer"))
            .await
            .unwrap();

        let received = bus.consume_outbound().await.unwrap();
        assert_eq!(received.name(), "send_msg");
        assert_eq!(received.summary(), "answer");
    }

    #[tokio::test]
    async fn test_try_consume_empty() {
        let bus = MessageBus::new(10);
        assert!(bus.try_consume_outbound().await.is_none());
    }

    #[tokio::test]
    async fn test_event_ordering() {
        let bus = MessageBus::new(10);

        bus.publish_inbound(message(1, "first")).await.unwrap();
        bus.publish_inbound(InboundEvent::Echo(EchoResponse {
            echo: "gemini|1".into(),
            ..Default::default()
        }))
        .await
        .unwrap();

        assert_eq!(bus.consume_inbound().await.unwrap().kind(), "message");
        assert_eq!(bus.consume_inbound().await.unwrap().kind(), "echo");
    }

    #[tokio::test]
    async fn test_concurrent_publishers() {
        let bus = std::sync::Arc::new(MessageBus::new(10));

        let handles: Vec<_> = [1, 2]
            .into_iter()
            .map(|id| {
                let bus = bus.clone();
                tokio::spawn(async move { bus.publish_inbound(message(id, "hi")).await.unwrap() })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let mut ids = Vec::new();
        for _ in 0..2 {
            if let Some(InboundEvent::Message(event)) = bus.consume_inbound().await {
                ids.push(event.message_id);
            }
        }
        ids.sort();
        assert_eq!(ids, vec![1, 2]);
    }
}
