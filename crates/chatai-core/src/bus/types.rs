//! Bus event types — what flows between the platform channel and the dispatcher.

use crate::onebot::{Action, EchoResponse, MessageEvent};

/// Something the platform delivered to us.
#[derive(Clone, Debug)]
pub enum InboundEvent {
    /// A chat message.
    Message(MessageEvent),
    /// The response to an action we sent with an `echo` tag.
    Echo(EchoResponse),
}

impl InboundEvent {
    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            InboundEvent::Message(_) => "message",
            InboundEvent::Echo(_) => "echo",
        }
    }
}

/// An action on its way to the platform.
pub type OutboundAction = Action;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onebot::{ReplyTarget, Segment};

    #[test]
    fn test_inbound_kind() {
        let msg = InboundEvent::Message(MessageEvent::private(1, 2, vec![Segment::text("hi")]));
        assert_eq!(msg.kind(), "message");

        let echo = InboundEvent::Echo(EchoResponse::default());
        assert_eq!(echo.kind(), "echo");
    }

    #[test]
    fn test_outbound_alias() {
        let action: OutboundAction = Action::send_text(ReplyTarget::Private(1), "ok");
        assert_eq!(action.name(), "send_msg");
    }
}
