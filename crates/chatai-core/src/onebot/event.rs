//! Inbound OneBot v11 payloads — message events and action responses.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::segment::{render_cq, Segment};

/// Whether a message came from a private chat or a group.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Private,
    Group,
}

/// Sender info attached to message events.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Sender {
    #[serde(default)]
    pub user_id: i64,
    #[serde(default)]
    pub nickname: String,
    /// Group card (display name inside the group), empty when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card: Option<String>,
}

impl Sender {
    /// Name shown to other members: group card if set, else nickname.
    pub fn display_name(&self) -> &str {
        match self.card.as_deref() {
            Some(card) if !card.is_empty() => card,
            _ => &self.nickname,
        }
    }
}

/// Where a reply should be delivered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplyTarget {
    Private(i64),
    Group(i64),
}

/// A `post_type = "message"` event, also the shape of `get_msg` response data.
///
/// Every field is defaulted: `get_msg` responses omit `self_id` and sometimes
/// `user_id`, so a partially filled event is normal.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageEvent {
    #[serde(default)]
    pub self_id: i64,
    #[serde(default)]
    pub message_id: i64,
    #[serde(default)]
    pub message_type: MessageKind,
    #[serde(default)]
    pub user_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<i64>,
    #[serde(default)]
    pub sender: Sender,
    #[serde(default)]
    pub message: Vec<Segment>,
    #[serde(default)]
    pub raw_message: String,
}

impl MessageEvent {
    /// Build a private message event (used by the CLI and tests).
    pub fn private(message_id: i64, user_id: i64, message: Vec<Segment>) -> Self {
        let raw_message = render_cq(&message);
        MessageEvent {
            message_id,
            message_type: MessageKind::Private,
            user_id,
            sender: Sender {
                user_id,
                nickname: format!("user{user_id}"),
                card: None,
            },
            message,
            raw_message,
            ..Default::default()
        }
    }

    /// Build a group message event.
    pub fn group(
        message_id: i64,
        group_id: i64,
        sender: Sender,
        message: Vec<Segment>,
    ) -> Self {
        let raw_message = render_cq(&message);
        MessageEvent {
            message_id,
            message_type: MessageKind::Group,
            user_id: sender.user_id,
            group_id: Some(group_id),
            sender,
            message,
            raw_message,
            ..Default::default()
        }
    }

    pub fn is_group(&self) -> bool {
        self.message_type == MessageKind::Group && self.group_id.is_some()
    }

    /// Addressing context for replies to this message.
    pub fn reply_target(&self) -> ReplyTarget {
        match self.group_id {
            Some(group_id) if self.message_type == MessageKind::Group => {
                ReplyTarget::Group(group_id)
            }
            _ => {
                let user_id = if self.user_id != 0 {
                    self.user_id
                } else {
                    self.sender.user_id
                };
                ReplyTarget::Private(user_id)
            }
        }
    }

    /// Whitespace-delimited words of the message.
    ///
    /// Text segments contribute their words; any other segment is one word
    /// (its CQ code), so a quote glued to a trigger still leaves the trigger
    /// as a word of its own. Falls back to `raw_message` without segments.
    pub fn words(&self) -> Vec<String> {
        if self.message.is_empty() {
            return self.raw_message.split_whitespace().map(String::from).collect();
        }
        self.message
            .iter()
            .flat_map(|segment| match segment {
                Segment::Text { text } => text.split_whitespace().map(String::from).collect(),
                other => vec![other.to_cq_code()],
            })
            .collect()
    }
}

/// Response to an action sent with an `echo` tag.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EchoResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub retcode: i64,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub echo: String,
    /// Error description from some implementations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wording: Option<String>,
}

impl EchoResponse {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }

    /// Split the echo tag into `(namespace, token)`, e.g. `gemini|123`.
    pub fn tag(&self) -> Option<(&str, &str)> {
        self.echo.split_once('|')
    }

    /// Decode `data` as a message (the `get_msg` response shape).
    pub fn message(&self) -> Option<MessageEvent> {
        self.data
            .as_ref()
            .and_then(|data| serde_json::from_value(data.clone()).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_group_event_from_json() {
        let event: MessageEvent = serde_json::from_value(json!({
            "post_type": "message",
            "message_type": "group",
            "self_id": 10000,
            "message_id": 77,
            "group_id": 123456,
            "user_id": 42,
            "sender": {"user_id": 42, "nickname": "alice", "card": ""},
            "message": [{"type": "text", "data": {"text": "!ask what is 2+2"}}],
            "raw_message": "!ask what is 2+2"
        }))
        .unwrap();

        assert!(event.is_group());
        assert_eq!(event.reply_target(), ReplyTarget::Group(123456));
        assert_eq!(event.sender.display_name(), "alice");
        assert_eq!(event.words(), vec!["!ask", "what", "is", "2+2"]);
    }

    #[test]
    fn test_private_target_falls_back_to_sender() {
        let event: MessageEvent = serde_json::from_value(json!({
            "message_type": "private",
            "sender": {"user_id": 99, "nickname": "bob"},
            "message": []
        }))
        .unwrap();
        assert_eq!(event.reply_target(), ReplyTarget::Private(99));
    }

    #[test]
    fn test_words_split_segments() {
        let event = MessageEvent {
            message: vec![Segment::reply(555), Segment::text("!gemini what"), Segment::image("a.png")],
            raw_message: "[CQ:reply,id=555]!gemini what[CQ:image,file=a.png]".into(),
            ..Default::default()
        };
        assert_eq!(
            event.words(),
            vec!["[CQ:reply,id=555]", "!gemini", "what", "[CQ:image,file=a.png]"]
        );

        let event = MessageEvent {
            raw_message: "only raw text".into(),
            ..Default::default()
        };
        assert_eq!(event.words().len(), 3);
    }

    #[test]
    fn test_display_name_prefers_card() {
        let sender = Sender {
            user_id: 1,
            nickname: "nick".into(),
            card: Some("Card".into()),
        };
        assert_eq!(sender.display_name(), "Card");
    }

    #[test]
    fn test_echo_response() {
        let echo: EchoResponse = serde_json::from_value(json!({
            "status": "ok",
            "retcode": 0,
            "data": {
                "message_id": 555,
                "message_type": "group",
                "group_id": 1,
                "sender": {"user_id": 5, "nickname": "carol"},
                "message": [{"type": "text", "data": {"text": "earlier"}}]
            },
            "echo": "gemini|77"
        }))
        .unwrap();

        assert!(echo.is_ok());
        assert_eq!(echo.tag(), Some(("gemini", "77")));
        let msg = echo.message().unwrap();
        assert_eq!(msg.message_id, 555);
        assert_eq!(msg.message[0].as_text(), Some("earlier"));
    }

    #[test]
    fn test_failed_echo() {
        let echo: EchoResponse = serde_json::from_value(json!({
            "status": "failed",
            "retcode": 100,
            "data": null,
            "echo": "gemini|1"
        }))
        .unwrap();
        assert!(!echo.is_ok());
        assert!(echo.message().is_none());
    }
}
