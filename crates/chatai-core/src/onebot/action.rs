//! Outbound OneBot v11 actions.
//!
//! Serialized as `{"action": "...", "params": {...}, "echo": "..."}`.

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use super::event::{MessageKind, ReplyTarget};
use super::segment::{render_cq, Segment};

/// An action request sent to the host platform.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Action {
    #[serde(flatten)]
    pub request: ActionRequest,
    /// Tag returned verbatim in the action's response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub echo: Option<String>,
}

/// The supported actions and their parameters.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "action", content = "params", rename_all = "snake_case")]
pub enum ActionRequest {
    SendMsg(SendMsg),
    SendGroupForwardMsg(SendGroupForwardMsg),
    GetMsg(GetMsg),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SendMsg {
    pub message_type: MessageKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<i64>,
    pub message: Vec<Segment>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SendGroupForwardMsg {
    pub group_id: i64,
    pub messages: Vec<ForwardNode>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GetMsg {
    pub message_id: i64,
}

/// One virtual message inside a forwarded conversation.
#[derive(Clone, Debug, PartialEq)]
pub struct ForwardNode {
    pub name: String,
    pub uin: i64,
    pub content: Vec<Segment>,
}

impl Serialize for ForwardNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Data<'a> {
            name: &'a str,
            uin: i64,
            content: &'a [Segment],
        }

        let mut node = serializer.serialize_struct("ForwardNode", 2)?;
        node.serialize_field("type", "node")?;
        node.serialize_field(
            "data",
            &Data {
                name: &self.name,
                uin: self.uin,
                content: &self.content,
            },
        )?;
        node.end()
    }
}

impl Action {
    /// `send_msg` to a private chat or group.
    pub fn send(target: ReplyTarget, message: Vec<Segment>) -> Self {
        let params = match target {
            ReplyTarget::Private(user_id) => SendMsg {
                message_type: MessageKind::Private,
                user_id: Some(user_id),
                group_id: None,
                message,
            },
            ReplyTarget::Group(group_id) => SendMsg {
                message_type: MessageKind::Group,
                user_id: None,
                group_id: Some(group_id),
                message,
            },
        };
        Action {
            request: ActionRequest::SendMsg(params),
            echo: None,
        }
    }

    /// `send_msg` with a single text segment.
    pub fn send_text(target: ReplyTarget, text: impl Into<String>) -> Self {
        Self::send(target, vec![Segment::text(text)])
    }

    /// `send_group_forward_msg`.
    pub fn group_forward(group_id: i64, messages: Vec<ForwardNode>) -> Self {
        Action {
            request: ActionRequest::SendGroupForwardMsg(SendGroupForwardMsg {
                group_id,
                messages,
            }),
            echo: None,
        }
    }

    /// `get_msg` tagged with `echo` so the response can be correlated.
    pub fn get_msg(message_id: i64, echo: impl Into<String>) -> Self {
        Action {
            request: ActionRequest::GetMsg(GetMsg { message_id }),
            echo: Some(echo.into()),
        }
    }

    /// Action name as sent on the wire.
    pub fn name(&self) -> &'static str {
        match self.request {
            ActionRequest::SendMsg(_) => "send_msg",
            ActionRequest::SendGroupForwardMsg(_) => "send_group_forward_msg",
            ActionRequest::GetMsg(_) => "get_msg",
        }
    }

    /// Short human-readable summary for logs and the CLI.
    pub fn summary(&self) -> String {
        match &self.request {
            ActionRequest::SendMsg(p) => render_cq(&p.message),
            ActionRequest::SendGroupForwardMsg(p) => p
                .messages
                .iter()
                .map(|node| format!("[{}] {}", node.name, render_cq(&node.content)))
                .collect::<Vec<_>>()
                .join("\n"),
            ActionRequest::GetMsg(p) => format!("get_msg {}", p.message_id),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
