use serde::{Deserialize, Serialize};

use super::message::Message;

/// Editor surroundings attached to autocomplete-flavored requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeContext {
    /// Text before the cursor.
    pub before_cursor: String,
    /// Text after the cursor.
    pub after_cursor: String,
    pub filename: String,
    pub workspace: String,
}

/// One inbound gateway request.
///
/// `history` is filled in by the dispatcher from the session store before
/// the backend is invoked; callers leave it empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserRequest {
    /// Opaque caller-supplied session identifier.
    pub session_id: String,
    /// Caller-side sequence number.
    pub seq: i32,
    /// The message (chat) or the completion trigger text (autocomplete).
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_context: Option<CodeContext>,
    /// Prior transcript, newest last. Attached by the dispatcher.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<Message>,
}

impl UserRequest {
    /// Create a plain chat request.
    pub fn chat(session_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_seq(mut self, seq: i32) -> Self {
        self.seq = seq;
        self
    }

    pub fn with_code_context(mut self, context: CodeContext) -> Self {
        self.code_context = Some(context);
        self
    }
}
