use serde::{Deserialize, Serialize};

/// A single content part in a multi-part message.
///
/// Used for user/assistant messages that mix text with other media, and for
/// tool results that return images alongside text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    /// Data URL (`data:image/png;base64,...`) or HTTPS URL.
    Image { url: String },
    File { url: String, name: String },
    Audio { url: String },
    Video { url: String },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn image(url: impl Into<String>) -> Self {
        Self::Image { url: url.into() }
    }
}

/// The textual/multimodal body of a message: either a plain string or a list
/// of typed parts. Single-part text content collapses to `Text` so the
/// overwhelmingly common case avoids an allocation-heavy parts vector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl Content {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t),
            Self::Parts(parts) if parts.len() == 1 => match &parts[0] {
                ContentPart::Text { text } => Some(text),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(t) => t.trim().is_empty(),
            Self::Parts(parts) => parts.is_empty(),
        }
    }

    fn char_len(&self) -> usize {
        match self {
            Self::Text(t) => t.len(),
            Self::Parts(parts) => parts
                .iter()
                .map(|p| match p {
                    ContentPart::Text { text } => text.len(),
                    // Conservative fixed estimate for non-text media, mirroring
                    // OpenAI's vision token accounting (high-detail tile estimate).
                    _ => 765 * 4,
                })
                .sum(),
        }
    }
}

impl From<&str> for Content {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Content {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
}

/// A single structured function-call request emitted by the model.
///
/// `args` is always a parsed JSON value, never a JSON-encoded string: malformed
/// argument JSON is caught once, at construction time from a provider response,
/// rather than re-discovered at every tool-dispatch site.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallRequest {
    pub call_id: String,
    pub tool_name: String,
    pub args: serde_json::Value,
}

/// One message in a session's ordered history.
///
/// Messages are append-only except for the exclusion flag: a message already
/// recorded is never rewritten, only marked hidden from future context
/// assembly via `excluded_from_context`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: Content,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRequest>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    #[serde(default)]
    pub excluded_from_context: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excluded_reason: Option<String>,
}

impl Message {
    fn new(id: impl Into<String>, role: Role, content: Content) -> Self {
        Self {
            id: id.into(),
            role,
            content,
            tool_calls: None,
            tool_call_id: None,
            finish_reason: None,
            excluded_from_context: false,
            excluded_reason: None,
        }
    }

    pub fn system(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(id, Role::System, Content::Text(text.into()))
    }

    pub fn user(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(id, Role::User, Content::Text(text.into()))
    }

    pub fn user_with_parts(id: impl Into<String>, parts: Vec<ContentPart>) -> Self {
        Self::new(id, Role::User, Content::Parts(parts))
    }

    pub fn assistant(id: impl Into<String>, text: impl Into<String>) -> Self {
        let mut m = Self::new(id, Role::Assistant, Content::Text(text.into()));
        m.finish_reason = Some(FinishReason::Stop);
        m
    }

    pub fn assistant_tool_calls(id: impl Into<String>, calls: Vec<ToolCallRequest>) -> Self {
        let mut m = Self::new(id, Role::Assistant, Content::Text(String::new()));
        m.tool_calls = Some(calls);
        m.finish_reason = Some(FinishReason::ToolCalls);
        m
    }

    pub fn tool_result(id: impl Into<String>, call_id: impl Into<String>, text: impl Into<String>) -> Self {
        let mut m = Self::new(id, Role::Tool, Content::Text(text.into()));
        m.tool_call_id = Some(call_id.into());
        m
    }

    pub fn exclude(&mut self, reason: impl Into<String>) {
        self.excluded_from_context = true;
        self.excluded_reason = Some(reason.into());
    }

    /// Approximate token count used for proactive compaction thresholds.
    /// Uses a 4-chars-per-token heuristic; callers needing exactness should
    /// rely on `usage` events from the provider instead.
    pub fn approx_tokens(&self) -> usize {
        let mut chars = self.content.char_len();
        if let Some(calls) = &self.tool_calls {
            for c in calls {
                chars += c.tool_name.len() + c.args.to_string().len();
            }
        }
        chars / 4 + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_text_part_collapses_on_as_text() {
        let content = Content::Parts(vec![ContentPart::text("hello")]);
        assert_eq!(content.as_text(), Some("hello"));
    }

    #[test]
    fn multi_part_content_has_no_single_text() {
        let content = Content::Parts(vec![ContentPart::text("a"), ContentPart::image("http://x")]);
        assert_eq!(content.as_text(), None);
    }

    #[test]
    fn approx_tokens_grows_with_content() {
        let short = Message::user("1", "hi");
        let long = Message::user("2", "a".repeat(400));
        assert!(long.approx_tokens() > short.approx_tokens());
    }

    #[test]
    fn exclude_sets_reason_and_flag() {
        let mut m = Message::assistant_tool_calls("1", vec![]);
        assert!(!m.excluded_from_context);
        m.exclude("invalid_response");
        assert!(m.excluded_from_context);
        assert_eq!(m.excluded_reason.as_deref(), Some("invalid_response"));
    }

    #[test]
    fn tool_result_carries_call_id() {
        let m = Message::tool_result("5", "c1", "output");
        assert_eq!(m.tool_call_id.as_deref(), Some("c1"));
        assert_eq!(m.role, Role::Tool);
    }
}
