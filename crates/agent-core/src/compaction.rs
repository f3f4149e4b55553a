use agent_model::{Message, Role};
use agent_tools::OutputCategory;

use crate::config::CompactionConfig;

const SUMMARIZE_PROMPT: &str = "Summarize the conversation so far in a concise, information-dense way. \
Preserve technical details, decisions, file names, and tool outputs that may be relevant to future work. \
This summary will replace the original history to free up context space.";

/// Whether cumulative token usage warrants a compaction pass before the next
/// provider call.
pub fn should_compact(total_tokens: usize, config: &CompactionConfig) -> bool {
    if config.max_tokens == 0 {
        return false;
    }
    (total_tokens as f32) >= config.trigger_ratio * (config.max_tokens as f32)
}

/// Builds a single summarization request out of `messages`, and returns the
/// request alongside the recent tail that should follow it once the
/// provider's summary comes back. Deterministic and I/O-free: the actual
/// model call happens at the engine layer, which then writes
/// `[summary_message, ...recent]` back through `Memory::compact_context`.
pub fn compact_session(messages: &[Message], keep_last: usize) -> (Message, Vec<Message>) {
    let non_system: Vec<&Message> = messages.iter().filter(|m| m.role != Role::System).collect();
    let keep = keep_last.min(non_system.len());
    let older = &non_system[..non_system.len() - keep];
    let recent: Vec<Message> = non_system[non_system.len() - keep..].iter().map(|m| (*m).clone()).collect();

    let history_text = serialize_history(older);
    let summary_request = Message::user(uuid::Uuid::new_v4().to_string(), format!("{SUMMARIZE_PROMPT}\n\n---\n\n{history_text}"));
    (summary_request, recent)
}

/// Deterministic fallback when the session is too large even for a
/// compaction prompt: drop everything but the last `keep_last` non-system
/// messages and prepend a canned notice. Makes no model call and always
/// succeeds regardless of session size.
pub fn emergency_compact(messages: &[Message], keep_last: usize) -> Vec<Message> {
    let non_system: Vec<&Message> = messages.iter().filter(|m| m.role != Role::System).collect();
    let keep = keep_last.min(non_system.len());
    let preserved: Vec<Message> = non_system[non_system.len() - keep..].iter().map(|m| (*m).clone()).collect();

    let notice = Message::assistant(
        uuid::Uuid::new_v4().to_string(),
        "[Context emergency-compacted: earlier history was dropped to avoid a context-window overflow.]",
    );

    let mut out = Vec::with_capacity(preserved.len() + 1);
    out.push(notice);
    out.extend(preserved);
    out
}

fn serialize_history(messages: &[&Message]) -> String {
    messages
        .iter()
        .map(|m| format!("[{:?}] {}", m.role, m.content.as_text().unwrap_or("<non-text content>")))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Content-aware tool-result truncation, dispatching on [`OutputCategory`]
/// rather than on tool name so this stays independent of the concrete tool
/// list. Every truncated result ends with a visible notice.
pub fn truncate_tool_output(content: &str, category: OutputCategory, cap_chars: usize) -> String {
    if cap_chars == 0 || content.len() <= cap_chars {
        return content.to_string();
    }
    let lines: Vec<&str> = content.lines().collect();
    let truncated = match category {
        OutputCategory::HeadTail => head_tail(&lines, 60, 40),
        OutputCategory::MatchList => lines.iter().take(cap_chars / 40).cloned().collect::<Vec<_>>().join("\n"),
        OutputCategory::FileContent => head_tail(&lines, 80, 40),
        OutputCategory::Generic => {
            let mut end = cap_chars.min(content.len());
            while end > 0 && !content.is_char_boundary(end) {
                end -= 1;
            }
            content[..end].to_string()
        }
    };
    format!("{truncated}\n\n[...truncated: output exceeded {cap_chars} characters]")
}

fn head_tail(lines: &[&str], head: usize, tail: usize) -> String {
    if lines.len() <= head + tail {
        return lines.join("\n");
    }
    let head_part = lines[..head].join("\n");
    let tail_part = lines[lines.len() - tail..].join("\n");
    format!("{head_part}\n\n... [{} lines omitted] ...\n\n{tail_part}", lines.len() - head - tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_compact_triggers_at_ratio() {
        let config = CompactionConfig { max_tokens: 1000, keep_last: 6, trigger_ratio: 0.5 };
        assert!(!should_compact(400, &config));
        assert!(should_compact(500, &config));
    }

    #[test]
    fn should_compact_disabled_when_max_tokens_zero() {
        let config = CompactionConfig { max_tokens: 0, keep_last: 6, trigger_ratio: 0.5 };
        assert!(!should_compact(1_000_000, &config));
    }

    #[test]
    fn compact_session_keeps_recent_messages_verbatim() {
        let messages: Vec<Message> = (0..10).map(|i| Message::user(i.to_string(), format!("message {i}"))).collect();
        let (summary_request, recent) = compact_session(&messages, 3);
        assert_eq!(summary_request.role, Role::User);
        assert!(summary_request.content.as_text().unwrap().contains("message 0"));
        let tail: Vec<&str> = recent.iter().map(|m| m.content.as_text().unwrap()).collect();
        assert_eq!(tail, vec!["message 7", "message 8", "message 9"]);
    }

    #[test]
    fn emergency_compact_is_deterministic_and_drops_older_messages() {
        let messages: Vec<Message> = (0..20).map(|i| Message::user(i.to_string(), format!("m{i}"))).collect();
        let out = emergency_compact(&messages, 2);
        assert_eq!(out.len(), 3);
        assert!(out[0].content.as_text().unwrap().contains("emergency-compacted"));
    }

    #[test]
    fn generic_truncation_adds_visible_notice() {
        let out = truncate_tool_output(&"x".repeat(100), OutputCategory::Generic, 10);
        assert!(out.starts_with(&"x".repeat(10)));
        assert!(out.contains("[...truncated"));
    }

    #[test]
    fn content_within_cap_is_unchanged() {
        let out = truncate_tool_output("short", OutputCategory::Generic, 100);
        assert_eq!(out, "short");
    }

    #[test]
    fn head_tail_preserves_both_ends() {
        let content: String = (0..200).map(|i| format!("line{i}\n")).collect();
        let out = truncate_tool_output(&content, OutputCategory::HeadTail, 50);
        assert!(out.contains("line0"));
        assert!(out.contains("line199"));
        assert!(out.contains("omitted"));
    }
}
