// UI strings and labels. ASCII-friendly by default.

use gptcli_core::session::{ChatDetails, SystemPromptLabel};
use gptcli_core::stats::group_thousands;
use unicode_width::UnicodeWidthStr;

pub const INPUT_HINT: &str = "Type a message or /help. Enter to send, Shift+Enter for newline";

// Block titles keep surrounding spaces for padding.
pub const TITLE_CHATS: &str = " Chats ";
pub const TITLE_DETAILS: &str = " Chat Details & Stats ";
pub const TITLE_CONVERSATION: &str = " Conversation ";
pub const TITLE_INPUT: &str = " Input ";
pub const TITLE_HELP: &str = " Help ";
pub const TITLE_NEW_CHAT: &str = " New Chat ";
pub const TITLE_CONFIRM: &str = " Delete Chat ";
pub const TITLE_SYSTEM_PROMPT: &str = " Edit System Prompt ";
pub const TITLE_MODEL_PICKER: &str = " Select Model ";
pub const TITLE_INFO: &str = " Info ";

pub const EMPTY_NO_CHAT: &str = "Select a chat to view conversation";
pub const EMPTY_NO_MESSAGES: &str = "No messages in this conversation yet.";
pub const EMPTY_CHAT_LIST: &str = "No chats yet. Press n to create one.";
pub const DETAILS_NO_CHAT: &str = "Select a chat to view details";
pub const THINKING: &str = "Thinking...";

pub const NOTICE_NO_CHAT: &str = "Select or create a chat first (n in the chat list)";
pub const NOTICE_BUSY: &str = "A reply is still in progress; Ctrl+C cancels it";
pub const NOTICE_CANCELED: &str = "Request canceled";

pub const SPINNER: [&str; 4] = ["|", "/", "-", "\\"];

pub fn confirm_delete_message(name: &str) -> String {
    format!("Delete chat \"{}\" and its statistics? Press Y to confirm, N/Esc to cancel.", name)
}

pub fn waiting_label(tick: u64, model: &str) -> String {
    format!("{} Waiting for {}...", SPINNER[(tick as usize) % SPINNER.len()], model)
}

pub fn stick_label(scroll: u16) -> String {
    if scroll == 0 {
        "Bottom".to_string()
    } else {
        format!("+{} lines", scroll)
    }
}

/// Lines for the details pane.
pub fn details_lines(details: Option<&ChatDetails>) -> Vec<String> {
    let Some(d) = details else {
        return vec![DETAILS_NO_CHAT.to_string()];
    };
    let prompt = match &d.system_prompt {
        SystemPromptLabel::Default => "(default)".to_string(),
        SystemPromptLabel::Preset(name) => name.clone(),
        SystemPromptLabel::Custom(text) => {
            if text.chars().count() > 40 {
                format!("{}...", text.chars().take(40).collect::<String>())
            } else {
                text.clone()
            }
        }
    };
    let s = &d.stats;
    let mut out = vec![
        format!("Chat: {}", d.name),
        String::new(),
        "Settings:".to_string(),
        format!("  Model: {}", d.model),
        format!("  System Prompt: {}", prompt),
        String::new(),
        "Statistics:".to_string(),
        format!("  Messages: {}", d.message_count),
        format!("  Requests: {}", s.request_count),
        format!("  Total Tokens: {}", group_thousands(s.total_tokens)),
        format!("  Input Tokens: {}", group_thousands(s.total_input_tokens)),
        format!("  Output Tokens: {}", group_thousands(s.total_output_tokens)),
    ];
    if s.total_cost > 0.0 {
        out.push(format!("  Total Cost: ${:.6}", s.total_cost));
    }
    if s.total_time > 0.0 {
        out.push(format!("  Total Time: {:.2}s", s.total_time));
    }
    out
}

/// Width-aware status text: segments are dropped from the end once the
/// line would overflow.
pub fn build_status_line(
    stick: &str,
    focus: &str,
    chat: Option<(&str, &str)>,
    history_len: usize,
    max_width: u16,
) -> String {
    let mut segments: Vec<String> = Vec::new();
    if let Some((name, model)) = chat {
        segments.push(format!("[{}][{}]", name, model));
    }
    segments.push(format!("[{}][{}]", stick, focus));
    segments.push(format!("Hist:{}", history_len));
    let hints: [&str; 5] = [
        "Tab: focus",
        "PgUp/PgDn: scroll",
        "F2: chat list",
        "Ctrl+C: cancel/quit",
        "F1: help",
    ];
    for h in hints {
        segments.push(h.to_string());
    }
    join_within(&segments, "  |  ", max_width as usize)
}

fn join_within(segments: &[String], sep: &str, max_width: usize) -> String {
    let mut out = String::new();
    let mut used = 0usize;
    for (i, seg) in segments.iter().enumerate() {
        let segw = UnicodeWidthStr::width(seg.as_str());
        let addw = segw + if i == 0 { 0 } else { UnicodeWidthStr::width(sep) };
        if used + addw > max_width {
            break;
        }
        if i > 0 {
            out.push_str(sep);
        }
        out.push_str(seg);
        used += addw;
    }
    out
}

pub fn help_lines_ascii() -> &'static [&'static str] {
    &[
        "Chat list",
        "  Up/Down: Select chat    Enter: Focus input    n: New chat",
        "  d/Delete: Delete chat    e: Edit system prompt    r: Refresh    q/Esc: Quit",
        "Input",
        "  Enter: Send    Shift+Enter/Alt+Enter: Newline    Up/Down: History",
        "  Ctrl+A/E: Line start/end    Ctrl+W: Delete word    Ctrl+U/K: Kill to start/end",
        "  Esc: Back to chat list",
        "Conversation",
        "  PgUp/PgDn: Page    Ctrl+Up/Down: Line    Ctrl+Home/End: Top/bottom    Mouse wheel",
        "General",
        "  Tab: Switch focus    F2: Show/hide chat list    Ctrl+C: Cancel reply / quit    F1: Help",
        "",
        "Commands",
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use gptcli_core::stats::Statistics;

    #[test]
    fn status_line_respects_width() {
        let full = build_status_line("Bottom", "Input", Some(("work", "gpt-5.1")), 3, 500);
        assert!(full.starts_with("[work][gpt-5.1]"));
        assert!(full.ends_with("F1: help"));
        let narrow = build_status_line("Bottom", "Input", Some(("work", "gpt-5.1")), 3, 20);
        assert_eq!(narrow, "[work][gpt-5.1]");
        assert!(build_status_line("Bottom", "Input", None, 0, 0).is_empty());
    }

    #[test]
    fn details_show_optional_totals_only_when_set() {
        let mut d = ChatDetails {
            name: "work".into(),
            model: "gpt-5.1".into(),
            system_prompt: SystemPromptLabel::Custom("x".repeat(50)),
            message_count: 4,
            stats: Statistics::default(),
        };
        let lines = details_lines(Some(&d));
        assert!(lines.contains(&format!("  System Prompt: {}...", "x".repeat(40))));
        assert!(!lines.iter().any(|l| l.contains("Total Cost")));

        d.stats.total_cost = 0.5;
        d.stats.total_tokens = 12345;
        let lines = details_lines(Some(&d));
        assert!(lines.contains(&"  Total Cost: $0.500000".to_string()));
        assert!(lines.contains(&"  Total Tokens: 12,345".to_string()));
        assert_eq!(details_lines(None), vec![DETAILS_NO_CHAT.to_string()]);
    }

    #[test]
    fn spinner_cycles() {
        assert!(waiting_label(0, "m").starts_with('|'));
        assert!(waiting_label(5, "m").starts_with('/'));
        assert_eq!(stick_label(0), "Bottom");
        assert_eq!(stick_label(4), "+4 lines");
    }
}
