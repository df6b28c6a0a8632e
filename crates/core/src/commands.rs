use tracing::warn;

use crate::session::{SessionManager, SystemPromptLabel};
use crate::stats::group_thousands;

pub const HELP_LINES: &[(&str, &str)] = &[
    ("/help", "Show this help"),
    ("/change-model [name]", "Switch the model for this chat"),
    ("/system-prompt [preset|text|none]", "Show or set the system prompt"),
    ("/system-prompt-list", "List system prompt presets"),
    ("/list-chats", "List saved chats"),
    ("/switch-chat <name>", "Switch to (or create) a chat"),
    ("/stats", "Show usage statistics for this chat"),
    ("/quit", "Exit (also: exit, quit)"),
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Help,
    ChangeModel(Option<String>),
    SystemPrompt(Option<String>),
    SystemPromptList,
    ListChats,
    SwitchChat(Option<String>),
    Stats,
    Quit,
    Unknown(String),
}

impl Command {
    /// `None` means the input is a chat message, not a command.
    pub fn parse(input: &str) -> Option<Command> {
        let line = input.trim();
        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            return Some(Command::Quit);
        }
        let rest = line.strip_prefix('/')?;
        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((n, a)) => (n, Some(a.trim().to_string()).filter(|a| !a.is_empty())),
            None => (rest, None),
        };
        let cmd = match name.to_ascii_lowercase().as_str() {
            "help" | "?" => Command::Help,
            "change-model" | "model" => Command::ChangeModel(arg),
            "system-prompt" => Command::SystemPrompt(arg),
            "system-prompt-list" => Command::SystemPromptList,
            "list-chats" => Command::ListChats,
            "switch-chat" => Command::SwitchChat(arg),
            "stats" => Command::Stats,
            "quit" | "exit" => Command::Quit,
            _ => Command::Unknown(name.to_string()),
        };
        Some(cmd)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum CommandOutcome {
    Info(Vec<String>),
    /// The named chat exists now and should become active.
    SwitchChat(String),
    /// No model was given; the front end should offer a picker.
    PickModel,
    Help,
    Quit,
}

pub fn help_lines() -> Vec<String> {
    let width = HELP_LINES.iter().map(|(c, _)| c.len()).max().unwrap_or(0);
    HELP_LINES
        .iter()
        .map(|(c, d)| format!("{:<width$}  {}", c, d, width = width))
        .collect()
}

fn preview(text: &str, max: usize) -> String {
    let one_line = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if one_line.chars().count() <= max {
        one_line
    } else {
        let cut: String = one_line.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

impl SessionManager {
    pub fn execute(&self, chat: &str, cmd: Command) -> CommandOutcome {
        match cmd {
            Command::Help => CommandOutcome::Help,
            Command::Quit => CommandOutcome::Quit,
            Command::ChangeModel(None) => CommandOutcome::PickModel,
            Command::ChangeModel(Some(model)) => match self.set_model(chat, &model) {
                Ok(()) => {
                    let mut lines = vec![format!("Model for '{}' set to {}", chat, model.trim())];
                    if !self.config().pricing.contains_key(model.trim()) {
                        lines.push("No pricing known for this model; cost will show n/a.".into());
                    }
                    CommandOutcome::Info(lines)
                }
                Err(e) => failed("change model", e),
            },
            Command::SystemPrompt(None) => {
                let line = match self.chat_details(chat).system_prompt {
                    SystemPromptLabel::Default => "System prompt: (none)".to_string(),
                    SystemPromptLabel::Preset(name) => format!(
                        "System prompt: {} ({})",
                        name,
                        preview(&self.config().resolve_system_prompt(&name), 60)
                    ),
                    SystemPromptLabel::Custom(text) => {
                        format!("System prompt: custom ({})", preview(&text, 60))
                    }
                };
                CommandOutcome::Info(vec![line])
            }
            Command::SystemPrompt(Some(value)) => {
                let clear = value.eq_ignore_ascii_case("none");
                let arg = if clear { "" } else { value.as_str() };
                match self.set_system_prompt(chat, arg) {
                    Ok(()) if clear => CommandOutcome::Info(vec!["System prompt cleared".into()]),
                    Ok(()) if self.config().is_preset(&value) => {
                        CommandOutcome::Info(vec![format!("System prompt set to preset '{}'", value)])
                    }
                    Ok(()) => CommandOutcome::Info(vec!["Custom system prompt saved".into()]),
                    Err(e) => failed("set system prompt", e),
                }
            }
            Command::SystemPromptList => {
                let mut lines = vec!["System prompt presets:".to_string()];
                for (name, text) in &self.config().system_prompts {
                    lines.push(format!("  {:<12} {}", name, preview(text, 60)));
                }
                CommandOutcome::Info(lines)
            }
            Command::ListChats => {
                let chats = self.list_chats();
                if chats.is_empty() {
                    return CommandOutcome::Info(vec!["No saved chats".into()]);
                }
                let mut lines = vec!["Chats:".to_string()];
                for c in chats {
                    let marker = if c.name == chat { "*" } else { " " };
                    lines.push(format!(
                        "{} {} ({} messages, {})",
                        marker, c.name, c.message_count, c.model
                    ));
                }
                CommandOutcome::Info(lines)
            }
            Command::SwitchChat(None) => {
                CommandOutcome::Info(vec!["Usage: /switch-chat <name>".into()])
            }
            Command::SwitchChat(Some(name)) => match self.ensure_chat(&name) {
                Ok((name, _)) => CommandOutcome::SwitchChat(name),
                Err(e) => failed("switch chat", e),
            },
            Command::Stats => {
                let d = self.chat_details(chat);
                let s = d.stats;
                CommandOutcome::Info(vec![
                    format!("Statistics for '{}':", d.name),
                    format!("  Requests:      {}", group_thousands(s.request_count)),
                    format!("  Input tokens:  {}", group_thousands(s.total_input_tokens)),
                    format!("  Output tokens: {}", group_thousands(s.total_output_tokens)),
                    format!("  Total tokens:  {}", group_thousands(s.total_tokens)),
                    format!("  Total cost:    ${:.6}", s.total_cost),
                    format!("  Total time:    {:.2}s", s.total_time),
                ])
            }
            Command::Unknown(name) => CommandOutcome::Info(vec![format!(
                "Unknown command: /{}. Type /help for a list of commands.",
                name
            )]),
        }
    }
}

fn failed(what: &str, e: impl std::fmt::Display) -> CommandOutcome {
    warn!(target: "session", "{} failed: {}", what, e);
    CommandOutcome::Info(vec![format!("Could not {}: {}", what, e)])
}
