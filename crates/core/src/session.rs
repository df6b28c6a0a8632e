use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::config::GlobalConfig;
use crate::llm::{self, Role, Usage};
use crate::stats::{calculate_cost, format_statistics, Statistics};
use crate::store::{sanitize, ChatConfig, ChatMessage, ChatSummary, Store, StoreError};

/// Request payload for one turn: the last `window` messages with the
/// system prompt placed (or replaced) in front.
pub fn build_request(
    history: &[ChatMessage],
    system_prompt: Option<&str>,
    window: usize,
) -> Vec<llm::Message> {
    let start = history.len().saturating_sub(window.max(1));
    let mut out: Vec<llm::Message> = history[start..]
        .iter()
        .filter(|m| !(m.role == Role::Assistant && m.content.trim().is_empty()))
        .map(|m| llm::Message::new(m.role, m.content.clone()))
        .collect();
    if let Some(sp) = system_prompt.filter(|s| !s.trim().is_empty()) {
        match out.first_mut() {
            Some(first) if first.role == Role::System => first.content = sp.to_string(),
            _ => out.insert(0, llm::Message::new(Role::System, sp)),
        }
    }
    out
}

/// A turn whose user message is already persisted.
#[derive(Clone, Debug)]
pub struct PendingTurn {
    pub chat: String,
    pub model: String,
    pub request: Vec<llm::Message>,
    user_index: usize,
    user_message: ChatMessage,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TurnSummary {
    pub usage: Usage,
    pub cost: Option<f64>,
    pub elapsed: Duration,
    pub totals: Statistics,
}

impl std::fmt::Display for TurnSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&format_statistics(
            self.usage.input_tokens,
            self.usage.output_tokens,
            self.usage.total_tokens,
            self.cost,
            self.elapsed.as_secs_f64(),
        ))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SystemPromptLabel {
    Default,
    Preset(String),
    Custom(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChatDetails {
    pub name: String,
    pub model: String,
    pub system_prompt: SystemPromptLabel,
    pub message_count: usize,
    pub stats: Statistics,
}

/// Ties the store to the global configuration. Every mutation goes through
/// here so transcript, chat config and statistics stay consistent.
pub struct SessionManager {
    store: Store,
    config: GlobalConfig,
    model_override: Option<String>,
}

impl SessionManager {
    pub fn new(store: Store, config: GlobalConfig) -> Self {
        Self {
            store,
            config,
            model_override: None,
        }
    }

    pub fn with_model_override(mut self, model: Option<String>) -> Self {
        self.model_override = model.filter(|m| !m.trim().is_empty());
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &GlobalConfig {
        &self.config
    }

    pub fn effective_model(&self, chat: &str) -> String {
        if let Some(m) = &self.model_override {
            return m.clone();
        }
        self.store
            .load_chat_config(chat)
            .model
            .unwrap_or_else(|| self.config.default_model.clone())
    }

    pub fn effective_system_prompt(&self, chat: &str) -> Option<String> {
        if let Some(text) = self.store.load_system_prompt(chat) {
            return Some(text);
        }
        self.store
            .load_chat_config(chat)
            .system_prompt
            .filter(|s| !s.trim().is_empty())
            .map(|s| self.config.resolve_system_prompt(&s))
    }

    pub fn list_chats(&self) -> Vec<ChatSummary> {
        self.store.list_chats(&self.config.default_model)
    }

    pub fn load_conversation(&self, chat: &str) -> Vec<ChatMessage> {
        self.store.load_conversation(chat)
    }

    /// Returns the stored name, which is what the chat list shows.
    pub fn create_chat(&self, chat: &str, system_prompt: Option<&str>) -> Result<String, StoreError> {
        let chat = sanitize(chat);
        self.store.create_chat(&chat)?;
        self.touch(&chat)?;
        if let Some(sp) = system_prompt.filter(|s| !s.trim().is_empty()) {
            self.set_system_prompt(&chat, sp)?;
        }
        info!(target: "session", "created chat {}", chat);
        Ok(chat)
    }

    /// Creates the chat if it does not exist yet. Returns the stored name and
    /// whether it was created.
    pub fn ensure_chat(&self, chat: &str) -> Result<(String, bool), StoreError> {
        let chat = sanitize(chat);
        if self.store.chat_exists(&chat) {
            return Ok((chat, false));
        }
        let chat = self.create_chat(&chat, None)?;
        Ok((chat, true))
    }

    pub fn delete_chat(&self, chat: &str) -> Result<(), StoreError> {
        info!(target: "session", "deleting chat {}", chat);
        self.store.delete_chat(chat)
    }

    pub fn set_model(&self, chat: &str, model: &str) -> Result<(), StoreError> {
        let mut cfg = self.store.load_chat_config(chat);
        cfg.model = Some(model.trim().to_string());
        self.store.save_chat_config(chat, &cfg)
    }

    /// Preset names go to the chat config; anything else is stored as the
    /// chat's override text. Empty input clears both.
    pub fn set_system_prompt(&self, chat: &str, value: &str) -> Result<(), StoreError> {
        let value = value.trim();
        let mut cfg = self.store.load_chat_config(chat);
        if value.is_empty() {
            cfg.system_prompt = None;
            self.store.save_system_prompt(chat, "")?;
        } else if self.config.is_preset(value) {
            cfg.system_prompt = Some(value.to_string());
            self.store.save_system_prompt(chat, "")?;
        } else {
            cfg.system_prompt = None;
            self.store.save_system_prompt(chat, value)?;
        }
        self.store.save_chat_config(chat, &cfg)
    }

    pub fn chat_details(&self, chat: &str) -> ChatDetails {
        let cfg = self.store.load_chat_config(chat);
        let system_prompt = if let Some(text) = self.store.load_system_prompt(chat) {
            SystemPromptLabel::Custom(text)
        } else {
            match cfg.system_prompt.filter(|s| !s.trim().is_empty()) {
                Some(s) if self.config.is_preset(&s) => SystemPromptLabel::Preset(s),
                Some(s) => SystemPromptLabel::Custom(s),
                None => SystemPromptLabel::Default,
            }
        };
        ChatDetails {
            name: chat.to_string(),
            model: self.effective_model(chat),
            system_prompt,
            message_count: self.store.load_conversation(chat).len(),
            stats: self.store.load_statistics(chat),
        }
    }

    fn touch(&self, chat: &str) -> Result<(), StoreError> {
        let mut cfg: ChatConfig = self.store.load_chat_config(chat);
        cfg.last_used = Some(Utc::now());
        self.store.save_chat_config(chat, &cfg)
    }

    /// Appends and persists the user message, then builds the request.
    pub fn begin_turn(&self, chat: &str, text: &str) -> Result<PendingTurn, StoreError> {
        let mut msgs = self.store.load_conversation(chat);
        let user_message = ChatMessage::user(text);
        msgs.push(user_message.clone());
        self.store.save_conversation(chat, &msgs)?;
        if let Err(e) = self.touch(chat) {
            warn!(target: "session", "touch {}: {}", chat, e);
        }
        let model = self.effective_model(chat);
        let system_prompt = self.effective_system_prompt(chat);
        let request = build_request(&msgs, system_prompt.as_deref(), self.config.history_window);
        info!(
            target: "session",
            "begin turn chat={} model={} request_len={}",
            chat,
            model,
            request.len()
        );
        Ok(PendingTurn {
            chat: chat.to_string(),
            model,
            request,
            user_index: msgs.len() - 1,
            user_message,
        })
    }

    pub fn complete_turn(
        &self,
        turn: PendingTurn,
        reply: &str,
        usage: Usage,
        elapsed: Duration,
    ) -> Result<TurnSummary, StoreError> {
        let mut msgs = self.store.load_conversation(&turn.chat);
        msgs.push(ChatMessage::assistant(reply, &turn.model));
        self.store.save_conversation(&turn.chat, &msgs)?;

        let cost = if usage.is_empty() {
            None
        } else {
            calculate_cost(
                &self.config.pricing,
                &turn.model,
                usage.input_tokens,
                usage.output_tokens,
            )
        };
        let totals = self
            .store
            .update_statistics(
                Some(&turn.chat),
                usage.input_tokens,
                usage.output_tokens,
                usage.total_tokens,
                cost,
                elapsed.as_secs_f64(),
            )?
            .unwrap_or_default();
        info!(
            target: "session",
            "complete turn chat={} tokens={} cost={:?}",
            turn.chat,
            usage.total_tokens,
            cost
        );
        Ok(TurnSummary {
            usage,
            cost,
            elapsed,
            totals,
        })
    }

    /// Removes the user message appended by `begin_turn`.
    pub fn abort_turn(&self, turn: PendingTurn) -> Result<(), StoreError> {
        let mut msgs = self.store.load_conversation(&turn.chat);
        let pos = if msgs.get(turn.user_index) == Some(&turn.user_message) {
            Some(turn.user_index)
        } else {
            msgs.iter().rposition(|m| *m == turn.user_message)
        };
        if let Some(i) = pos {
            msgs.remove(i);
            self.store.save_conversation(&turn.chat, &msgs)?;
            info!(target: "session", "rolled back user message in {}", turn.chat);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager() -> (TempDir, SessionManager) {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path().join("conversations"));
        (dir, SessionManager::new(store, GlobalConfig::default()))
    }

    fn msg(role: Role, content: &str) -> ChatMessage {
        ChatMessage {
            role,
            content: content.to_string(),
            model: None,
            timestamp: None,
        }
    }

    #[test]
    fn request_windows_history_then_adds_system_prompt() {
        let history: Vec<_> = (0..15)
            .map(|i| msg(if i % 2 == 0 { Role::User } else { Role::Assistant }, &format!("m{}", i)))
            .collect();
        let req = build_request(&history, Some("Be brief."), 10);
        assert_eq!(req.len(), 11);
        assert_eq!(req[0], llm::Message::new(Role::System, "Be brief."));
        assert_eq!(req[1].content, "m5");
        assert_eq!(req[10].content, "m14");

        let req = build_request(&history, None, 10);
        assert_eq!(req.len(), 10);
        assert_eq!(req[0].content, "m5");
    }

    #[test]
    fn request_replaces_leading_system_message() {
        let history = vec![msg(Role::System, "old"), msg(Role::User, "hi")];
        let req = build_request(&history, Some("new"), 10);
        assert_eq!(req.len(), 2);
        assert_eq!(req[0], llm::Message::new(Role::System, "new"));
    }

    #[test]
    fn request_skips_empty_assistant_placeholders() {
        let history = vec![msg(Role::User, "hi"), msg(Role::Assistant, "  ")];
        let req = build_request(&history, None, 10);
        assert_eq!(req, vec![llm::Message::new(Role::User, "hi")]);
    }

    #[test]
    fn model_resolution_order() {
        let (_d, m) = manager();
        assert_eq!(m.effective_model("c"), "gpt-5.1");
        m.set_model("c", "gpt-4o").unwrap();
        assert_eq!(m.effective_model("c"), "gpt-4o");
        let m = m.with_model_override(Some("o3".into()));
        assert_eq!(m.effective_model("c"), "o3");
    }

    #[test]
    fn system_prompt_preset_and_custom() {
        let (_d, m) = manager();
        assert_eq!(m.effective_system_prompt("c"), None);
        assert_eq!(m.chat_details("c").system_prompt, SystemPromptLabel::Default);

        m.set_system_prompt("c", "coder").unwrap();
        assert_eq!(
            m.chat_details("c").system_prompt,
            SystemPromptLabel::Preset("coder".into())
        );
        assert_eq!(
            m.effective_system_prompt("c"),
            Some(m.config().system_prompts["coder"].clone())
        );

        m.set_system_prompt("c", "Answer in French.").unwrap();
        assert_eq!(m.effective_system_prompt("c").as_deref(), Some("Answer in French."));
        assert_eq!(m.store().load_chat_config("c").system_prompt, None);

        m.set_system_prompt("c", "").unwrap();
        assert_eq!(m.effective_system_prompt("c"), None);
    }

    #[test]
    fn successful_turn_persists_and_accounts() {
        let (_d, m) = manager();
        m.set_system_prompt("chat", "default").unwrap();
        let turn = m.begin_turn("chat", "Hello").unwrap();
        assert_eq!(turn.model, "gpt-5.1");
        assert_eq!(turn.request[0].role, Role::System);
        assert_eq!(turn.request.last().unwrap().content, "Hello");
        assert_eq!(m.load_conversation("chat").len(), 1);

        let summary = m
            .complete_turn(turn, "Hi!", Usage::new(1000, 2000, None), Duration::from_millis(1500))
            .unwrap();
        let expected = 0.001 * 2.50 + 0.002 * 10.00;
        assert!((summary.cost.unwrap() - expected).abs() < 1e-9);
        assert_eq!(summary.totals.request_count, 1);
        assert!(summary.to_string().contains("Tokens: 3000 (1000 in / 2000 out)"));
        assert!(summary.to_string().contains("Time: 1.50s"));

        let conv = m.load_conversation("chat");
        assert_eq!(conv.len(), 2);
        assert_eq!(conv[1].role, Role::Assistant);
        assert_eq!(conv[1].model.as_deref(), Some("gpt-5.1"));

        let details = m.chat_details("chat");
        assert_eq!(details.message_count, 2);
        assert_eq!(details.stats.total_tokens, 3000);
    }

    #[test]
    fn unknown_model_has_no_cost_but_counts_request() {
        let (_d, m) = manager();
        m.set_model("c", "mystery").unwrap();
        let turn = m.begin_turn("c", "q").unwrap();
        let s = m
            .complete_turn(turn, "a", Usage::new(5, 5, None), Duration::from_secs(1))
            .unwrap();
        assert_eq!(s.cost, None);
        assert_eq!(s.totals.total_cost, 0.0);
        assert_eq!(s.totals.request_count, 1);
    }

    #[test]
    fn failed_turn_rolls_back_user_message() {
        let (_d, m) = manager();
        let first = m.begin_turn("c", "one").unwrap();
        m.complete_turn(first, "uno", Usage::default(), Duration::ZERO)
            .unwrap();
        let before = m.load_conversation("c");

        let turn = m.begin_turn("c", "two").unwrap();
        assert_eq!(m.load_conversation("c").len(), 3);
        m.abort_turn(turn).unwrap();
        assert_eq!(m.load_conversation("c"), before);
        assert_eq!(m.store().load_statistics("c").request_count, 1);
    }

    #[test]
    fn create_chat_with_prompt_and_ensure() {
        let (_d, m) = manager();
        m.create_chat("new", Some("Be kind.")).unwrap();
        assert!(m.store().chat_exists("new"));
        assert_eq!(m.effective_system_prompt("new").as_deref(), Some("Be kind."));
        assert!(m.create_chat("new", None).is_err());
        assert_eq!(m.ensure_chat("new").unwrap(), ("new".to_string(), false));
        assert_eq!(m.ensure_chat("other").unwrap(), ("other".to_string(), true));
        assert_eq!(m.list_chats().len(), 2);

        assert_eq!(m.create_chat(" team/alpha ", None).unwrap(), "team_alpha");
        assert_eq!(m.ensure_chat("team/alpha").unwrap(), ("team_alpha".to_string(), false));
        assert!(m.list_chats().iter().any(|c| c.name == "team_alpha"));
    }
}
