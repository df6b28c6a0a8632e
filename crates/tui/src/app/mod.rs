use std::path::PathBuf;
use std::sync::mpsc::TryRecvError;
use std::time::Duration;

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use gptcli_core::commands::{Command, CommandOutcome};
use gptcli_core::llm::{ChatError, Usage};
use gptcli_core::session::{ChatDetails, PendingTurn, SessionManager};
use gptcli_core::store::{ChatMessage, ChatSummary};
use providers::OpenAiConfig;
use ratatui::layout::Rect;
use tracing::{info, warn};

use crate::strings::{NOTICE_BUSY, NOTICE_CANCELED, NOTICE_NO_CHAT};
use crate::theme::Theme;
use crate::worker::{self, RequestHandle, WorkerEvent};

pub mod chat;
pub mod chat_list;
pub mod history;
pub mod input;
pub mod modal;

use chat::WrappedMsg;
use input::TextInput;
use modal::Modal;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Focus {
    Input,
    ChatList,
}

impl Focus {
    pub fn label(self) -> &'static str {
        match self {
            Focus::Input => "Input",
            Focus::ChatList => "Chats",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub text: String,
    pub is_error: bool,
}

struct InFlight {
    turn: PendingTurn,
    text: String,
    handle: RequestHandle,
}

pub struct App {
    pub manager: SessionManager,
    provider: Result<OpenAiConfig, String>,
    pub stream: bool,
    pub theme: Theme,
    pub chats: Vec<ChatSummary>,
    pub selected: usize,
    pub active_chat: Option<String>,
    pub details: Option<ChatDetails>,
    pub messages: Vec<ChatMessage>,
    pub input: TextInput,
    pub history: Vec<String>,
    pub history_index: Option<usize>,
    pub should_quit: bool,
    pub dirty: bool,
    pub chat_scroll: u16,
    pub stick_to_bottom: bool,
    pub chat_viewport: u16,
    pub chat_area: Option<Rect>,
    pub chat_list_area: Option<Rect>,
    pub chat_list_scroll: u16,
    pub chat_wrap_width: u16,
    pub chat_cache: Vec<WrappedMsg>,
    pub chat_total_lines: usize,
    pub input_visible_lines: u16,
    pub input_max_lines: u16,
    pub focus: Focus,
    pub show_chat_list: bool,
    pub modal: Option<Modal>,
    pub notice: Option<Notice>,
    in_flight: Option<InFlight>,
    pub tick: u64,
    pub state_path: Option<PathBuf>,
}

impl App {
    /// `provider` carries the API settings, or the reason they are unusable
    /// (shown when the user tries to send).
    pub fn new(
        manager: SessionManager,
        provider: Result<OpenAiConfig, String>,
        chat: Option<String>,
        stream: bool,
        state_path: Option<PathBuf>,
    ) -> Self {
        let saved = state_path
            .as_deref()
            .and_then(|p| match crate::persist::load_from(p) {
                Ok(s) => s,
                Err(e) => {
                    warn!(target: "tui", "ignoring ui state: {:#}", e);
                    None
                }
            })
            .unwrap_or_default();
        let theme = Theme::from_config(manager.config());
        let mut app = Self {
            manager,
            provider,
            stream,
            theme,
            chats: Vec::new(),
            selected: 0,
            active_chat: None,
            details: None,
            messages: Vec::new(),
            input: TextInput::default(),
            history: Vec::new(),
            history_index: None,
            should_quit: false,
            dirty: true,
            chat_scroll: 0,
            stick_to_bottom: true,
            chat_viewport: 0,
            chat_area: None,
            chat_list_area: None,
            chat_list_scroll: 0,
            chat_wrap_width: 0,
            chat_cache: Vec::new(),
            chat_total_lines: 0,
            input_visible_lines: 1,
            input_max_lines: 6,
            focus: Focus::ChatList,
            show_chat_list: saved.show_chat_list,
            modal: None,
            notice: None,
            in_flight: None,
            tick: 0,
            state_path,
        };
        app.refresh_chats();

        if let Some(name) = chat {
            match app.manager.ensure_chat(&name) {
                Ok((stored, created)) => {
                    if created {
                        info!(target: "tui", "created chat {}", stored);
                        app.refresh_chats();
                    }
                    app.activate_chat(&stored);
                }
                Err(e) => app.set_notice(format!("Could not open chat '{}': {}", name, e), true),
            }
        } else if let Some(name) = saved.active_chat {
            if app.chats.iter().any(|c| c.name == name) {
                app.activate_chat(&name);
            }
        }
        if app.active_chat.is_some() {
            app.focus = Focus::Input;
        } else {
            app.show_chat_list = true;
        }
        if let Err(msg) = &app.provider {
            let msg = msg.clone();
            app.set_notice(msg, true);
        }
        app
    }

    pub fn set_notice(&mut self, text: impl Into<String>, is_error: bool) {
        self.notice = Some(Notice {
            text: text.into(),
            is_error,
        });
        self.dirty = true;
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Model of the request in flight, for the spinner.
    pub fn waiting_for(&self) -> Option<&str> {
        self.in_flight.as_ref().map(|f| f.turn.model.as_str())
    }

    pub fn refresh_details(&mut self) {
        self.details = self
            .active_chat
            .as_deref()
            .map(|c| self.manager.chat_details(c));
    }

    pub fn reload_messages(&mut self) {
        self.messages = self
            .active_chat
            .as_deref()
            .map(|c| self.manager.load_conversation(c))
            .unwrap_or_default();
        self.invalidate_chat_cache();
        self.stick_to_bottom = true;
        self.chat_scroll = 0;
    }

    pub fn change_model(&mut self, model: &str) {
        self.run_command(Command::ChangeModel(Some(model.to_string())));
    }

    pub fn on_paste(&mut self, text: &str) {
        match &mut self.modal {
            Some(Modal::EditSystemPrompt { editor, .. }) => editor.insert_text(text),
            Some(Modal::NewChat {
                name,
                system_prompt,
                field,
                ..
            }) => match field {
                modal::NewChatField::Name => name.insert_text(&text.replace('\n', " ")),
                modal::NewChatField::SystemPrompt => system_prompt.insert_text(text),
            },
            Some(_) => {}
            None => {
                if self.focus == Focus::Input {
                    self.input.insert_text(text);
                }
            }
        }
        self.dirty = true;
    }

    pub fn on_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }
        self.dirty = true;
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

        if key.code == KeyCode::Char('c') && ctrl {
            match &self.in_flight {
                Some(f) => {
                    info!(target: "tui", "cancel requested");
                    f.handle.cancel();
                }
                None => self.should_quit = true,
            }
            return;
        }
        if self.modal.is_some() {
            self.on_modal_key(key);
            return;
        }

        match key.code {
            KeyCode::F(1) => {
                self.modal = Some(Modal::Help);
                return;
            }
            KeyCode::F(2) => {
                self.show_chat_list = !self.show_chat_list;
                if !self.show_chat_list {
                    self.focus = Focus::Input;
                }
                self.save_ui_state();
                return;
            }
            KeyCode::Tab | KeyCode::BackTab => {
                self.focus = match self.focus {
                    Focus::Input if self.show_chat_list => Focus::ChatList,
                    _ => Focus::Input,
                };
                return;
            }
            KeyCode::PageUp => {
                self.scroll_up(self.chat_viewport.max(1));
                return;
            }
            KeyCode::PageDown => {
                self.scroll_down(self.chat_viewport.max(1));
                return;
            }
            KeyCode::Up if ctrl => {
                self.scroll_up(1);
                return;
            }
            KeyCode::Down if ctrl => {
                self.scroll_down(1);
                return;
            }
            KeyCode::Home if ctrl => {
                self.scroll_up(u16::MAX);
                return;
            }
            KeyCode::End if ctrl => {
                self.scroll_down(u16::MAX);
                return;
            }
            _ => {}
        }

        match self.focus {
            Focus::ChatList => self.on_chat_list_key(key),
            Focus::Input => self.on_input_key(key),
        }
    }

    fn on_input_key(&mut self, key: KeyEvent) {
        let newline = key.modifiers.contains(KeyModifiers::SHIFT)
            || key.modifiers.contains(KeyModifiers::ALT);
        match key.code {
            KeyCode::Enter if newline => self.input.insert_text("\n"),
            KeyCode::Enter => self.submit(),
            KeyCode::Esc => {
                if self.show_chat_list {
                    self.focus = Focus::ChatList;
                }
            }
            KeyCode::Up if key.modifiers.is_empty() => self.history_prev(),
            KeyCode::Down if key.modifiers.is_empty() => self.history_next(),
            _ => {
                self.input.handle_key(key);
            }
        }
    }

    pub fn submit(&mut self) {
        let text = self.input.text.trim().to_string();
        if text.is_empty() {
            return;
        }
        if let Some(cmd) = Command::parse(&text) {
            info!(target: "tui", "command: {:?}", cmd);
            self.record_history_entry(&text);
            self.input.clear();
            self.run_command(cmd);
            return;
        }
        if self.in_flight.is_some() {
            self.set_notice(NOTICE_BUSY, false);
            return;
        }
        let Some(chat) = self.active_chat.clone() else {
            self.set_notice(NOTICE_NO_CHAT, false);
            return;
        };
        let cfg = match &self.provider {
            Ok(cfg) => cfg.clone(),
            Err(msg) => {
                let msg = msg.clone();
                self.set_notice(msg, true);
                return;
            }
        };
        let Some(turn) = self.open_turn(&chat, &text) else {
            return;
        };
        let handle = worker::spawn(cfg, turn.request.clone(), turn.model.clone(), self.stream);
        self.track(turn, text, handle);
    }

    /// Persists the user message and shows it with an empty reply slot.
    fn open_turn(&mut self, chat: &str, text: &str) -> Option<PendingTurn> {
        match self.manager.begin_turn(chat, text) {
            Ok(turn) => {
                self.record_history_entry(text);
                self.input.clear();
                self.messages.push(ChatMessage::user(text));
                self.messages.push(ChatMessage::assistant("", &turn.model));
                Some(turn)
            }
            Err(e) => {
                warn!(target: "tui", "begin turn failed: {}", e);
                self.set_notice(format!("Could not save message: {}", e), true);
                None
            }
        }
    }

    fn track(&mut self, turn: PendingTurn, text: String, handle: RequestHandle) {
        info!(target: "tui", "submit chat={} model={} stream={}", turn.chat, turn.model, self.stream);
        self.in_flight = Some(InFlight { turn, text, handle });
        self.notice = None;
        self.stick_to_bottom = true;
        self.chat_scroll = 0;
        self.dirty = true;
    }

    fn run_command(&mut self, cmd: Command) {
        match &cmd {
            Command::Quit => {
                self.should_quit = true;
                return;
            }
            Command::Help => {
                self.modal = Some(Modal::Help);
                return;
            }
            Command::SwitchChat(Some(_)) if self.in_flight.is_some() => {
                self.set_notice(NOTICE_BUSY, false);
                return;
            }
            Command::ChangeModel(_) | Command::SystemPrompt(_) | Command::Stats
                if self.active_chat.is_none() =>
            {
                self.set_notice(NOTICE_NO_CHAT, false);
                return;
            }
            _ => {}
        }
        let chat = self.active_chat.clone().unwrap_or_default();
        match self.manager.execute(&chat, cmd) {
            CommandOutcome::Info(mut lines) => {
                if lines.len() == 1 {
                    self.set_notice(lines.remove(0), false);
                } else {
                    self.show_info(lines);
                }
            }
            CommandOutcome::SwitchChat(name) => {
                self.refresh_chats();
                self.activate_chat(&name);
                self.focus = Focus::Input;
                self.set_notice(format!("Switched to chat '{}'", name), false);
            }
            CommandOutcome::PickModel => self.open_model_picker(),
            CommandOutcome::Help => self.modal = Some(Modal::Help),
            CommandOutcome::Quit => self.should_quit = true,
        }
        self.refresh_details();
        self.refresh_chats();
        self.invalidate_chat_cache();
    }

    pub fn on_tick(&mut self) {
        self.tick = self.tick.wrapping_add(1);
        let Some(flight) = &self.in_flight else {
            return;
        };
        self.dirty = true;
        let mut events = Vec::new();
        let mut disconnected = false;
        for _ in 0..64 {
            match flight.handle.rx.try_recv() {
                Ok(ev) => events.push(ev),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    disconnected = true;
                    break;
                }
            }
        }
        for ev in events {
            match ev {
                WorkerEvent::Delta(s) => {
                    if let Some(m) = self.messages.last_mut() {
                        m.content.push_str(&s);
                    }
                }
                WorkerEvent::Finished {
                    reply,
                    usage,
                    elapsed,
                } => {
                    self.finish_request(&reply, usage, elapsed);
                    return;
                }
                WorkerEvent::Failed(e) => {
                    self.fail_request(e);
                    return;
                }
            }
        }
        if disconnected {
            self.fail_request(ChatError::Other("worker stopped without a result".into()));
        }
    }

    fn finish_request(&mut self, reply: &str, usage: Usage, elapsed: Duration) {
        let Some(flight) = self.in_flight.take() else {
            return;
        };
        match self.manager.complete_turn(flight.turn, reply, usage, elapsed) {
            Ok(summary) => self.set_notice(summary.to_string(), false),
            Err(e) => {
                warn!(target: "tui", "save reply failed: {}", e);
                self.set_notice(format!("Could not save reply: {}", e), true);
            }
        }
        self.after_request();
    }

    fn fail_request(&mut self, err: ChatError) {
        let Some(flight) = self.in_flight.take() else {
            return;
        };
        if let Err(e) = self.manager.abort_turn(flight.turn) {
            warn!(target: "tui", "rollback failed: {}", e);
        }
        match err {
            ChatError::Canceled => self.set_notice(NOTICE_CANCELED, false),
            e => self.set_notice(format!("Error: {}", e), true),
        }
        if self.input.is_empty() {
            self.input.set(flight.text);
        }
        self.after_request();
    }

    fn after_request(&mut self) {
        self.reload_messages();
        self.refresh_details();
        self.refresh_chats();
    }

    /// Cancels and rolls back a request still running at exit.
    pub fn abandon_request(&mut self) {
        if let Some(flight) = self.in_flight.take() {
            flight.handle.cancel();
            if let Err(e) = self.manager.abort_turn(flight.turn) {
                warn!(target: "tui", "rollback at exit failed: {}", e);
            }
        }
    }

    pub fn save_ui_state(&self) {
        if let Err(e) = crate::persist::save_state(self) {
            warn!(target: "tui", "save ui state: {:#}", e);
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use gptcli_core::config::GlobalConfig;
    use gptcli_core::session::SessionManager;
    use gptcli_core::store::Store;
    use tempfile::TempDir;

    use super::App;

    pub fn app_in(dir: &TempDir) -> App {
        let store = Store::new(dir.path().join("conversations"));
        let manager = SessionManager::new(store, GlobalConfig::default());
        App::new(
            manager,
            Err("OPENAI_API_KEY is not set".into()),
            None,
            true,
            Some(dir.path().join("ui_state.json")),
        )
    }

    pub fn app() -> (TempDir, App) {
        let dir = TempDir::new().unwrap();
        let app = app_in(&dir);
        (dir, app)
    }

    pub fn app_with_chat(name: &str) -> (TempDir, App) {
        let (dir, mut app) = app();
        app.manager.create_chat(name, None).unwrap();
        app.refresh_chats();
        app.activate_chat(name);
        app.focus = super::Focus::Input;
        (dir, app)
    }
}
