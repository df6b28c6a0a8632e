use crossterm::event::{KeyCode, KeyEvent};
use tracing::{info, warn};

use crate::strings::NOTICE_BUSY;

use super::{App, Focus};

impl App {
    pub fn chat_list_inner_height(&self) -> u16 {
        self.chat_list_area
            .map(|a| a.height.saturating_sub(2))
            .unwrap_or(0)
    }

    pub fn chat_list_max_scroll(&self) -> u16 {
        let h = self.chat_list_inner_height() as usize;
        if h == 0 {
            0
        } else {
            self.chats.len().saturating_sub(h) as u16
        }
    }

    pub fn ensure_chat_list_visible(&mut self) {
        let h = self.chat_list_inner_height() as usize;
        if h == 0 {
            return;
        }
        let start = self.chat_list_scroll as usize;
        let end = start + h - 1;
        if self.selected < start {
            self.chat_list_scroll = self.selected as u16;
        } else if self.selected > end {
            self.chat_list_scroll = (self.selected + 1 - h) as u16;
        }
        self.chat_list_scroll = self.chat_list_scroll.min(self.chat_list_max_scroll());
    }

    pub fn selected_chat_name(&self) -> Option<String> {
        self.chats.get(self.selected).map(|c| c.name.clone())
    }

    /// Reloads the listing, keeping the highlight on the same chat name.
    pub fn refresh_chats(&mut self) {
        let keep = self.selected_chat_name().or_else(|| self.active_chat.clone());
        self.chats = self.manager.list_chats();
        self.selected = keep
            .and_then(|name| self.chats.iter().position(|c| c.name == name))
            .unwrap_or(0)
            .min(self.chats.len().saturating_sub(1));
        self.ensure_chat_list_visible();
    }

    /// Makes `name` the conversation shown and sent to.
    pub fn activate_chat(&mut self, name: &str) {
        if let Some(i) = self.chats.iter().position(|c| c.name == name) {
            self.selected = i;
        }
        if self.active_chat.as_deref() != Some(name) {
            info!(target: "tui", "active chat {}", name);
        }
        self.active_chat = Some(name.to_string());
        self.ensure_chat_list_visible();
        self.reload_messages();
        self.refresh_details();
        self.save_ui_state();
    }

    /// Moves the highlight; the highlighted chat becomes active.
    pub fn select_chat(&mut self, idx: usize) {
        if idx >= self.chats.len() || idx == self.selected && self.active_chat.is_some() {
            return;
        }
        if self.is_busy() {
            self.set_notice(NOTICE_BUSY, false);
            return;
        }
        let name = self.chats[idx].name.clone();
        self.activate_chat(&name);
    }

    pub fn chat_list_select_up(&mut self) {
        self.select_chat(self.selected.saturating_sub(1));
    }

    pub fn chat_list_select_down(&mut self) {
        self.select_chat(self.selected + 1);
    }

    pub fn delete_chat(&mut self, name: &str) {
        if self.is_busy() {
            self.set_notice(NOTICE_BUSY, false);
            return;
        }
        if let Err(e) = self.manager.delete_chat(name) {
            warn!(target: "tui", "delete chat {}: {}", name, e);
            self.set_notice(format!("Could not delete chat '{}': {}", name, e), true);
            return;
        }
        info!(target: "tui", "deleted chat {}", name);
        if self.active_chat.as_deref() == Some(name) {
            self.active_chat = None;
        }
        self.refresh_chats();
        match self.selected_chat_name() {
            Some(next) if self.active_chat.is_none() => self.activate_chat(&next),
            _ => {
                self.reload_messages();
                self.refresh_details();
                self.save_ui_state();
            }
        }
        self.set_notice(format!("Deleted chat '{}'", name), false);
    }

    pub(super) fn on_chat_list_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Up => self.chat_list_select_up(),
            KeyCode::Down => self.chat_list_select_down(),
            KeyCode::Home => self.select_chat(0),
            KeyCode::End => self.select_chat(self.chats.len().saturating_sub(1)),
            KeyCode::Enter => {
                if self.active_chat.is_some() {
                    self.focus = Focus::Input;
                }
            }
            KeyCode::Char('n') => self.open_new_chat(),
            KeyCode::Char('d') | KeyCode::Delete => {
                if self.is_busy() {
                    self.set_notice(NOTICE_BUSY, false);
                } else {
                    self.open_delete_confirm();
                }
            }
            KeyCode::Char('e') => self.open_system_prompt_editor(),
            KeyCode::Char('r') => {
                self.refresh_chats();
                self.refresh_details();
                self.set_notice("Chat list refreshed", false);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::app::modal::Modal;
    use crate::app::test_support::app;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use ratatui::layout::Rect;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn selection_follows_name_across_refresh() {
        let (_dir, mut app) = app();
        for name in ["a", "b", "c"] {
            app.manager.create_chat(name, None).unwrap();
        }
        app.refresh_chats();
        // Most recently used first.
        let names: Vec<_> = app.chats.iter().map(|c| c.name.clone()).collect();
        assert_eq!(names, vec!["c", "b", "a"]);

        app.select_chat(1);
        assert_eq!(app.active_chat.as_deref(), Some("b"));
        app.manager.create_chat("d", None).unwrap();
        app.refresh_chats();
        assert_eq!(app.selected_chat_name().as_deref(), Some("b"));
    }

    #[test]
    fn keyboard_navigation_scrolls_the_list() {
        let (_dir, mut app) = app();
        for i in 0..6 {
            app.manager.create_chat(&format!("chat{}", i), None).unwrap();
        }
        app.refresh_chats();
        app.chat_list_area = Some(Rect::new(0, 0, 20, 5));
        for _ in 0..5 {
            app.on_key(key(KeyCode::Down));
        }
        assert_eq!(app.selected, 5);
        assert_eq!(app.chat_list_scroll, 3);
        app.on_key(key(KeyCode::Home));
        assert_eq!(app.chat_list_scroll, 0);
        assert_eq!(app.active_chat.as_deref(), app.chats.first().map(|c| c.name.as_str()));
    }

    #[test]
    fn delete_requires_confirmation() {
        let (_dir, mut app) = app();
        app.manager.create_chat("keep", None).unwrap();
        app.manager.create_chat("drop", None).unwrap();
        app.refresh_chats();
        app.activate_chat("drop");

        app.on_key(key(KeyCode::Char('d')));
        assert!(matches!(app.modal, Some(Modal::ConfirmDelete { .. })));
        app.on_key(key(KeyCode::Char('n')));
        assert!(app.modal.is_none());
        assert!(app.manager.store().chat_exists("drop"));

        app.on_key(key(KeyCode::Delete));
        app.on_key(key(KeyCode::Char('y')));
        assert!(!app.manager.store().chat_exists("drop"));
        assert_eq!(app.active_chat.as_deref(), Some("keep"));
        assert_eq!(app.chats.len(), 1);
    }

    #[test]
    fn quit_keys() {
        let (_dir, mut app) = app();
        app.on_key(key(KeyCode::Char('q')));
        assert!(app.should_quit);
    }
}
