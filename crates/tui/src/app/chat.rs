use gptcli_core::llm::Role;
use gptcli_core::store::ChatMessage;
use textwrap::{wrap, Options};

use crate::strings::THINKING;

use super::App;

/// A transcript entry pre-wrapped to the current width. `lines[0]` is the
/// header; the last line is an empty spacer.
#[derive(Clone, Debug)]
pub struct WrappedMsg {
    pub role: Role,
    pub content_len: usize,
    pub lines: Vec<String>,
}

impl App {
    fn header_for(&self, m: &ChatMessage) -> String {
        match m.role {
            Role::User => format!("{}:", self.manager.config().user_name),
            Role::System => "system:".to_string(),
            Role::Assistant => {
                let model = m
                    .model
                    .clone()
                    .or_else(|| self.active_chat.as_deref().map(|c| self.manager.effective_model(c)))
                    .unwrap_or_else(|| self.manager.config().default_model.clone());
                format!("{}:", model)
            }
        }
    }

    pub fn ensure_chat_wrapped(&mut self, width: u16) {
        let width = width.max(1);
        if self.chat_wrap_width != width || self.chat_cache.len() != self.messages.len() {
            let cache: Vec<WrappedMsg> = self
                .messages
                .iter()
                .map(|m| self.wrap_message(m, width))
                .collect();
            self.chat_cache = cache;
            self.chat_total_lines = self.chat_cache.iter().map(|w| w.lines.len()).sum();
            self.chat_wrap_width = width;
            return;
        }
        // Only the streaming tail changes between full rebuilds.
        if let (Some(last_msg), Some(last_wrap)) = (self.messages.last(), self.chat_cache.last()) {
            if last_msg.content.len() != last_wrap.content_len {
                let idx = self.messages.len() - 1;
                let wrapped = self.wrap_message(last_msg, width);
                self.chat_cache[idx] = wrapped;
                self.chat_total_lines = self.chat_cache.iter().map(|w| w.lines.len()).sum();
            }
        }
    }

    pub fn invalidate_chat_cache(&mut self) {
        self.chat_wrap_width = 0;
        self.chat_cache.clear();
        self.chat_total_lines = 0;
    }

    fn wrap_message(&self, m: &ChatMessage, width: u16) -> WrappedMsg {
        let mut lines = vec![self.header_for(m)];
        let body = if m.content.is_empty() && m.role == Role::Assistant {
            THINKING
        } else {
            m.content.as_str()
        };
        let opts = Options::new(width as usize);
        for para in body.split('\n') {
            if para.is_empty() {
                lines.push(String::new());
                continue;
            }
            lines.extend(wrap(para, &opts).into_iter().map(|c| c.into_owned()));
        }
        lines.push(String::new());
        WrappedMsg {
            role: m.role,
            content_len: m.content.len(),
            lines,
        }
    }

    /// Returns (viewport, max_scroll, first visible line, total lines).
    /// `chat_scroll` counts lines up from the bottom.
    pub fn compute_chat_layout(&mut self, inner_height: u16) -> (usize, usize, usize, usize) {
        let viewport = inner_height as usize;
        let total = self.chat_total_lines;
        let max_scroll = total.saturating_sub(viewport);
        if self.stick_to_bottom {
            self.chat_scroll = 0;
        }
        let scroll = (self.chat_scroll as usize).min(max_scroll);
        self.chat_scroll = scroll as u16;
        (viewport, max_scroll, max_scroll - scroll, total)
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_add(lines);
        self.stick_to_bottom = false;
    }

    pub fn scroll_down(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
        if self.chat_scroll == 0 {
            self.stick_to_bottom = true;
        }
    }
}
