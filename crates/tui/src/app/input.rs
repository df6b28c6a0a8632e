use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use unicode_segmentation::UnicodeSegmentation;

/// Grapheme-aware edit buffer shared by the prompt and the modal fields.
/// `cursor` counts graphemes, not bytes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TextInput {
    pub text: String,
    pub cursor: usize,
}

impl TextInput {
    pub fn with_text<S: Into<String>>(s: S) -> Self {
        let text = s.into();
        let cursor = text.graphemes(true).count();
        Self { text, cursor }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.cursor = 0;
    }

    pub fn set<S: Into<String>>(&mut self, s: S) {
        *self = Self::with_text(s);
    }

    fn len(&self) -> usize {
        self.text.graphemes(true).count()
    }

    pub fn insert_text(&mut self, s: &str) {
        let parts: Vec<&str> = self.text.graphemes(true).collect();
        let idx = self.cursor.min(parts.len());
        let mut new_text = String::with_capacity(self.text.len() + s.len());
        for g in &parts[..idx] {
            new_text.push_str(g);
        }
        new_text.push_str(s);
        for g in &parts[idx..] {
            new_text.push_str(g);
        }
        self.text = new_text;
        let added = s.graphemes(true).count();
        self.cursor = (idx + added).min(self.len());
    }

    pub fn delete_left(&mut self) {
        if self.cursor == 0 {
            return;
        }
        let mut parts: Vec<&str> = self.text.graphemes(true).collect();
        let idx = self.cursor.min(parts.len());
        parts.remove(idx - 1);
        self.text = parts.concat();
        self.cursor = idx - 1;
    }

    pub fn delete_right(&mut self) {
        let mut parts: Vec<&str> = self.text.graphemes(true).collect();
        let idx = self.cursor.min(parts.len());
        if idx < parts.len() {
            parts.remove(idx);
            self.text = parts.concat();
        }
    }

    pub fn move_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn move_right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.len());
    }

    fn line_start(parts: &[&str], from: usize) -> usize {
        let mut i = from.min(parts.len());
        while i > 0 && parts[i - 1] != "\n" {
            i -= 1;
        }
        i
    }

    fn line_end(parts: &[&str], from: usize) -> usize {
        let mut i = from.min(parts.len());
        while i < parts.len() && parts[i] != "\n" {
            i += 1;
        }
        i
    }

    pub fn move_line_start(&mut self) {
        let parts: Vec<&str> = self.text.graphemes(true).collect();
        self.cursor = Self::line_start(&parts, self.cursor);
    }

    pub fn move_line_end(&mut self) {
        let parts: Vec<&str> = self.text.graphemes(true).collect();
        self.cursor = Self::line_end(&parts, self.cursor);
    }

    fn word_left(parts: &[&str], from: usize) -> usize {
        let mut i = from.min(parts.len());
        while i > 0 && parts[i - 1].trim().is_empty() {
            i -= 1;
        }
        while i > 0 && !parts[i - 1].trim().is_empty() {
            i -= 1;
        }
        i
    }

    pub fn move_word_left(&mut self) {
        let parts: Vec<&str> = self.text.graphemes(true).collect();
        self.cursor = Self::word_left(&parts, self.cursor);
    }

    pub fn move_word_right(&mut self) {
        let parts: Vec<&str> = self.text.graphemes(true).collect();
        let mut i = self.cursor.min(parts.len());
        while i < parts.len() && parts[i].trim().is_empty() {
            i += 1;
        }
        while i < parts.len() && !parts[i].trim().is_empty() {
            i += 1;
        }
        self.cursor = i;
    }

    fn remove_range(&mut self, start: usize, end: usize) {
        let mut parts: Vec<&str> = self.text.graphemes(true).collect();
        let end = end.min(parts.len());
        let start = start.min(end);
        parts.drain(start..end);
        self.text = parts.concat();
        self.cursor = start;
    }

    pub fn delete_prev_word(&mut self) {
        let parts: Vec<&str> = self.text.graphemes(true).collect();
        let cur = self.cursor.min(parts.len());
        let start = Self::word_left(&parts, cur);
        self.remove_range(start, cur);
    }

    pub fn kill_to_line_start(&mut self) {
        let parts: Vec<&str> = self.text.graphemes(true).collect();
        let cur = self.cursor.min(parts.len());
        let start = Self::line_start(&parts, cur);
        self.remove_range(start, cur);
    }

    pub fn kill_to_line_end(&mut self) {
        let parts: Vec<&str> = self.text.graphemes(true).collect();
        let cur = self.cursor.min(parts.len());
        let end = Self::line_end(&parts, cur);
        self.remove_range(cur, end);
        self.cursor = cur;
    }

    /// Applies the editing keys common to every text field. Returns false
    /// for keys the caller should handle (Enter, Up/Down, Esc, Tab, ...).
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('w') if ctrl => self.delete_prev_word(),
            KeyCode::Char('u') if ctrl => self.kill_to_line_start(),
            KeyCode::Char('k') if ctrl => self.kill_to_line_end(),
            KeyCode::Char('a') if ctrl => self.move_line_start(),
            KeyCode::Char('e') if ctrl => self.move_line_end(),
            KeyCode::Char(_) if ctrl => return false,
            KeyCode::Char(ch) => {
                let mut buf = [0u8; 4];
                self.insert_text(ch.encode_utf8(&mut buf));
            }
            KeyCode::Backspace => self.delete_left(),
            KeyCode::Delete => self.delete_right(),
            KeyCode::Left if ctrl => self.move_word_left(),
            KeyCode::Right if ctrl => self.move_word_right(),
            KeyCode::Left => self.move_left(),
            KeyCode::Right => self.move_right(),
            KeyCode::Home => self.move_line_start(),
            KeyCode::End => self.move_line_end(),
            _ => return false,
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    #[test]
    fn insert_and_delete_respect_graphemes() {
        let mut t = TextInput::default();
        t.insert_text("ae\u{301}z");
        assert_eq!(t.cursor, 3);
        t.move_left();
        t.delete_left();
        assert_eq!(t.text, "az");
        assert_eq!(t.cursor, 1);
        t.delete_right();
        assert_eq!(t.text, "a");
        t.delete_right();
        assert_eq!(t.text, "a");
    }

    #[test]
    fn line_navigation_and_kills() {
        let mut t = TextInput::with_text("first line\nsecond line");
        t.move_line_start();
        assert_eq!(t.cursor, 11);
        t.move_word_right();
        t.kill_to_line_end();
        assert_eq!(t.text, "first line\nsecond");
        t.kill_to_line_start();
        assert_eq!(t.text, "first line\n");
        assert_eq!(t.cursor, 11);
    }

    #[test]
    fn delete_prev_word_skips_trailing_space() {
        let mut t = TextInput::with_text("hello brave  ");
        t.delete_prev_word();
        assert_eq!(t.text, "hello ");
        assert_eq!(t.cursor, 6);
    }

    #[test]
    fn handle_key_reports_unconsumed_keys() {
        let mut t = TextInput::default();
        assert!(t.handle_key(key(KeyCode::Char('x'), KeyModifiers::NONE)));
        assert!(t.handle_key(key(KeyCode::Char('Y'), KeyModifiers::SHIFT)));
        assert_eq!(t.text, "xY");
        assert!(!t.handle_key(key(KeyCode::Enter, KeyModifiers::NONE)));
        assert!(!t.handle_key(key(KeyCode::Char('c'), KeyModifiers::CONTROL)));
        assert!(t.handle_key(key(KeyCode::Char('u'), KeyModifiers::CONTROL)));
        assert!(t.is_empty());
    }
}
