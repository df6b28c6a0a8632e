use super::App;

impl App {
    // Record input text to history if it's new, and reset navigation state.
    pub fn record_history_entry(&mut self, text: &str) {
        if self.history.last().map(String::as_str) != Some(text) {
            self.history.push(text.to_string());
        }
        self.history_index = None;
    }

    pub fn history_prev(&mut self) {
        if self.history.is_empty() {
            return;
        }
        let idx = match self.history_index {
            None => self.history.len() - 1,
            Some(i) => i.saturating_sub(1),
        };
        self.history_index = Some(idx);
        self.input.set(self.history[idx].clone());
    }

    pub fn history_next(&mut self) {
        let Some(i) = self.history_index else {
            return;
        };
        if i + 1 < self.history.len() {
            self.history_index = Some(i + 1);
            self.input.set(self.history[i + 1].clone());
        } else {
            self.history_index = None;
            self.input.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::app::test_support::app;

    #[test]
    fn navigates_and_dedupes() {
        let (_dir, mut app) = app();
        app.record_history_entry("one");
        app.record_history_entry("two");
        app.record_history_entry("two");
        assert_eq!(app.history, vec!["one", "two"]);

        app.history_prev();
        assert_eq!(app.input.text, "two");
        app.history_prev();
        app.history_prev();
        assert_eq!(app.input.text, "one");
        app.history_next();
        assert_eq!(app.input.text, "two");
        app.history_next();
        assert!(app.input.is_empty());
        assert_eq!(app.history_index, None);
    }
}
