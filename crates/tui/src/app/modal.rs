use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tracing::{info, warn};

use super::input::TextInput;
use super::{App, Focus};
use gptcli_core::session::SystemPromptLabel;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NewChatField {
    Name,
    SystemPrompt,
}

#[derive(Clone, Debug)]
pub struct ModelPickerState {
    pub filter: TextInput,
    pub all: Vec<String>,
    pub filtered: Vec<String>,
    pub selected: usize,
}

impl ModelPickerState {
    pub fn new(all: Vec<String>) -> Self {
        Self {
            filter: TextInput::default(),
            filtered: all.clone(),
            all,
            selected: 0,
        }
    }

    pub fn refilter(&mut self) {
        let q = self.filter.text.trim().to_lowercase();
        self.filtered = if q.is_empty() {
            self.all.clone()
        } else {
            self.all
                .iter()
                .filter(|m| m.to_lowercase().contains(&q))
                .cloned()
                .collect()
        };
        self.selected = self.selected.min(self.filtered.len().saturating_sub(1));
    }

    /// Highlighted entry, or the typed text when nothing matches.
    pub fn choice(&self) -> Option<String> {
        self.filtered.get(self.selected).cloned().or_else(|| {
            let typed = self.filter.text.trim();
            (!typed.is_empty()).then(|| typed.to_string())
        })
    }
}

#[derive(Clone, Debug)]
pub enum Modal {
    NewChat {
        name: TextInput,
        system_prompt: TextInput,
        field: NewChatField,
        error: Option<String>,
    },
    ConfirmDelete {
        chat: String,
    },
    EditSystemPrompt {
        chat: String,
        editor: TextInput,
    },
    ModelPicker(ModelPickerState),
    Help,
    Info {
        title: String,
        lines: Vec<String>,
        scroll: u16,
    },
}

fn is_newline_key(key: &KeyEvent) -> bool {
    key.code == KeyCode::Enter
        && (key.modifiers.contains(KeyModifiers::SHIFT) || key.modifiers.contains(KeyModifiers::ALT))
}

impl App {
    pub fn open_new_chat(&mut self) {
        self.modal = Some(Modal::NewChat {
            name: TextInput::default(),
            system_prompt: TextInput::default(),
            field: NewChatField::Name,
            error: None,
        });
    }

    pub fn open_delete_confirm(&mut self) {
        if let Some(chat) = self.selected_chat_name() {
            self.modal = Some(Modal::ConfirmDelete { chat });
        }
    }

    pub fn open_system_prompt_editor(&mut self) {
        let Some(chat) = self.selected_chat_name() else {
            return;
        };
        let current = match self.manager.chat_details(&chat).system_prompt {
            SystemPromptLabel::Default => String::new(),
            SystemPromptLabel::Preset(name) => name,
            SystemPromptLabel::Custom(text) => text,
        };
        self.modal = Some(Modal::EditSystemPrompt {
            chat,
            editor: TextInput::with_text(current),
        });
    }

    pub fn open_model_picker(&mut self) {
        let Some(chat) = self.active_chat.clone() else {
            return;
        };
        let current = self.manager.effective_model(&chat);
        let mut all = vec![current.clone()];
        all.extend(
            self.manager
                .config()
                .known_models()
                .into_iter()
                .filter(|m| *m != current),
        );
        self.modal = Some(Modal::ModelPicker(ModelPickerState::new(all)));
    }

    pub fn show_info(&mut self, lines: Vec<String>) {
        self.modal = Some(Modal::Info {
            title: crate::strings::TITLE_INFO.to_string(),
            lines,
            scroll: 0,
        });
    }

    pub(super) fn on_modal_key(&mut self, key: KeyEvent) {
        let Some(mut modal) = self.modal.take() else {
            return;
        };
        let keep = match &mut modal {
            Modal::Help => !matches!(
                key.code,
                KeyCode::Esc | KeyCode::Enter | KeyCode::F(1) | KeyCode::Char('?') | KeyCode::Char('q')
            ),
            Modal::Info { lines, scroll, .. } => match key.code {
                KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q') => false,
                KeyCode::Up => {
                    *scroll = scroll.saturating_sub(1);
                    true
                }
                KeyCode::Down => {
                    *scroll = (*scroll + 1).min(lines.len().saturating_sub(1) as u16);
                    true
                }
                _ => true,
            },
            Modal::ConfirmDelete { chat } => match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => {
                    let chat = chat.clone();
                    self.delete_chat(&chat);
                    false
                }
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => false,
                _ => true,
            },
            Modal::EditSystemPrompt { chat, editor } => {
                if is_newline_key(&key) {
                    editor.insert_text("\n");
                    true
                } else {
                    match key.code {
                        KeyCode::Esc => false,
                        KeyCode::Enter => {
                            let chat = chat.clone();
                            match self.manager.set_system_prompt(&chat, &editor.text) {
                                Ok(()) => {
                                    info!(target: "tui", "system prompt updated for {}", chat);
                                    self.set_notice("System prompt saved", false);
                                    self.refresh_details();
                                }
                                Err(e) => {
                                    warn!(target: "tui", "save system prompt: {}", e);
                                    self.set_notice(format!("Could not save system prompt: {}", e), true);
                                }
                            }
                            false
                        }
                        _ => {
                            editor.handle_key(key);
                            true
                        }
                    }
                }
            }
            Modal::ModelPicker(st) => match key.code {
                KeyCode::Esc => false,
                KeyCode::Enter => {
                    if let Some(model) = st.choice() {
                        self.change_model(&model);
                    }
                    false
                }
                KeyCode::Up => {
                    st.selected = st.selected.saturating_sub(1);
                    true
                }
                KeyCode::Down => {
                    if st.selected + 1 < st.filtered.len() {
                        st.selected += 1;
                    }
                    true
                }
                _ => {
                    if st.filter.handle_key(key) {
                        st.refilter();
                    }
                    true
                }
            },
            Modal::NewChat {
                name,
                system_prompt,
                field,
                error,
            } => match key.code {
                KeyCode::Esc => false,
                KeyCode::Tab | KeyCode::BackTab | KeyCode::Up | KeyCode::Down => {
                    *field = match field {
                        NewChatField::Name => NewChatField::SystemPrompt,
                        NewChatField::SystemPrompt => NewChatField::Name,
                    };
                    true
                }
                KeyCode::Enter => {
                    let chat = name.text.trim().to_string();
                    if chat.is_empty() {
                        *error = Some("Chat name cannot be empty".into());
                        true
                    } else {
                        match self.manager.create_chat(&chat, Some(&system_prompt.text)) {
                            Ok(stored) => {
                                self.refresh_chats();
                                self.activate_chat(&stored);
                                self.focus = Focus::Input;
                                false
                            }
                            Err(e) => {
                                *error = Some(e.to_string());
                                true
                            }
                        }
                    }
                }
                _ => {
                    let target = match field {
                        NewChatField::Name => name,
                        NewChatField::SystemPrompt => system_prompt,
                    };
                    target.handle_key(key);
                    *error = None;
                    true
                }
            },
        };
        if keep && self.modal.is_none() {
            self.modal = Some(modal);
        }
    }
}
