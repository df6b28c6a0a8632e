use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::llm::Role;
use crate::stats::Statistics;

const CONFIG_SUFFIX: &str = ".config.json";
const CONFIG_STEM: &str = ".config";
const STATS_DIR: &str = "statistics";
const SYSTEM_PROMPTS_DIR: &str = "system_prompts";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("encode: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("chat \"{0}\" already exists")]
    ChatExists(String),
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// One persisted transcript entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ChatMessage {
    pub fn user<S: Into<String>>(s: S) -> Self {
        Self {
            role: Role::User,
            content: s.into(),
            model: None,
            timestamp: Some(Utc::now()),
        }
    }

    pub fn assistant<S: Into<String>>(s: S, model: &str) -> Self {
        Self {
            role: Role::Assistant,
            content: s.into(),
            model: Some(model.to_string()),
            timestamp: Some(Utc::now()),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Preset name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SystemPromptFile {
    system_prompt: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SystemPromptOnDisk {
    Text(String),
    Object(SystemPromptFile),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChatSummary {
    pub name: String,
    pub model: String,
    pub message_count: usize,
    pub last_used: Option<DateTime<Utc>>,
}

/// File layout for every chat under one conversations root.
#[derive(Clone, Debug)]
pub struct Store {
    root: PathBuf,
}

pub fn sanitize(name: &str) -> String {
    let mut s = name
        .trim()
        .replace(['<', '>', ':', '"', '/', '\\', '|', '?', '*'], "_");
    if s.is_empty() {
        s = "default".to_string();
    }
    // A transcript must never share a file name with a chat config.
    let stem = s.len().saturating_sub(CONFIG_STEM.len());
    if s.is_char_boundary(stem) && s[stem..].eq_ignore_ascii_case(CONFIG_STEM) {
        s.replace_range(stem..stem + 1, "_");
    }
    s
}

fn ensure_dir(dir: &Path) {
    if let Err(e) = fs::create_dir_all(dir) {
        warn!(target: "store", "create dir {}: {}", dir.display(), e);
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    if !path.exists() {
        return None;
    }
    let data = match fs::read(path) {
        Ok(d) => d,
        Err(e) => {
            warn!(target: "store", "read {}: {}", path.display(), e);
            return None;
        }
    };
    match serde_json::from_slice(&data) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(target: "store", "ignoring malformed {}: {}", path.display(), e);
            None
        }
    }
}

fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent);
    }
    let data = serde_json::to_vec_pretty(value)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    {
        let mut f = fs::File::create(&tmp).map_err(io_err(&tmp))?;
        f.write_all(&data).map_err(io_err(&tmp))?;
        f.flush().map_err(io_err(&tmp))?;
    }
    fs::rename(&tmp, path).map_err(io_err(path))?;
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

impl Store {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn conversation_path(&self, chat: &str) -> PathBuf {
        ensure_dir(&self.root);
        self.root.join(format!("{}.json", sanitize(chat)))
    }

    pub fn chat_config_path(&self, chat: &str) -> PathBuf {
        ensure_dir(&self.root);
        self.root.join(format!("{}{}", sanitize(chat), CONFIG_SUFFIX))
    }

    pub fn stats_path(&self, chat: &str) -> PathBuf {
        let dir = self.root.join(STATS_DIR);
        ensure_dir(&dir);
        dir.join(format!("{}.json", sanitize(chat)))
    }

    pub fn system_prompt_path(&self, chat: &str) -> PathBuf {
        let dir = self.root.join(SYSTEM_PROMPTS_DIR);
        ensure_dir(&dir);
        dir.join(format!("{}.json", sanitize(chat)))
    }

    /// Missing or malformed transcripts read as empty.
    pub fn load_conversation(&self, chat: &str) -> Vec<ChatMessage> {
        read_json(&self.conversation_path(chat)).unwrap_or_default()
    }

    pub fn save_conversation(&self, chat: &str, msgs: &[ChatMessage]) -> Result<(), StoreError> {
        let path = self.conversation_path(chat);
        debug!(target: "store", "save {} messages to {}", msgs.len(), path.display());
        write_json_atomic(&path, msgs)
    }

    pub fn load_chat_config(&self, chat: &str) -> ChatConfig {
        read_json(&self.chat_config_path(chat)).unwrap_or_default()
    }

    pub fn save_chat_config(&self, chat: &str, cfg: &ChatConfig) -> Result<(), StoreError> {
        write_json_atomic(&self.chat_config_path(chat), cfg)
    }

    pub fn load_statistics(&self, chat: &str) -> Statistics {
        read_json(&self.stats_path(chat)).unwrap_or_default()
    }

    pub fn save_statistics(&self, chat: &str, stats: &Statistics) -> Result<(), StoreError> {
        write_json_atomic(&self.stats_path(chat), stats)
    }

    /// No-op without a chat name. Returns the new totals when saved.
    pub fn update_statistics(
        &self,
        chat: Option<&str>,
        input_tokens: u64,
        output_tokens: u64,
        total_tokens: u64,
        cost: Option<f64>,
        elapsed_secs: f64,
    ) -> Result<Option<Statistics>, StoreError> {
        let Some(chat) = chat.filter(|c| !c.trim().is_empty()) else {
            return Ok(None);
        };
        let mut stats = self.load_statistics(chat);
        stats.record(input_tokens, output_tokens, total_tokens, cost, elapsed_secs);
        self.save_statistics(chat, &stats)?;
        Ok(Some(stats))
    }

    pub fn load_system_prompt(&self, chat: &str) -> Option<String> {
        let text = match read_json::<SystemPromptOnDisk>(&self.system_prompt_path(chat))? {
            SystemPromptOnDisk::Text(t) => t,
            SystemPromptOnDisk::Object(o) => o.system_prompt,
        };
        let text = text.trim().to_string();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    /// Empty text removes the override.
    pub fn save_system_prompt(&self, chat: &str, text: &str) -> Result<(), StoreError> {
        let path = self.system_prompt_path(chat);
        let text = text.trim();
        if text.is_empty() {
            return remove_if_exists(&path);
        }
        write_json_atomic(
            &path,
            &SystemPromptFile {
                system_prompt: text.to_string(),
            },
        )
    }

    pub fn chat_exists(&self, chat: &str) -> bool {
        self.conversation_path(chat).exists()
    }

    pub fn create_chat(&self, chat: &str) -> Result<(), StoreError> {
        if self.chat_exists(chat) {
            return Err(StoreError::ChatExists(chat.to_string()));
        }
        self.save_conversation(chat, &[])
    }

    /// Removes transcript, config, statistics and system prompt together.
    pub fn delete_chat(&self, chat: &str) -> Result<(), StoreError> {
        remove_if_exists(&self.conversation_path(chat))?;
        remove_if_exists(&self.chat_config_path(chat))?;
        remove_if_exists(&self.stats_path(chat))?;
        remove_if_exists(&self.system_prompt_path(chat))?;
        debug!(target: "store", "deleted chat {}", chat);
        Ok(())
    }

    /// Most recently used first; ties by name.
    pub fn list_chats(&self, default_model: &str) -> Vec<ChatSummary> {
        let entries = match fs::read_dir(&self.root) {
            Ok(e) => e,
            Err(_) => return Vec::new(),
        };
        let mut out = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if file_name.ends_with(CONFIG_SUFFIX) {
                continue;
            }
            let Some(name) = file_name.strip_suffix(".json") else {
                continue;
            };
            let cfg = self.load_chat_config(name);
            let message_count = self.load_conversation(name).len();
            let last_used = cfg.last_used.or_else(|| {
                fs::metadata(&path)
                    .and_then(|m| m.modified())
                    .ok()
                    .map(DateTime::<Utc>::from)
            });
            out.push(ChatSummary {
                name: name.to_string(),
                model: cfg.model.unwrap_or_else(|| default_model.to_string()),
                message_count,
                last_used,
            });
        }
        out.sort_by(|a, b| b.last_used.cmp(&a.last_used).then_with(|| a.name.cmp(&b.name)));
        out
    }
}
