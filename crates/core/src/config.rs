use std::{collections::BTreeMap, env, fs, path::Path, path::PathBuf};

use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const CONFIG_ENV: &str = "GPTCLI_CONFIG";
pub const CONVERSATIONS_ENV: &str = "GPTCLI_CONVERSATIONS_DIR";

pub const DEFAULT_MODEL: &str = "gpt-5.1";
pub const DEFAULT_HISTORY_WINDOW: usize = 10;

/// USD per million tokens.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input: f64,
    pub output: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApiSettings {
    pub base_url: String,
    pub wire_api: String, // "responses" | "chat" | "auto"
    pub timeout_ms: u64,
    pub stream_idle_timeout_ms: u64,
    pub stream_max_retries: u32,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            wire_api: "responses".to_string(),
            timeout_ms: 120_000,
            stream_idle_timeout_ms: 300_000,
            stream_max_retries: 5,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GlobalConfig {
    pub default_model: String,
    pub pricing: BTreeMap<String, ModelPricing>,
    pub system_prompts: BTreeMap<String, String>,
    pub history_window: usize,
    pub stream: bool,
    pub user_name: String,
    pub user_color: String,
    pub assistant_color: String,
    pub conversations_dir: Option<PathBuf>,
    pub api: ApiSettings,
}

// On-disk shape: every key optional so partial files merge over defaults.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    default_model: Option<String>,
    pricing: Option<BTreeMap<String, ModelPricing>>,
    system_prompts: Option<BTreeMap<String, String>>,
    history_window: Option<usize>,
    stream: Option<bool>,
    user_name: Option<String>,
    user_color: Option<String>,
    assistant_color: Option<String>,
    conversations_dir: Option<PathBuf>,
    api: Option<FileApiSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct FileApiSettings {
    base_url: Option<String>,
    wire_api: Option<String>,
    timeout_ms: Option<u64>,
    stream_idle_timeout_ms: Option<u64>,
    stream_max_retries: Option<u32>,
}

fn builtin_pricing() -> BTreeMap<String, ModelPricing> {
    [
        ("gpt-5.1", 2.50, 10.00),
        ("gpt-5", 1.25, 10.00),
        ("gpt-5-mini", 0.25, 2.00),
        ("gpt-5-nano", 0.05, 0.40),
        ("gpt-4.1", 2.00, 8.00),
        ("gpt-4.1-mini", 0.40, 1.60),
        ("gpt-4o", 2.50, 10.00),
        ("gpt-4o-mini", 0.15, 0.60),
        ("o3", 2.00, 8.00),
        ("o4-mini", 1.10, 4.40),
    ]
    .into_iter()
    .map(|(m, input, output)| (m.to_string(), ModelPricing { input, output }))
    .collect()
}

fn builtin_system_prompts() -> BTreeMap<String, String> {
    [
        ("default", "You are a helpful assistant."),
        (
            "concise",
            "You are a helpful assistant. Answer as briefly as possible without losing accuracy.",
        ),
        (
            "coder",
            "You are an expert software engineer. Prefer working code over prose and explain trade-offs only when asked.",
        ),
        (
            "teacher",
            "You are a patient teacher. Explain step by step and check understanding with short examples.",
        ),
        (
            "translator",
            "You are a translator. Translate the user's text, preserving tone and formatting, without commentary.",
        ),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            default_model: DEFAULT_MODEL.to_string(),
            pricing: builtin_pricing(),
            system_prompts: builtin_system_prompts(),
            history_window: DEFAULT_HISTORY_WINDOW,
            stream: true,
            user_name: "You".to_string(),
            user_color: "cyan".to_string(),
            assistant_color: "green".to_string(),
            conversations_dir: None,
            api: ApiSettings::default(),
        }
    }
}

impl GlobalConfig {
    /// Loads from `GPTCLI_CONFIG` or the platform config directory.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(p) => Self::load_from(&p),
            None => Self::default(),
        }
    }

    pub fn config_path() -> Option<PathBuf> {
        if let Ok(p) = env::var(CONFIG_ENV) {
            if !p.trim().is_empty() {
                return Some(PathBuf::from(p));
            }
        }
        let base = BaseDirs::new()?;
        Some(base.config_dir().join("gptcli").join("config.json"))
    }

    /// Missing or unreadable files give the built-in defaults.
    pub fn load_from(path: &Path) -> Self {
        let mut cfg = Self::default();
        if !path.exists() {
            return cfg;
        }
        let data = match fs::read_to_string(path) {
            Ok(d) => d,
            Err(e) => {
                warn!(target: "config", "read {}: {}", path.display(), e);
                return cfg;
            }
        };
        match serde_json::from_str::<FileConfig>(&data) {
            Ok(file) => cfg.merge(file),
            Err(e) => warn!(target: "config", "ignoring malformed {}: {}", path.display(), e),
        }
        cfg
    }

    fn merge(&mut self, file: FileConfig) {
        if let Some(m) = file.default_model.filter(|m| !m.trim().is_empty()) {
            self.default_model = m;
        }
        if let Some(p) = file.pricing {
            self.pricing.extend(p);
        }
        if let Some(p) = file.system_prompts {
            self.system_prompts.extend(p);
        }
        if let Some(w) = file.history_window {
            self.history_window = w.max(1);
        }
        if let Some(s) = file.stream {
            self.stream = s;
        }
        if let Some(n) = file.user_name {
            self.user_name = n;
        }
        if let Some(c) = file.user_color {
            self.user_color = c;
        }
        if let Some(c) = file.assistant_color {
            self.assistant_color = c;
        }
        if file.conversations_dir.is_some() {
            self.conversations_dir = file.conversations_dir;
        }
        if let Some(api) = file.api {
            if let Some(v) = api.base_url {
                self.api.base_url = v;
            }
            if let Some(v) = api.wire_api {
                self.api.wire_api = v;
            }
            if let Some(v) = api.timeout_ms {
                self.api.timeout_ms = v;
            }
            if let Some(v) = api.stream_idle_timeout_ms {
                self.api.stream_idle_timeout_ms = v;
            }
            if let Some(v) = api.stream_max_retries {
                self.api.stream_max_retries = v;
            }
        }
    }

    /// Env var, then config key, then the platform data directory.
    pub fn conversations_root(&self) -> PathBuf {
        if let Ok(p) = env::var(CONVERSATIONS_ENV) {
            if !p.trim().is_empty() {
                return PathBuf::from(p);
            }
        }
        if let Some(p) = &self.conversations_dir {
            return p.clone();
        }
        match BaseDirs::new() {
            Some(base) => base.data_dir().join("gptcli").join("conversations"),
            None => PathBuf::from("conversations"),
        }
    }

    /// Preset names resolve to their text; anything else is custom text.
    pub fn resolve_system_prompt(&self, name_or_text: &str) -> String {
        self.system_prompts
            .get(name_or_text)
            .cloned()
            .unwrap_or_else(|| name_or_text.to_string())
    }

    pub fn is_preset(&self, name: &str) -> bool {
        self.system_prompts.contains_key(name)
    }

    /// Models with a pricing entry, default model first.
    pub fn known_models(&self) -> Vec<String> {
        let mut out = vec![self.default_model.clone()];
        for m in self.pricing.keys() {
            if out.iter().all(|x| x != m) {
                out.push(m.clone());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = GlobalConfig::load_from(&dir.path().join("nonexistent_config.json"));
        assert_eq!(cfg.default_model, "gpt-5.1");
        assert!(cfg.system_prompts.contains_key("default"));
        assert_eq!(cfg.history_window, 10);
    }

    #[test]
    fn corrupted_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("corrupted_config.json");
        fs::write(&path, r#"{"invalid": json}"#).unwrap();
        let cfg = GlobalConfig::load_from(&path);
        assert_eq!(cfg, GlobalConfig::default());
    }

    #[test]
    fn partial_file_merges_over_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("partial_config.json");
        fs::write(
            &path,
            r#"{
                "default_model": "gpt-4",
                "system_prompts": {"pirate": "Talk like a pirate."},
                "pricing": {"gpt-4": {"input": 30.0, "output": 60.0}},
                "api": {"wire_api": "chat"}
            }"#,
        )
        .unwrap();
        let cfg = GlobalConfig::load_from(&path);
        assert_eq!(cfg.default_model, "gpt-4");
        assert!(cfg.system_prompts.contains_key("default"));
        assert_eq!(cfg.system_prompts["pirate"], "Talk like a pirate.");
        assert_eq!(cfg.pricing["gpt-4"].input, 30.0);
        assert!(cfg.pricing.contains_key("gpt-5.1"));
        assert_eq!(cfg.api.wire_api, "chat");
        assert_eq!(cfg.api.stream_max_retries, 5);
    }

    #[test]
    fn resolves_presets_and_custom_text() {
        let cfg = GlobalConfig::default();
        assert_eq!(
            cfg.resolve_system_prompt("default"),
            "You are a helpful assistant."
        );
        assert_eq!(cfg.resolve_system_prompt("Be terse."), "Be terse.");
        assert!(cfg.is_preset("coder"));
        assert!(!cfg.is_preset("Be terse."));
    }

    #[test]
    fn known_models_lists_default_first_without_duplicates() {
        let cfg = GlobalConfig::default();
        let models = cfg.known_models();
        assert_eq!(models[0], "gpt-5.1");
        assert_eq!(models.iter().filter(|m| *m == "gpt-5.1").count(), 1);
        assert!(models.contains(&"gpt-4o-mini".to_string()));
    }
}
