use std::{fs, io::Write, path::Path, path::PathBuf};

use anyhow::{Context, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::app::App;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiState {
    pub active_chat: Option<String>,
    pub show_chat_list: bool,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            active_chat: None,
            show_chat_list: true,
        }
    }
}

impl From<&App> for UiState {
    fn from(a: &App) -> Self {
        UiState {
            active_chat: a.active_chat.clone(),
            show_chat_list: a.show_chat_list,
        }
    }
}

pub fn state_path() -> Option<PathBuf> {
    let base = BaseDirs::new()?;
    Some(base.config_dir().join("gptcli").join("ui_state.json"))
}

pub fn load_from(path: &Path) -> Result<Option<UiState>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = fs::read(path).with_context(|| format!("read state file: {}", path.display()))?;
    let s: UiState = serde_json::from_slice(&data).with_context(|| "parse state json")?;
    Ok(Some(s))
}

pub fn save_to(path: &Path, state: &UiState) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create state dir: {}", parent.display()))?;
    }
    let data = serde_json::to_vec_pretty(state)?;
    let mut tmp = path.to_path_buf();
    tmp.set_extension("json.tmp");
    {
        let mut f =
            fs::File::create(&tmp).with_context(|| format!("create tmp: {}", tmp.display()))?;
        f.write_all(&data)?;
        f.flush()?;
    }
    fs::rename(&tmp, path).with_context(|| format!("persist state to {}", path.display()))?;
    Ok(())
}

pub fn save_state(app: &App) -> Result<()> {
    let Some(path) = app.state_path.as_deref() else {
        return Ok(());
    };
    save_to(path, &UiState::from(app))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("ui_state.json");
        assert_eq!(load_from(&path).unwrap(), None);

        let state = UiState {
            active_chat: Some("work".into()),
            show_chat_list: false,
        };
        save_to(&path, &state).unwrap();
        assert_eq!(load_from(&path).unwrap(), Some(state));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn missing_fields_use_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ui_state.json");
        fs::write(&path, br#"{"active_chat":"a"}"#).unwrap();
        let s = load_from(&path).unwrap().unwrap();
        assert_eq!(s.active_chat.as_deref(), Some("a"));
        assert!(s.show_chat_list);

        fs::write(&path, b"not json").unwrap();
        assert!(load_from(&path).is_err());
    }
}
