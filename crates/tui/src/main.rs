mod app;
mod cli;
mod events;
mod logging;
mod persist;
mod repl;
mod strings;
mod terminal;
mod theme;
mod ui;
mod worker;

use anyhow::Result;
use clap::Parser;
use gptcli_core::config::GlobalConfig;
use gptcli_core::session::SessionManager;
use gptcli_core::store::{ChatSummary, Store};
use providers::OpenAiConfig;
use terminal::TerminalGuard;
use tracing::info;

const DEFAULT_CHAT: &str = "default";

fn chat_listing(chats: &[ChatSummary]) -> Vec<String> {
    if chats.is_empty() {
        return vec!["No saved chats".to_string()];
    }
    let width = chats.iter().map(|c| c.name.len()).max().unwrap_or(0);
    chats
        .iter()
        .map(|c| {
            let used = c
                .last_used
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "never".to_string());
            format!(
                "{:<width$}  {:>4} messages  {}  last used {}",
                c.name,
                c.message_count,
                c.model,
                used,
                width = width
            )
        })
        .collect()
}

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    let _guard = match logging::init() {
        Ok(g) => Some(g),
        Err(e) => {
            eprintln!("logging disabled: {:#}", e);
            None
        }
    };

    let config = GlobalConfig::load();
    let store = Store::new(config.conversations_root());
    let stream = config.stream && !cli.no_stream;
    info!(target: "tui", "start root={} stream={}", store.root().display(), stream);
    let manager = SessionManager::new(store, config).with_model_override(cli.model.clone());

    if cli.list_chats {
        for line in chat_listing(&manager.list_chats()) {
            println!("{}", line);
        }
        return Ok(());
    }

    let provider = OpenAiConfig::from_env(&manager.config().api);
    if cli.plain {
        let chat = cli.chat.unwrap_or_else(|| DEFAULT_CHAT.to_string());
        let mut repl = repl::Repl::new(manager, provider?, chat, stream)?;
        return repl.run();
    }

    let mut app = app::App::new(
        manager,
        provider.map_err(|e| e.to_string()),
        cli.chat,
        stream,
        persist::state_path(),
    );
    let mut term = TerminalGuard::new()?;
    events::run(&mut term.terminal, &mut app)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn listing_aligns_names() {
        let chats = vec![
            ChatSummary {
                name: "work".into(),
                model: "gpt-5.1".into(),
                message_count: 12,
                last_used: Some(Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap()),
            },
            ChatSummary {
                name: "ideas-long".into(),
                model: "o3".into(),
                message_count: 0,
                last_used: None,
            },
        ];
        let lines = chat_listing(&chats);
        assert_eq!(
            lines[0],
            "work          12 messages  gpt-5.1  last used 2025-03-01 09:30"
        );
        assert!(lines[1].ends_with("o3  last used never"));
        assert_eq!(chat_listing(&[]), vec!["No saved chats".to_string()]);
    }
}
