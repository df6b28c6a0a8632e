use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "gptcli", version, about = "Terminal chat client for hosted LLM APIs")]
pub struct Cli {
    /// Chat to open (created if missing)
    #[arg(short, long)]
    pub chat: Option<String>,

    /// Model for this session, overriding the chat's saved model
    #[arg(short, long)]
    pub model: Option<String>,

    /// Print saved chats and exit
    #[arg(long)]
    pub list_chats: bool,

    /// Line-mode prompt instead of the full-screen UI
    #[arg(long)]
    pub plain: bool,

    /// Wait for whole replies instead of streaming
    #[arg(long)]
    pub no_stream: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["gptcli"]).unwrap();
        assert!(cli.chat.is_none());
        assert!(cli.model.is_none());
        assert!(!cli.list_chats && !cli.plain && !cli.no_stream);
    }

    #[test]
    fn all_flags() {
        let cli = Cli::try_parse_from([
            "gptcli",
            "--chat",
            "work",
            "-m",
            "gpt-4o",
            "--plain",
            "--no-stream",
        ])
        .unwrap();
        assert_eq!(cli.chat.as_deref(), Some("work"));
        assert_eq!(cli.model.as_deref(), Some("gpt-4o"));
        assert!(cli.plain && cli.no_stream);
        assert!(Cli::try_parse_from(["gptcli", "--list-chats"]).unwrap().list_chats);
    }
}
