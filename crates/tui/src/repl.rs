use std::borrow::Cow;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use crossterm::style::{Color, Stylize};
use directories::BaseDirs;
use gptcli_core::commands::{help_lines, Command, CommandOutcome};
use gptcli_core::llm::{collect_reply, ChatError, ChatOpts};
use gptcli_core::session::SessionManager;
use providers::{OpenAiClient, OpenAiConfig};
use rustyline::completion::Completer;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{error::ReadlineError, Editor, Helper};
use tracing::{info, warn};

const BANNER: &str = "Console GPT chat. Type 'exit' or 'quit' to finish, /help for commands.";

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

fn parse_color(name: &str, fallback: Color) -> Color {
    Color::try_from(name.trim()).unwrap_or(fallback)
}

fn history_path() -> Option<PathBuf> {
    let base = BaseDirs::new()?;
    Some(base.data_dir().join("gptcli").join("repl_history.txt"))
}

/// Resolves a picker answer: a 1-based index into `models`, or a model name.
fn pick_model(answer: &str, models: &[String]) -> Option<String> {
    let answer = answer.trim();
    if answer.is_empty() {
        return None;
    }
    match answer.parse::<usize>() {
        Ok(n) if (1..=models.len()).contains(&n) => Some(models[n - 1].clone()),
        Ok(_) => None,
        Err(_) => Some(answer.to_string()),
    }
}

/// Colors the user prompt at display time so rustyline measures the plain
/// text when placing the cursor.
struct PromptColor {
    prompt: String,
    color: Color,
}

impl Highlighter for PromptColor {
    fn highlight_prompt<'b, 's: 'b, 'p: 'b>(&'s self, prompt: &'p str, _default: bool) -> Cow<'b, str> {
        if prompt == self.prompt {
            Cow::Owned(prompt.with(self.color).to_string())
        } else {
            Cow::Borrowed(prompt)
        }
    }
}

impl Completer for PromptColor {
    type Candidate = String;
}

impl Hinter for PromptColor {
    type Hint = String;
}

impl Validator for PromptColor {}

impl Helper for PromptColor {}

type LineEditor = Editor<PromptColor, DefaultHistory>;

pub struct Repl {
    manager: SessionManager,
    client: OpenAiClient,
    chat: String,
    stream: bool,
    rt: tokio::runtime::Runtime,
    user_color: Color,
    assistant_color: Color,
}

impl Repl {
    pub fn new(manager: SessionManager, cfg: OpenAiConfig, chat: String, stream: bool) -> Result<Self> {
        let user_color = parse_color(&manager.config().user_color, Color::Cyan);
        let assistant_color = parse_color(&manager.config().assistant_color, Color::Green);
        let (chat, _) = manager.ensure_chat(&chat)?;
        Ok(Self {
            client: OpenAiClient::new(cfg)?,
            rt: tokio::runtime::Runtime::new()?,
            manager,
            chat,
            stream,
            user_color,
            assistant_color,
        })
    }

    fn prompt(&self) -> String {
        format!("{}: ", self.manager.config().user_name)
    }

    pub fn run(&mut self) -> Result<()> {
        let mut rl = LineEditor::new()?;
        rl.set_helper(Some(PromptColor {
            prompt: self.prompt(),
            color: self.user_color,
        }));
        let history = history_path();
        if let Some(p) = &history {
            let _ = rl.load_history(p);
        }
        println!("{}", BANNER);
        println!(
            "Chat: {}  Model: {}",
            self.chat,
            self.manager.effective_model(&self.chat)
        );
        info!(target: "tui", "repl start chat={}", self.chat);

        loop {
            let line = match rl.readline(&self.prompt()) {
                Ok(l) => l,
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => break,
                Err(e) => return Err(e.into()),
            };
            let text = line.trim();
            if text.is_empty() {
                continue;
            }
            let _ = rl.add_history_entry(text);
            let flow = match Command::parse(text) {
                Some(Command::ChangeModel(None)) => {
                    self.pick_model_interactively(&mut rl)?;
                    Flow::Continue
                }
                Some(cmd) => {
                    let outcome = self.manager.execute(&self.chat, cmd);
                    self.apply(outcome, &mut io::stdout())?
                }
                None => {
                    self.send(text);
                    Flow::Continue
                }
            };
            if flow == Flow::Quit {
                break;
            }
        }

        if let Some(p) = &history {
            if let Some(dir) = p.parent() {
                let _ = std::fs::create_dir_all(dir);
            }
            if let Err(e) = rl.save_history(p) {
                warn!(target: "tui", "save repl history: {}", e);
            }
        }
        Ok(())
    }

    fn apply(&mut self, outcome: CommandOutcome, out: &mut impl Write) -> io::Result<Flow> {
        match outcome {
            CommandOutcome::Info(lines) => {
                for l in lines {
                    writeln!(out, "{}", l)?;
                }
            }
            CommandOutcome::Help => {
                writeln!(out, "Commands:")?;
                for l in help_lines() {
                    writeln!(out, "  {}", l)?;
                }
            }
            CommandOutcome::SwitchChat(name) => {
                writeln!(
                    out,
                    "Switched to chat '{}' (model {})",
                    name,
                    self.manager.effective_model(&name)
                )?;
                self.chat = name;
            }
            CommandOutcome::PickModel => {
                writeln!(out, "Usage: /change-model <name>")?;
            }
            CommandOutcome::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    fn pick_model_interactively(&mut self, rl: &mut LineEditor) -> Result<()> {
        let current = self.manager.effective_model(&self.chat);
        let models = self.manager.config().known_models();
        println!("Available models:");
        for (i, m) in models.iter().enumerate() {
            let marker = if *m == current { "*" } else { " " };
            println!("{} {:>2}. {}", marker, i + 1, m);
        }
        let answer = match rl.readline("Model number or name (empty to cancel): ") {
            Ok(a) => a,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        match pick_model(&answer, &models) {
            Some(model) => {
                let outcome = self
                    .manager
                    .execute(&self.chat, Command::ChangeModel(Some(model)));
                self.apply(outcome, &mut io::stdout())?;
            }
            None if answer.trim().is_empty() => {}
            None => println!("No model numbered '{}'", answer.trim()),
        }
        Ok(())
    }

    fn send(&mut self, text: &str) {
        let turn = match self.manager.begin_turn(&self.chat, text) {
            Ok(t) => t,
            Err(e) => {
                eprintln!("{}", format!("Could not save message: {}", e).red());
                return;
            }
        };
        println!("{}", format!("{}:", turn.model).with(self.assistant_color));
        let started = Instant::now();
        let client = &self.client;
        let request = turn.request.clone();
        let opts = ChatOpts::for_model(turn.model.clone());
        let stream = self.stream;
        let result = self.rt.block_on(async {
            tokio::select! {
                r = collect_reply(client, request, opts, client.wire(), stream, |d| {
                    print!("{}", d);
                    io::stdout().flush().is_ok()
                }) => r,
                _ = tokio::signal::ctrl_c() => Err(ChatError::Canceled),
            }
        });
        println!();

        match result {
            Ok((reply, usage)) => {
                match self
                    .manager
                    .complete_turn(turn, &reply, usage, started.elapsed())
                {
                    Ok(summary) => println!("{}", summary.to_string().dark_grey()),
                    Err(e) => eprintln!("{}", format!("Could not save reply: {}", e).red()),
                }
            }
            Err(e) => {
                warn!(target: "tui", "repl request failed: {}", e);
                if let Err(re) = self.manager.abort_turn(turn) {
                    warn!(target: "tui", "rollback failed: {}", re);
                }
                let msg = match e {
                    ChatError::Canceled => "Request canceled".to_string(),
                    e => format!("Error: {}", e),
                };
                eprintln!("{}", msg.red());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gptcli_core::config::GlobalConfig;
    use gptcli_core::llm::ChatWire;
    use gptcli_core::store::Store;
    use std::time::Duration;
    use tempfile::TempDir;

    fn repl() -> (TempDir, Repl) {
        let dir = TempDir::new().unwrap();
        let manager = SessionManager::new(Store::new(dir.path()), GlobalConfig::default());
        let cfg = OpenAiConfig {
            api_key: "sk-test".into(),
            base_url: "http://127.0.0.1:9".into(),
            wire_api: ChatWire::Chat,
            timeout: Duration::from_secs(1),
            stream_max_retries: 0,
            stream_idle_timeout: Duration::from_secs(1),
            proxy: None,
        };
        let repl = Repl::new(manager, cfg, "default".into(), true).unwrap();
        (dir, repl)
    }

    #[test]
    fn picker_answers() {
        let models = vec!["gpt-5.1".to_string(), "o3".to_string()];
        assert_eq!(pick_model("2", &models).as_deref(), Some("o3"));
        assert_eq!(pick_model(" gpt-4o ", &models).as_deref(), Some("gpt-4o"));
        assert_eq!(pick_model("7", &models), None);
        assert_eq!(pick_model("", &models), None);
    }

    #[test]
    fn only_the_user_prompt_is_colored() {
        let helper = PromptColor {
            prompt: "You: ".into(),
            color: Color::Cyan,
        };
        let colored = helper.highlight_prompt("You: ", true);
        assert!(colored.contains("You: "));
        assert_eq!(helper.highlight_prompt("Model: ", true).as_ref(), "Model: ");

        let (_dir, repl) = repl();
        assert_eq!(repl.prompt(), "You: ");
    }

    #[test]
    fn colors_fall_back() {
        assert_eq!(parse_color("red", Color::Cyan), Color::Red);
        assert_eq!(parse_color("nope", Color::Cyan), Color::Cyan);
    }

    #[test]
    fn outcomes_print_and_switch() {
        let (_dir, mut repl) = repl();
        assert!(repl.manager.store().chat_exists("default"));

        let mut out = Vec::new();
        let outcome = repl
            .manager
            .execute(&repl.chat, Command::SwitchChat(Some("notes".into())));
        assert_eq!(repl.apply(outcome, &mut out).unwrap(), Flow::Continue);
        assert_eq!(repl.chat, "notes");

        repl.apply(CommandOutcome::Help, &mut out).unwrap();
        let printed = String::from_utf8(out).unwrap();
        assert!(printed.starts_with("Switched to chat 'notes'"));
        assert!(printed.contains("/system-prompt-list"));

        let mut out = Vec::new();
        assert_eq!(repl.apply(CommandOutcome::Quit, &mut out).unwrap(), Flow::Quit);
    }
}
