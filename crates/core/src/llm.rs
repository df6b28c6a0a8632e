use std::pin::Pin;

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

/// One entry of an outgoing request.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new<S: Into<String>>(role: Role, content: S) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ChatOpts {
    pub model: String,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl ChatOpts {
    pub fn for_model<S: Into<String>>(model: S) -> Self {
        Self {
            model: model.into(),
            temperature: None,
            top_p: None,
            max_tokens: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatWire {
    Chat,
    Responses,
    Auto,
}

impl ChatWire {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "chat" => ChatWire::Chat,
            "auto" => ChatWire::Auto,
            _ => ChatWire::Responses,
        }
    }
}

/// Token accounting reported by the API for one request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    /// A missing or zero total is derived from the two halves.
    pub fn new(input_tokens: u64, output_tokens: u64, total_tokens: Option<u64>) -> Self {
        let total_tokens = match total_tokens {
            Some(t) if t > 0 => t,
            _ => input_tokens.saturating_add(output_tokens),
        };
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.input_tokens == 0 && self.output_tokens == 0
    }
}

#[derive(Clone, Debug)]
pub enum ChatDelta {
    RoleStart(Role),
    Text(String),
    Usage(Usage),
    Finish(Option<String>),
}

#[derive(Clone, Debug, Default)]
pub struct ChatResult {
    pub text: String,
    pub finish_reason: Option<String>,
    pub usage: Option<Usage>,
}

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("auth error: {0}")] Auth(String),
    #[error("rate limit: {0}")] RateLimit(String),
    #[error("timeout: {0}")] Timeout(String),
    #[error("network: {0}")] Network(String),
    #[error("decode: {0}")] Decode(String),
    #[error("protocol: {0}")] Protocol(String),
    #[error("canceled")] Canceled,
    #[error("other: {0}")] Other(String),
}

pub type ChatStream<'a> = Pin<Box<dyn Stream<Item = Result<ChatDelta, ChatError>> + Send + 'a>>;

#[allow(async_fn_in_trait)]
pub trait ModelClient: Send + Sync {
    async fn send_chat(&self, msgs: &[Message], opts: &ChatOpts) -> Result<ChatResult, ChatError>;
    async fn stream_chat<'a>(
        &'a self,
        msgs: Vec<Message>,
        opts: ChatOpts,
        wire: ChatWire,
    ) -> Result<ChatStream<'a>, ChatError>;
}

/// Runs one request in either mode and gathers the reply. Text deltas are
/// forwarded to `on_delta` as they arrive; in non-streaming mode it is called
/// once with the whole reply.
pub async fn collect_reply<C, F>(
    client: &C,
    msgs: Vec<Message>,
    opts: ChatOpts,
    wire: ChatWire,
    stream: bool,
    mut on_delta: F,
) -> Result<(String, Usage), ChatError>
where
    C: ModelClient,
    F: FnMut(&str) -> bool,
{
    if !stream {
        let res = client.send_chat(&msgs, &opts).await?;
        on_delta(&res.text);
        return Ok((res.text, res.usage.unwrap_or_default()));
    }

    let mut s = client.stream_chat(msgs, opts, wire).await?;
    let mut text = String::new();
    let mut usage = Usage::default();
    while let Some(item) = s.next().await {
        match item? {
            ChatDelta::Text(t) => {
                text.push_str(&t);
                if !on_delta(&t) {
                    return Err(ChatError::Canceled);
                }
            }
            ChatDelta::Usage(u) => usage = u,
            ChatDelta::Finish(_) => break,
            ChatDelta::RoleStart(_) => {}
        }
    }
    Ok((text, usage))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scripted {
        deltas: Vec<ChatDelta>,
    }

    #[allow(async_fn_in_trait)]
    impl ModelClient for Scripted {
        async fn send_chat(
            &self,
            msgs: &[Message],
            _opts: &ChatOpts,
        ) -> Result<ChatResult, ChatError> {
            Ok(ChatResult {
                text: format!("echo {}", msgs.len()),
                finish_reason: None,
                usage: Some(Usage::new(3, 4, None)),
            })
        }

        async fn stream_chat<'a>(
            &'a self,
            _msgs: Vec<Message>,
            _opts: ChatOpts,
            _wire: ChatWire,
        ) -> Result<ChatStream<'a>, ChatError> {
            let items: Vec<Result<ChatDelta, ChatError>> =
                self.deltas.iter().cloned().map(Ok).collect();
            Ok(Box::pin(futures::stream::iter(items)))
        }
    }

    fn scripted() -> Scripted {
        Scripted {
            deltas: vec![
                ChatDelta::RoleStart(Role::Assistant),
                ChatDelta::Text("Hel".into()),
                ChatDelta::Text("lo".into()),
                ChatDelta::Usage(Usage::new(10, 2, Some(12))),
                ChatDelta::Finish(Some("stop".into())),
                ChatDelta::Text("ignored".into()),
            ],
        }
    }

    #[tokio::test]
    async fn stream_collects_text_and_usage() {
        let client = scripted();
        let mut seen = Vec::new();
        let (text, usage) = collect_reply(
            &client,
            vec![Message::new(Role::User, "hi")],
            ChatOpts::for_model("gpt-5.1"),
            ChatWire::Responses,
            true,
            |d| {
                seen.push(d.to_string());
                true
            },
        )
        .await
        .unwrap();
        assert_eq!(text, "Hello");
        assert_eq!(seen, vec!["Hel", "lo"]);
        assert_eq!(usage, Usage::new(10, 2, Some(12)));
    }

    #[tokio::test]
    async fn non_stream_uses_send_chat() {
        let client = scripted();
        let (text, usage) = collect_reply(
            &client,
            vec![Message::new(Role::User, "a"), Message::new(Role::User, "b")],
            ChatOpts::for_model("gpt-5.1"),
            ChatWire::Responses,
            false,
            |_| true,
        )
        .await
        .unwrap();
        assert_eq!(text, "echo 2");
        assert_eq!(usage.total_tokens, 7);
    }

    #[tokio::test]
    async fn callback_can_cancel() {
        let client = scripted();
        let err = collect_reply(
            &client,
            vec![],
            ChatOpts::for_model("m"),
            ChatWire::Chat,
            true,
            |_| false,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ChatError::Canceled));
    }

    #[test]
    fn usage_derives_missing_total() {
        assert_eq!(Usage::new(5, 6, None).total_tokens, 11);
        assert_eq!(Usage::new(5, 6, Some(0)).total_tokens, 11);
        assert_eq!(Usage::new(u64::MAX, 6, None).total_tokens, u64::MAX);
        assert_eq!(Usage::new(5, 6, Some(20)).total_tokens, 20);
    }

    #[test]
    fn wire_parse_defaults_to_responses() {
        assert_eq!(ChatWire::parse("chat"), ChatWire::Chat);
        assert_eq!(ChatWire::parse(" AUTO "), ChatWire::Auto);
        assert_eq!(ChatWire::parse("whatever"), ChatWire::Responses);
    }
}
