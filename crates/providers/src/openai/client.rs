use crate::openai::config::OpenAiConfig;
use crate::openai::usage::{extract_output_text, extract_usage};
use bytes::{Buf, BytesMut};
use futures::{Stream, StreamExt};
use gptcli_core::llm::{
    ChatDelta, ChatError, ChatOpts, ChatResult, ChatStream, ChatWire, Message, ModelClient, Role,
};
use reqwest::{header, Client, StatusCode};
use serde_json::{json, Value};
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

#[derive(Clone)]
pub struct OpenAiClient {
    http: Client,
    cfg: OpenAiConfig,
}

impl OpenAiClient {
    pub fn new(cfg: OpenAiConfig) -> anyhow::Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {}", cfg.api_key))?,
        );
        let mut builder = Client::builder()
            .default_headers(headers)
            .use_rustls_tls()
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(2)
            .timeout(cfg.timeout);
        if let Some(p) = &cfg.proxy {
            builder = builder.proxy(reqwest::Proxy::all(p)?);
        }
        let http = builder.build()?;
        Ok(Self { http, cfg })
    }

    /// Wire protocol selected by configuration.
    pub fn wire(&self) -> ChatWire {
        self.cfg.wire_api
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.cfg.base_url.trim_end_matches('/'), path)
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<reqwest::Response, ChatError> {
        let resp = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(map_reqwest_err)?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.ok();
            error!(target:"providers::openai","non-200 status={} url={} body={:?}", status, url, body);
            return Err(map_status_err(status, body));
        }
        Ok(resp)
    }

    /// Retries transient failures while the connection is being set up.
    async fn post_with_retry(&self, url: &str, body: &Value) -> Result<reqwest::Response, ChatError> {
        let max_attempts = self.cfg.stream_max_retries.max(1);
        let mut attempt = 0u32;
        loop {
            match self.post_json(url, body).await {
                Ok(resp) => return Ok(resp),
                Err(e) if is_transient(&e) && attempt + 1 < max_attempts => {
                    attempt += 1;
                    let backoff = Duration::from_millis(300 * attempt as u64);
                    warn!(target:"providers::openai","attempt {} failed: {}; retrying in {:?}", attempt, e, backoff);
                    sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_responses(&self, msgs: &[Message], opts: &ChatOpts) -> Result<ChatResult, ChatError> {
        let url = self.endpoint("responses");
        info!(target:"providers::openai","responses request model={} url={}", opts.model, url);
        let resp = self.post_with_retry(&url, &responses_body(msgs, opts, false)).await?;
        let v: Value = resp
            .json()
            .await
            .map_err(|e| ChatError::Decode(e.to_string()))?;
        Ok(ChatResult {
            text: extract_output_text(&v),
            finish_reason: v["status"].as_str().map(str::to_string),
            usage: extract_usage(&v),
        })
    }

    async fn send_chat_completions(
        &self,
        msgs: &[Message],
        opts: &ChatOpts,
    ) -> Result<ChatResult, ChatError> {
        let url = self.endpoint("chat/completions");
        info!(target:"providers::openai","chat request model={} url={}", opts.model, url);
        let resp = self.post_with_retry(&url, &chat_body(msgs, opts, false)).await?;
        let v: Value = resp
            .json()
            .await
            .map_err(|e| ChatError::Decode(e.to_string()))?;
        Ok(ChatResult {
            text: extract_output_text(&v),
            finish_reason: v["choices"][0]["finish_reason"].as_str().map(str::to_string),
            usage: extract_usage(&v),
        })
    }
}

#[allow(async_fn_in_trait)]
impl ModelClient for OpenAiClient {
    async fn send_chat(&self, msgs: &[Message], opts: &ChatOpts) -> Result<ChatResult, ChatError> {
        match self.cfg.wire_api {
            ChatWire::Chat => self.send_chat_completions(msgs, opts).await,
            ChatWire::Responses => self.send_responses(msgs, opts).await,
            ChatWire::Auto => match self.send_responses(msgs, opts).await {
                Err(e) if is_not_found(&e) => {
                    warn!(target:"providers::openai","responses endpoint missing; using chat completions");
                    self.send_chat_completions(msgs, opts).await
                }
                other => other,
            },
        }
    }

    async fn stream_chat<'a>(
        &'a self,
        msgs: Vec<Message>,
        opts: ChatOpts,
        wire: ChatWire,
    ) -> Result<ChatStream<'a>, ChatError> {
        match wire {
            ChatWire::Chat => self.stream_chat_completions(msgs, opts).await,
            ChatWire::Responses => self.stream_responses(msgs, opts).await,
            ChatWire::Auto => match self.stream_responses(msgs.clone(), opts.clone()).await {
                Err(e) if is_not_found(&e) => {
                    warn!(target:"providers::openai","responses endpoint missing; using chat completions");
                    self.stream_chat_completions(msgs, opts).await
                }
                other => other,
            },
        }
    }
}

impl OpenAiClient {
    async fn stream_chat_completions<'a>(
        &'a self,
        msgs: Vec<Message>,
        opts: ChatOpts,
    ) -> Result<ChatStream<'a>, ChatError> {
        let url = self.endpoint("chat/completions");
        info!(target:"providers::openai","start chat stream model={} url={}", opts.model, url);
        let resp = self.post_with_retry(&url, &chat_body(&msgs, &opts, true)).await?;
        let blocks = sse_blocks(resp, self.cfg.stream_idle_timeout);
        Ok(Box::pin(decode_chat_stream(blocks)))
    }

    async fn stream_responses<'a>(
        &'a self,
        msgs: Vec<Message>,
        opts: ChatOpts,
    ) -> Result<ChatStream<'a>, ChatError> {
        let url = self.endpoint("responses");
        info!(target:"providers::openai","start responses stream model={} url={}", opts.model, url);
        let resp = self.post_with_retry(&url, &responses_body(&msgs, &opts, true)).await?;
        let blocks = sse_blocks(resp, self.cfg.stream_idle_timeout);
        Ok(Box::pin(decode_responses_stream(blocks)))
    }
}

fn chat_body(msgs: &[Message], opts: &ChatOpts, stream: bool) -> Value {
    let messages: Vec<Value> = msgs
        .iter()
        .map(|m| json!({"role": m.role.as_str(), "content": m.content}))
        .collect();
    let mut body = json!({
        "model": opts.model,
        "messages": messages,
        "stream": stream,
    });
    if let Some(map) = body.as_object_mut() {
        if stream {
            map.insert("stream_options".into(), json!({"include_usage": true}));
        }
        if let Some(t) = opts.temperature {
            map.insert("temperature".into(), json!(t));
        }
        if let Some(p) = opts.top_p {
            map.insert("top_p".into(), json!(p));
        }
        if let Some(n) = opts.max_tokens {
            map.insert("max_tokens".into(), json!(n));
        }
    }
    body
}

fn responses_body(msgs: &[Message], opts: &ChatOpts, stream: bool) -> Value {
    let input: Vec<Value> = msgs
        .iter()
        .filter(|m| !(m.role == Role::Assistant && m.content.trim().is_empty()))
        .map(|m| {
            let content_type = match m.role {
                Role::Assistant => "output_text",
                _ => "input_text",
            };
            json!({
                "role": m.role.as_str(),
                "content": [ { "type": content_type, "text": m.content } ]
            })
        })
        .collect();
    let mut body = json!({
        "model": opts.model,
        "input": input,
        "stream": stream,
    });
    if let Some(map) = body.as_object_mut() {
        if let Some(t) = opts.temperature {
            map.insert("temperature".into(), json!(t));
        }
        if let Some(p) = opts.top_p {
            map.insert("top_p".into(), json!(p));
        }
        if let Some(n) = opts.max_tokens {
            map.insert("max_output_tokens".into(), json!(n));
        }
    }
    body
}

fn is_not_found(e: &ChatError) -> bool {
    matches!(e, ChatError::Protocol(s) if s.starts_with("404"))
}

fn is_transient(e: &ChatError) -> bool {
    matches!(
        e,
        ChatError::Network(_) | ChatError::Timeout(_) | ChatError::RateLimit(_)
    )
}

fn map_reqwest_err(e: reqwest::Error) -> ChatError {
    if e.is_timeout() {
        ChatError::Timeout(e.to_string())
    } else if e.is_request() || e.is_connect() {
        ChatError::Network(e.to_string())
    } else if e.is_decode() {
        ChatError::Decode(e.to_string())
    } else {
        ChatError::Other(e.to_string())
    }
}

fn map_status_err(status: StatusCode, body: Option<String>) -> ChatError {
    let s = format!("{} {}", status.as_u16(), body.unwrap_or_default());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ChatError::Auth(s),
        StatusCode::TOO_MANY_REQUESTS => ChatError::RateLimit(s),
        StatusCode::INTERNAL_SERVER_ERROR
        | StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::GATEWAY_TIMEOUT => ChatError::Network(s),
        StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            ChatError::Protocol(s)
        }
        _ => ChatError::Other(s),
    }
}

/// One server-sent event: optional `event:` name plus joined `data:` lines.
#[derive(Debug, Default, PartialEq)]
struct SseBlock {
    event: Option<String>,
    data: String,
}

/// Start of the next blank-line separator and its length.
fn find_event_boundary(buf: &[u8]) -> Option<(usize, usize)> {
    let crlf = twoway::find_bytes(buf, b"\r\n\r\n").map(|p| (p, 4));
    let lf = twoway::find_bytes(buf, b"\n\n").map(|p| (p, 2));
    match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

/// Pops one complete event off `buf`; `None` until a full block arrived.
fn next_sse_block(buf: &mut BytesMut) -> Option<SseBlock> {
    let (end, sep) = find_event_boundary(&buf[..])?;
    let raw = buf.split_to(end);
    buf.advance(sep);
    let text = String::from_utf8_lossy(&raw);
    let mut block = SseBlock::default();
    let mut data_lines: Vec<&str> = Vec::new();
    for line in text.lines() {
        if let Some(v) = line.strip_prefix("event:") {
            block.event = Some(v.trim().to_string());
        } else if let Some(v) = line.strip_prefix("data:") {
            data_lines.push(v.strip_prefix(' ').unwrap_or(v));
        }
    }
    block.data = data_lines.join("\n");
    Some(block)
}

fn sse_blocks(
    resp: reqwest::Response,
    idle: Duration,
) -> impl Stream<Item = Result<SseBlock, ChatError>> {
    async_stream::stream! {
        let mut stream = resp.bytes_stream();
        let mut buf = BytesMut::new();
        let mut last = Instant::now();
        'outer: loop {
            tokio::select! {
                chunk = stream.next() => {
                    match chunk {
                        Some(Ok(b)) => {
                            buf.extend_from_slice(&b);
                            last = Instant::now();
                            while let Some(block) = next_sse_block(&mut buf) {
                                if block.event.is_none() && block.data.is_empty() {
                                    continue;
                                }
                                yield Ok(block);
                            }
                        }
                        Some(Err(e)) => { yield Err(map_reqwest_err(e)); break 'outer; }
                        None => { break 'outer; }
                    }
                }
                _ = sleep(Duration::from_millis(500)) => {
                    if last.elapsed() > idle { yield Err(ChatError::Timeout("idle".into())); break 'outer; }
                }
            }
        }
    }
}

/// `Ok(None)` marks the `[DONE]` sentinel.
const STREAM_CUT: &str = "stream ended before completion";

/// Chat Completions chunks to deltas. A stream that closes without `[DONE]`
/// or a finish reason is an error, not a short reply.
fn decode_chat_stream<S>(blocks: S) -> impl Stream<Item = Result<ChatDelta, ChatError>>
where
    S: Stream<Item = Result<SseBlock, ChatError>>,
{
    async_stream::try_stream! {
        let mut blocks = Box::pin(blocks);
        let mut finish: Option<String> = None;
        let mut finished = false;
        let mut done = false;
        while let Some(block) = blocks.next().await {
            let block = block?;
            let Some(deltas) = parse_chat_chunk(&block.data)? else {
                done = true;
                break;
            };
            for d in deltas {
                // The usage chunk follows the finish reason, so hold it until [DONE].
                if let ChatDelta::Finish(fr) = d {
                    finish = fr;
                    finished = true;
                    continue;
                }
                yield d;
            }
        }
        if !done && !finished {
            warn!(target:"providers::openai","chat stream closed early");
            Err::<(), _>(ChatError::Protocol(STREAM_CUT.into()))?;
        }
        debug!(target:"providers::openai","chat stream done finish={:?}", finish);
        yield ChatDelta::Finish(finish);
    }
}

/// Responses API events to deltas; `response.completed` is required.
fn decode_responses_stream<S>(blocks: S) -> impl Stream<Item = Result<ChatDelta, ChatError>>
where
    S: Stream<Item = Result<SseBlock, ChatError>>,
{
    async_stream::try_stream! {
        let mut blocks = Box::pin(blocks);
        let mut done = false;
        while let Some(block) = blocks.next().await {
            let block = block?;
            let (deltas, last) = parse_responses_event(&block)?;
            for d in deltas {
                yield d;
            }
            if last {
                done = true;
                break;
            }
        }
        if !done {
            warn!(target:"providers::openai","responses stream closed early");
            Err::<(), _>(ChatError::Protocol(STREAM_CUT.into()))?;
        }
    }
}

fn parse_chat_chunk(data: &str) -> Result<Option<Vec<ChatDelta>>, ChatError> {
    if data.trim() == "[DONE]" {
        return Ok(None);
    }
    let v: Value = serde_json::from_str(data).map_err(|e| ChatError::Decode(e.to_string()))?;
    if let Some(msg) = v["error"]["message"].as_str() {
        return Err(ChatError::Protocol(msg.to_string()));
    }
    let mut out = Vec::new();
    let choice = &v["choices"][0];
    if let Some(role) = choice["delta"]["role"].as_str() {
        let r = match role {
            "user" => Role::User,
            "system" => Role::System,
            _ => Role::Assistant,
        };
        out.push(ChatDelta::RoleStart(r));
    }
    if let Some(content) = choice["delta"]["content"].as_str() {
        if !content.is_empty() {
            out.push(ChatDelta::Text(content.to_string()));
        }
    }
    if let Some(u) = extract_usage(&v) {
        out.push(ChatDelta::Usage(u));
    }
    if let Some(fr) = choice["finish_reason"].as_str() {
        out.push(ChatDelta::Finish(Some(fr.to_string())));
    }
    Ok(Some(out))
}

fn event_error_message(v: Option<&Value>, raw: &str) -> String {
    v.and_then(|v| {
        v["error"]["message"]
            .as_str()
            .or_else(|| v["response"]["error"]["message"].as_str())
            .or_else(|| v["message"].as_str())
    })
    .unwrap_or(raw)
    .to_string()
}

/// Deltas for one Responses stream event and whether it ends the stream.
fn parse_responses_event(block: &SseBlock) -> Result<(Vec<ChatDelta>, bool), ChatError> {
    let v: Option<Value> = serde_json::from_str(&block.data).ok();
    let kind = block
        .event
        .clone()
        .or_else(|| v.as_ref().and_then(|v| v["type"].as_str().map(str::to_string)))
        .unwrap_or_default();
    match kind.as_str() {
        "response.created" => Ok((vec![ChatDelta::RoleStart(Role::Assistant)], false)),
        "response.output_text.delta" => {
            let text = match &v {
                Some(v) => v["delta"].as_str().unwrap_or_default().to_string(),
                None => block.data.clone(),
            };
            if text.is_empty() {
                Ok((Vec::new(), false))
            } else {
                Ok((vec![ChatDelta::Text(text)], false))
            }
        }
        "response.completed" | "response.incomplete" => {
            let mut out = Vec::new();
            if let Some(u) = v.as_ref().and_then(extract_usage) {
                out.push(ChatDelta::Usage(u));
            }
            let reason = if kind == "response.incomplete" {
                Some(
                    v.as_ref()
                        .and_then(|v| v["response"]["incomplete_details"]["reason"].as_str())
                        .unwrap_or("incomplete")
                        .to_string(),
                )
            } else {
                None
            };
            out.push(ChatDelta::Finish(reason));
            Ok((out, true))
        }
        "response.failed" | "response.error" | "error" => Err(ChatError::Protocol(
            event_error_message(v.as_ref(), &block.data),
        )),
        _ => Ok((Vec::new(), false)),
    }
}
