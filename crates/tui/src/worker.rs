use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc, Arc,
};
use std::time::{Duration, Instant};

use gptcli_core::llm::{collect_reply, ChatError, ChatOpts, Message, Usage};
use providers::{OpenAiClient, OpenAiConfig};
use tracing::{error, info};

#[derive(Debug)]
pub enum WorkerEvent {
    Delta(String),
    Finished {
        reply: String,
        usage: Usage,
        elapsed: Duration,
    },
    Failed(ChatError),
}

/// One in-flight request running on its own thread and runtime.
pub struct RequestHandle {
    pub rx: mpsc::Receiver<WorkerEvent>,
    cancel: Arc<AtomicBool>,
}

impl RequestHandle {
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// A handle fed by the caller instead of a network thread.
    #[cfg(test)]
    pub fn detached() -> (mpsc::Sender<WorkerEvent>, Self) {
        let (tx, rx) = mpsc::channel();
        let handle = Self {
            rx,
            cancel: Arc::new(AtomicBool::new(false)),
        };
        (tx, handle)
    }

    #[cfg(test)]
    pub fn is_canceled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }
}

async fn wait_for_cancel(flag: &AtomicBool) {
    let mut tick = tokio::time::interval(Duration::from_millis(100));
    loop {
        tick.tick().await;
        if flag.load(Ordering::Relaxed) {
            return;
        }
    }
}

pub fn spawn(cfg: OpenAiConfig, request: Vec<Message>, model: String, stream: bool) -> RequestHandle {
    let (tx, rx) = mpsc::channel::<WorkerEvent>();
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    std::thread::spawn(move || {
        let rt = match tokio::runtime::Runtime::new() {
            Ok(rt) => rt,
            Err(e) => {
                error!(target: "tui", "worker runtime: {}", e);
                let _ = tx.send(WorkerEvent::Failed(ChatError::Other(e.to_string())));
                return;
            }
        };
        rt.block_on(async move {
            let client = match OpenAiClient::new(cfg) {
                Ok(c) => c,
                Err(e) => {
                    error!(target: "tui", "client build error: {}", e);
                    let _ = tx.send(WorkerEvent::Failed(ChatError::Other(format!("client: {}", e))));
                    return;
                }
            };
            info!(target: "tui", "worker start model={} stream={} msgs={}", model, stream, request.len());
            let started = Instant::now();
            let delta_tx = tx.clone();
            let result = tokio::select! {
                r = collect_reply(
                    &client,
                    request,
                    ChatOpts::for_model(model),
                    client.wire(),
                    stream,
                    |d| delta_tx.send(WorkerEvent::Delta(d.to_string())).is_ok(),
                ) => r,
                _ = wait_for_cancel(&flag) => Err(ChatError::Canceled),
            };
            let event = match result {
                Ok((reply, usage)) => WorkerEvent::Finished {
                    reply,
                    usage,
                    elapsed: started.elapsed(),
                },
                Err(e) => {
                    error!(target: "tui", "request failed: {}", e);
                    WorkerEvent::Failed(e)
                }
            };
            let _ = tx.send(event);
        });
    });
    RequestHandle { rx, cancel }
}
