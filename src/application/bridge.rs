//! Synchronous entry point over a persistent background runtime.
//!
//! The foreground (UI) thread never runs async code. One dedicated worker
//! thread builds a current-thread tokio runtime, constructs the agent context
//! on it, and then serves blocking callers through a job channel for the rest
//! of the process lifetime. Rebuilding the runtime per call would reconnect
//! every tool server on every turn, so the worker is started exactly once.

use crate::application::agent::{AgentError, TurnMessage};
use crate::application::context::AppContext;
use crate::application::normalize::normalize;
use crate::config::AppConfig;
use crate::domain::types::Payload;
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use std::future::Future;
use std::sync::Mutex;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tokio::runtime::Builder;
use tracing::{debug, error, info};

pub const ERROR_MARKER: &str = "⚠️";

/// One turn of conversation, executed on the background runtime. The
/// production implementation is [`AppContext`]; tests substitute stubs.
#[async_trait]
pub trait TurnHandler: Send {
    async fn handle(&mut self, prompt: String) -> Result<Vec<TurnMessage>, AgentError>;

    async fn shutdown(&mut self) {}
}

enum Job {
    Ask {
        prompt: String,
        reply: mpsc::Sender<Result<Payload, AgentError>>,
    },
    Shutdown,
}

pub struct SyncBridge {
    jobs: mpsc::Sender<Job>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
    worker_id: thread::ThreadId,
}

impl SyncBridge {
    /// Spawns the worker thread and blocks until its context reports ready.
    /// The `init` future runs on the worker's runtime; its failure is the
    /// caller's failure.
    pub fn start<H, F, Fut>(init: F) -> Result<Self, AgentError>
    where
        H: TurnHandler + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<H, AgentError>>,
    {
        let (jobs_tx, jobs_rx) = mpsc::channel::<Job>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), AgentError>>();

        let worker = thread::Builder::new()
            .name("agent-worker".into())
            .spawn(move || {
                let runtime = match Builder::new_current_thread().enable_all().build() {
                    Ok(runtime) => runtime,
                    Err(err) => {
                        error!(%err, "failed to build background runtime");
                        let _ = ready_tx.send(Err(AgentError::Startup(err.to_string())));
                        return;
                    }
                };

                let mut handler = match runtime.block_on(init()) {
                    Ok(handler) => handler,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                info!("Background agent context running");

                while let Ok(job) = jobs_rx.recv() {
                    match job {
                        Job::Ask { prompt, reply } => {
                            let result = runtime
                                .block_on(handler.handle(prompt))
                                .map(|messages| normalize(&messages));
                            if reply.send(result).is_err() {
                                // Caller gave up waiting; the turn still ran
                                // to completion, only the answer is dropped.
                                debug!("reply receiver gone; discarding turn result");
                            }
                        }
                        Job::Shutdown => break,
                    }
                }

                runtime.block_on(handler.shutdown());
                info!("Background agent context stopped");
            })
            .map_err(|err| AgentError::Startup(err.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                jobs: jobs_tx,
                worker_id: worker.thread().id(),
                worker: Mutex::new(Some(worker)),
            }),
            Ok(Err(err)) => {
                let _ = worker.join();
                Err(err)
            }
            Err(_) => {
                let _ = worker.join();
                Err(AgentError::Startup(
                    "worker exited before reporting readiness".into(),
                ))
            }
        }
    }

    /// Starts the bridge with the production context from `config`.
    pub fn connect(config: AppConfig) -> Result<Self, AgentError> {
        Self::start(move || async move { AppContext::connect(config).await })
    }

    /// Blocks until the turn completes on the background context.
    pub fn ask(&self, prompt: &str) -> Result<Payload, AgentError> {
        let reply = self.submit(prompt)?;
        reply.recv().map_err(|_| AgentError::Terminated)?
    }

    /// Blocks at most `budget`. On timeout only the wait is abandoned; the
    /// in-flight turn finishes on the worker so no tool invocation is left
    /// half-run.
    pub fn ask_with_timeout(
        &self,
        prompt: &str,
        budget: Duration,
    ) -> Result<Payload, AgentError> {
        let reply = self.submit(prompt)?;
        match reply.recv_timeout(budget) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(AgentError::Timeout { budget }),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(AgentError::Terminated),
        }
    }

    /// The entire external contract of the core: never fails, never panics.
    /// Errors come back as a marker-prefixed text payload.
    pub fn ask_sync(&self, prompt: &str) -> Payload {
        self.ask(prompt).unwrap_or_else(|err| error_payload(&err))
    }

    pub fn ask_sync_with_timeout(&self, prompt: &str, budget: Duration) -> Payload {
        self.ask_with_timeout(prompt, budget)
            .unwrap_or_else(|err| error_payload(&err))
    }

    /// Stops accepting new jobs, lets queued jobs drain, shuts the handler
    /// down (killing tool subprocesses) and joins the worker thread.
    pub fn shutdown(&self) {
        let _ = self.jobs.send(Job::Shutdown);
        if let Some(handle) = self.worker.lock().expect("worker handle lock").take() {
            if handle.join().is_err() {
                error!("agent worker panicked during shutdown");
            }
        }
    }

    pub fn worker_thread_id(&self) -> thread::ThreadId {
        self.worker_id
    }

    fn submit(
        &self,
        prompt: &str,
    ) -> Result<mpsc::Receiver<Result<Payload, AgentError>>, AgentError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(AgentError::EmptyPrompt);
        }
        let (reply_tx, reply_rx) = mpsc::channel();
        self.jobs
            .send(Job::Ask {
                prompt: prompt.to_string(),
                reply: reply_tx,
            })
            .map_err(|_| AgentError::Terminated)?;
        Ok(reply_rx)
    }
}

pub fn error_payload(err: &AgentError) -> Payload {
    Payload::Text(format!("{ERROR_MARKER} {}", err.user_message()))
}

static SHARED: OnceCell<std::sync::Arc<SyncBridge>> = OnceCell::new();

/// Process-wide bridge accessor. Guarded lazy initialization: under
/// concurrent first use exactly one context is constructed; later callers
/// share it and the configuration they pass is ignored.
pub fn shared(config: &AppConfig) -> Result<std::sync::Arc<SyncBridge>, AgentError> {
    SHARED
        .get_or_try_init(|| {
            let config = config.clone();
            SyncBridge::connect(config).map(std::sync::Arc::new)
        })
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::model::ModelError;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedHandler {
        content: serde_json::Value,
        seen_threads: Arc<Mutex<Vec<thread::ThreadId>>>,
    }

    #[async_trait]
    impl TurnHandler for FixedHandler {
        async fn handle(&mut self, prompt: String) -> Result<Vec<TurnMessage>, AgentError> {
            self.seen_threads
                .lock()
                .expect("thread log lock")
                .push(thread::current().id());
            Ok(vec![
                TurnMessage::User { content: prompt },
                TurnMessage::ToolResult {
                    tool: "calculator".into(),
                    success: true,
                    content: self.content.clone(),
                },
                TurnMessage::Assistant {
                    content: "done".into(),
                },
            ])
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl TurnHandler for FailingHandler {
        async fn handle(&mut self, _prompt: String) -> Result<Vec<TurnMessage>, AgentError> {
            Err(AgentError::Model(ModelError::InvalidResponse(
                "stub failure".into(),
            )))
        }
    }

    struct SlowHandler;

    #[async_trait]
    impl TurnHandler for SlowHandler {
        async fn handle(&mut self, _prompt: String) -> Result<Vec<TurnMessage>, AgentError> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(vec![TurnMessage::Assistant {
                content: "late".into(),
            }])
        }
    }

    fn fixed_bridge(content: serde_json::Value) -> (SyncBridge, Arc<Mutex<Vec<thread::ThreadId>>>) {
        let seen_threads = Arc::new(Mutex::new(Vec::new()));
        let handler_threads = seen_threads.clone();
        let bridge = SyncBridge::start(move || async move {
            Ok(FixedHandler {
                content,
                seen_threads: handler_threads,
            })
        })
        .expect("bridge starts");
        (bridge, seen_threads)
    }

    #[test]
    fn round_trip_yields_table_and_reuses_worker() {
        let (bridge, seen_threads) = fixed_bridge(json!([{"answer": 4}]));

        for _ in 0..3 {
            let payload = bridge.ask_sync("2+2");
            let Payload::Table(rows) = payload else {
                panic!("expected table payload");
            };
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0].get("answer"), Some(&json!(4)));
        }

        let threads = seen_threads.lock().expect("thread log lock").clone();
        assert_eq!(threads.len(), 3);
        assert!(threads.iter().all(|id| *id == threads[0]));
        assert!(threads.iter().all(|id| *id == bridge.worker_thread_id()));
        assert_ne!(threads[0], thread::current().id());

        bridge.shutdown();
    }

    #[test]
    fn handler_errors_become_marker_payloads_not_panics() {
        let bridge =
            SyncBridge::start(move || async move { Ok(FailingHandler) }).expect("bridge starts");

        let result = bridge.ask("anything");
        assert!(matches!(result, Err(AgentError::Model(_))));

        let payload = bridge.ask_sync("anything");
        let Payload::Text(text) = payload else {
            panic!("expected text payload");
        };
        assert!(text.starts_with(ERROR_MARKER));

        // The worker survives the failed turn and keeps serving.
        let again = bridge.ask_sync("still alive?");
        assert!(matches!(again, Payload::Text(_)));

        bridge.shutdown();
    }

    #[test]
    fn empty_prompt_is_rejected_without_touching_the_worker() {
        let (bridge, seen_threads) = fixed_bridge(json!("ok"));

        assert!(matches!(bridge.ask("   "), Err(AgentError::EmptyPrompt)));
        let payload = bridge.ask_sync("");
        let Payload::Text(text) = payload else {
            panic!("expected text payload");
        };
        assert!(text.starts_with(ERROR_MARKER));
        assert!(seen_threads.lock().expect("thread log lock").is_empty());

        bridge.shutdown();
    }

    #[test]
    fn timeout_abandons_only_the_wait() {
        let bridge =
            SyncBridge::start(move || async move { Ok(SlowHandler) }).expect("bridge starts");

        let result = bridge.ask_with_timeout("slow", Duration::from_millis(10));
        assert!(matches!(result, Err(AgentError::Timeout { .. })));

        // The abandoned turn still completes on the worker; the next call is
        // queued behind it and succeeds.
        let payload = bridge.ask("follow-up").expect("worker still serving");
        assert_eq!(payload, Payload::Text("late".into()));

        bridge.shutdown();
    }

    #[test]
    fn failed_init_surfaces_the_inner_error() {
        let result = SyncBridge::start(move || async move {
            Err::<FailingHandler, _>(AgentError::Model(ModelError::InvalidResponse(
                "no endpoint".into(),
            )))
        });
        assert!(matches!(result, Err(AgentError::Model(_))));
    }

    #[test]
    fn shutdown_terminates_later_calls() {
        let (bridge, _) = fixed_bridge(json!("ok"));
        bridge.shutdown();
        assert!(matches!(bridge.ask("hello"), Err(AgentError::Terminated)));
    }

    #[test]
    fn concurrent_first_use_constructs_exactly_one_bridge() {
        let cell: OnceCell<Arc<SyncBridge>> = OnceCell::new();
        let constructions = Arc::new(AtomicUsize::new(0));

        thread::scope(|scope| {
            for _ in 0..8 {
                let cell = &cell;
                let constructions = constructions.clone();
                scope.spawn(move || {
                    let bridge = cell
                        .get_or_try_init(|| {
                            constructions.fetch_add(1, Ordering::SeqCst);
                            SyncBridge::start(move || async move {
                                Ok(FixedHandler {
                                    content: json!("ready"),
                                    seen_threads: Arc::new(Mutex::new(Vec::new())),
                                })
                            })
                            .map(Arc::new)
                        })
                        .expect("bridge available")
                        .clone();
                    assert_eq!(bridge.ask_sync("ping"), Payload::Text("ready".into()));
                });
            }
        });

        assert_eq!(constructions.load(Ordering::SeqCst), 1);
        cell.get().expect("bridge constructed").shutdown();
    }
}
