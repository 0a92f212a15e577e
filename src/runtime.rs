//! Project runtime
//!
//! Owns the [`Pipeline`] on a dedicated thread and serializes every event through one
//! queue. Readers get the last committed snapshot without blocking the writer. Preview
//! renders run on a tokio runtime and re-enter the queue as `PreviewRendered` events,
//! so a slow render never holds up filesystem events.

use crate::error::ApiError;
use crate::pipeline::{Pipeline, ProjectState, WorkspaceEvent};
use crate::preview::{PreviewRenderer, PreviewRequest};
use parking_lot::RwLock;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

type Reply = mpsc::Sender<Result<(), ApiError>>;

enum Message {
    Event(WorkspaceEvent, Option<Reply>),
    Shutdown,
}

/// Cloneable sender into a running project
#[derive(Clone)]
pub struct RuntimeHandle {
    sender: mpsc::Sender<Message>,
}

impl RuntimeHandle {
    /// Queue an event without waiting for it to be applied
    pub fn send(&self, event: WorkspaceEvent) -> Result<(), ApiError> {
        self.sender
            .send(Message::Event(event, None))
            .map_err(|_| ApiError::RuntimeStopped)
    }

    /// Queue an event and wait for its outcome
    pub fn apply(&self, event: WorkspaceEvent) -> Result<(), ApiError> {
        let (reply, outcome) = mpsc::channel();
        self.sender
            .send(Message::Event(event, Some(reply)))
            .map_err(|_| ApiError::RuntimeStopped)?;
        outcome.recv().map_err(|_| ApiError::RuntimeStopped)?
    }
}

/// A project opened behind a single-writer event queue
pub struct ProjectRuntime {
    handle: RuntimeHandle,
    published: Arc<RwLock<Arc<ProjectState>>>,
    worker: Option<JoinHandle<()>>,
}

impl ProjectRuntime {
    /// Start the writer thread for `pipeline`; previews are produced by `renderer`
    pub fn start(pipeline: Pipeline, renderer: Arc<dyn PreviewRenderer>) -> Result<Self, ApiError> {
        let executor = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("manifest-sync-render")
            .enable_all()
            .build()
            .map_err(|e| ApiError::PreviewFailed(format!("Failed to start render runtime: {}", e)))?;

        let (sender, receiver) = mpsc::channel();
        let published = Arc::new(RwLock::new(pipeline.snapshot()));
        let worker = Worker {
            pipeline,
            renderer,
            executor,
            sender: sender.clone(),
            published: Arc::clone(&published),
        };
        let thread = std::thread::Builder::new()
            .name("manifest-sync-pipeline".to_string())
            .spawn(move || worker.run(receiver))
            .map_err(|e| ApiError::StorageError(e.into()))?;

        Ok(Self {
            handle: RuntimeHandle { sender },
            published,
            worker: Some(thread),
        })
    }

    pub fn handle(&self) -> RuntimeHandle {
        self.handle.clone()
    }

    /// Last committed state
    pub fn snapshot(&self) -> Arc<ProjectState> {
        Arc::clone(&self.published.read())
    }

    /// Poll snapshots until `predicate` holds or `timeout` passes
    pub fn wait_until<F>(&self, timeout: Duration, predicate: F) -> Option<Arc<ProjectState>>
    where
        F: Fn(&ProjectState) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            let snapshot = self.snapshot();
            if predicate(&snapshot) {
                return Some(snapshot);
            }
            if Instant::now() >= deadline {
                return None;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    /// Stop the writer thread. In-flight renders are cancelled.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = self.handle.sender.send(Message::Shutdown);
            if worker.join().is_err() {
                error!("Pipeline thread panicked");
            }
        }
    }
}

impl Drop for ProjectRuntime {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    pipeline: Pipeline,
    renderer: Arc<dyn PreviewRenderer>,
    executor: tokio::runtime::Runtime,
    sender: mpsc::Sender<Message>,
    published: Arc<RwLock<Arc<ProjectState>>>,
}

impl Worker {
    fn run(mut self, receiver: mpsc::Receiver<Message>) {
        info!(root = %self.pipeline.root().display(), "Pipeline thread started");
        while let Ok(message) = receiver.recv() {
            let (event, reply) = match message {
                Message::Event(event, reply) => (event, reply),
                Message::Shutdown => break,
            };
            let name = event.name();
            let outcome = match self.pipeline.apply(event) {
                Ok(Some(request)) => {
                    self.spawn_render(request);
                    Ok(())
                }
                Ok(None) => Ok(()),
                Err(e) => Err(e),
            };
            *self.published.write() = self.pipeline.snapshot();

            match reply {
                Some(reply) => {
                    let _ = reply.send(outcome);
                }
                None => {
                    if let Err(e) = outcome {
                        debug!(event = name, error = %e, "Queued event failed");
                    }
                }
            }
        }
        info!("Pipeline thread stopped");
    }

    fn spawn_render(&self, request: PreviewRequest) {
        let renderer = Arc::clone(&self.renderer);
        let sender = self.sender.clone();
        self.executor.spawn(async move {
            let ticket = request.ticket;
            let result = renderer
                .render(&request)
                .await
                .map_err(|e| e.to_string());
            if let Err(reason) = &result {
                warn!(%ticket, label = %request.output_label(), reason = %reason, "Render failed");
            }
            let event = WorkspaceEvent::PreviewRendered { ticket, result };
            if sender.send(Message::Event(event, None)).is_err() {
                debug!(%ticket, "Runtime stopped before render finished");
            }
        });
    }
}
