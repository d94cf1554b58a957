//! Workers and the typed protocol used to drive them.
//!
//! Each worker is a dedicated OS thread that owns one inference session. The
//! pool talks to it through a request channel and hears back on a shared event
//! channel:
//!
//! ```text
//!   pool ── WorkerRequest::{Init, ProcessImage, Cleanup, Shutdown} ──▶ worker
//!   pool ◀── PoolEvent::Completed { task_id, generation, WorkerResponse } ── worker
//! ```
//!
//! A worker handles one request at a time, so it never runs two tasks at once.
//! Responses carry the task id and the worker generation; a worker that was
//! replaced after a timeout keeps its old generation, which lets the pool drop
//! whatever it reports late.

use crate::core::errors::{DecodeError, InferenceError, TaskError};
use crate::core::traits::{BufferDecoder, InferenceSession, SessionFactory};
use crate::domain::{RecognitionResult, Task, TaskId};
use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Requests accepted by a worker thread.
pub enum WorkerRequest {
    /// Open the inference session and report the engine description.
    Init {
        /// Where to send the result of opening the session.
        reply: Sender<Result<String, InferenceError>>,
    },
    /// Decode and recognize one file.
    ProcessImage(Task),
    /// Release session caches.
    Cleanup,
    /// Release the session and exit, acknowledging with the worker id.
    Shutdown {
        /// Where to send the acknowledgement.
        ack: Sender<usize>,
    },
}

/// Result of one task as reported by a worker.
#[derive(Debug)]
pub enum WorkerResponse {
    /// The file was recognized.
    Success(RecognitionResult),
    /// Decoding or inference failed.
    Failure(TaskError),
}

impl WorkerResponse {
    /// Converts the response into a plain result.
    pub fn into_result(self) -> Result<RecognitionResult, TaskError> {
        match self {
            WorkerResponse::Success(result) => Ok(result),
            WorkerResponse::Failure(error) => Err(error),
        }
    }
}

/// Events delivered to the thread driving a `process_many` call.
#[derive(Debug)]
pub enum PoolEvent {
    /// A worker finished a task.
    Completed {
        /// The worker slot that ran the task.
        worker_id: usize,
        /// Generation of the worker thread in that slot.
        generation: u64,
        /// The task that finished.
        task_id: TaskId,
        /// What the worker produced.
        response: WorkerResponse,
        /// Time spent decoding and recognizing.
        elapsed: Duration,
    },
    /// A task was discarded by shutdown.
    Cancelled {
        /// The discarded task.
        task_id: TaskId,
        /// Why it was discarded.
        reason: String,
    },
}

/// Shared collaborators handed to every worker thread.
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub(crate) decoder: Arc<dyn BufferDecoder>,
    pub(crate) factory: Arc<dyn SessionFactory>,
    pub(crate) events: Sender<PoolEvent>,
}

/// The pool's handle on one worker thread.
pub(crate) struct WorkerHandle {
    id: usize,
    generation: u64,
    requests: Sender<WorkerRequest>,
    thread: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("id", &self.id)
            .field("generation", &self.generation)
            .finish()
    }
}

impl WorkerHandle {
    /// Starts the worker thread. The session is not opened until `Init`.
    pub(crate) fn spawn(
        id: usize,
        generation: u64,
        context: WorkerContext,
    ) -> Result<Self, InferenceError> {
        let (requests, inbox) = unbounded();
        let thread = thread::Builder::new()
            .name(format!("ocr-worker-{id}"))
            .spawn(move || run_worker(id, generation, inbox, context))
            .map_err(|e| InferenceError::with_source("failed to spawn worker thread", e))?;

        Ok(Self {
            id,
            generation,
            requests,
            thread: Some(thread),
        })
    }

    pub(crate) fn id(&self) -> usize {
        self.id
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Sends `Init` and returns the channel the reply will arrive on.
    pub(crate) fn begin_init(&self) -> Receiver<Result<String, InferenceError>> {
        let (reply, result) = bounded(1);
        // A dead thread drops the request, which disconnects `result`.
        let _ = self.requests.send(WorkerRequest::Init { reply });
        result
    }

    /// Opens the session and waits up to `timeout` for it to be ready.
    pub(crate) fn initialize(&self, timeout: Duration) -> Result<String, InferenceError> {
        await_init(&self.begin_init(), Instant::now() + timeout)
    }

    /// Hands a task to the worker, giving it back if the thread is gone.
    pub(crate) fn assign(&self, task: Task) -> Result<(), Task> {
        self.requests
            .send(WorkerRequest::ProcessImage(task))
            .map_err(|e| match e.into_inner() {
                WorkerRequest::ProcessImage(task) => task,
                _ => unreachable!("send error returns the request that was sent"),
            })
    }

    pub(crate) fn cleanup(&self) {
        let _ = self.requests.send(WorkerRequest::Cleanup);
    }

    /// Asks the worker to exit. Returns false if the thread is already gone.
    fn request_shutdown(&self, ack: &Sender<usize>) -> bool {
        self.requests
            .send(WorkerRequest::Shutdown { ack: ack.clone() })
            .is_ok()
    }

    fn join(mut self) {
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            error!("Worker {} thread panicked", self.id);
        }
    }

    #[cfg(test)]
    pub(crate) fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(|thread| thread.is_finished())
    }

    /// Detaches the thread. Dropping the request sender makes it exit as soon
    /// as it returns from whatever it is stuck in.
    pub(crate) fn abandon(mut self) {
        self.thread.take();
    }
}

/// Waits for an `Init` reply until `deadline`.
pub(crate) fn await_init(
    reply: &Receiver<Result<String, InferenceError>>,
    deadline: Instant,
) -> Result<String, InferenceError> {
    match reply.recv_deadline(deadline) {
        Ok(result) => result,
        Err(crossbeam_channel::RecvTimeoutError::Timeout) => Err(InferenceError::new(
            "inference session did not start before the initialization timeout",
        )),
        Err(crossbeam_channel::RecvTimeoutError::Disconnected) => Err(InferenceError::new(
            "worker thread exited during initialization",
        )),
    }
}

/// Sends `Shutdown` to every worker and waits up to `grace` for
/// acknowledgements. Workers that do not answer in time are abandoned.
///
/// Returns the number of abandoned workers.
pub(crate) fn stop_workers(handles: Vec<WorkerHandle>, grace: Duration) -> usize {
    let (ack, acks) = unbounded();
    let mut pending = HashMap::with_capacity(handles.len());
    for handle in handles {
        if handle.request_shutdown(&ack) {
            pending.insert(handle.id(), handle);
        } else {
            handle.join();
        }
    }

    let deadline = Instant::now() + grace;
    while !pending.is_empty() {
        match acks.recv_deadline(deadline) {
            Ok(id) => {
                if let Some(handle) = pending.remove(&id) {
                    handle.join();
                }
            }
            Err(_) => break,
        }
    }

    let forced = pending.len();
    for (id, handle) in pending {
        warn!(
            "Worker {} did not acknowledge shutdown within {:?}; abandoning its thread",
            id, grace
        );
        handle.abandon();
    }
    forced
}

fn run_worker(
    id: usize,
    generation: u64,
    inbox: Receiver<WorkerRequest>,
    context: WorkerContext,
) {
    let mut session: Option<Box<dyn InferenceSession>> = None;

    while let Ok(request) = inbox.recv() {
        match request {
            WorkerRequest::Init { reply } => {
                let opened = catch_unwind(AssertUnwindSafe(|| context.factory.create(id)))
                    .unwrap_or_else(|payload| Err(InferenceError::from_panic(payload.as_ref())));
                match opened {
                    Ok(opened) => {
                        let info = opened.engine_info();
                        debug!("Worker {} (generation {}) ready: {}", id, generation, info);
                        session = Some(opened);
                        let _ = reply.send(Ok(info));
                    }
                    Err(e) => {
                        error!("Worker {} failed to open its session: {}", id, e);
                        let _ = reply.send(Err(e));
                        break;
                    }
                }
            }
            WorkerRequest::ProcessImage(task) => {
                let started = Instant::now();
                let response = process_task(session.as_deref_mut(), context.decoder.as_ref(), &task);
                let event = PoolEvent::Completed {
                    worker_id: id,
                    generation,
                    task_id: task.id,
                    response,
                    elapsed: started.elapsed(),
                };
                if context.events.send(event).is_err() {
                    break;
                }
            }
            WorkerRequest::Cleanup => {
                if let Some(session) = session.as_mut()
                    && let Err(payload) =
                        catch_unwind(AssertUnwindSafe(|| session.release_caches()))
                {
                    error!(
                        "Worker {} panicked while releasing caches: {}",
                        id,
                        InferenceError::from_panic(payload.as_ref())
                    );
                }
            }
            WorkerRequest::Shutdown { ack } => {
                drop(session.take());
                let _ = ack.send(id);
                break;
            }
        }
    }

    debug!("Worker {} (generation {}) exited", id, generation);
}

/// Decodes and recognizes one task.
///
/// The pixel buffer lives only inside this function and is dropped right after
/// the inference call, on every path.
fn process_task(
    session: Option<&mut (dyn InferenceSession + 'static)>,
    decoder: &dyn BufferDecoder,
    task: &Task,
) -> WorkerResponse {
    let Some(session) = session else {
        return WorkerResponse::Failure(
            InferenceError::new("worker has no open inference session").into(),
        );
    };

    let decoded = catch_unwind(AssertUnwindSafe(|| decoder.decode(&task.file)))
        .unwrap_or_else(|_| {
            Err(DecodeError::with_message(
                task.file_name(),
                "decoder panicked",
            ))
        });
    let buffer = match decoded {
        Ok(buffer) => buffer,
        Err(e) => return WorkerResponse::Failure(e.into()),
    };

    let inferred = catch_unwind(AssertUnwindSafe(|| session.infer(&buffer)));
    drop(buffer);

    match inferred {
        Ok(Ok(result)) => WorkerResponse::Success(result),
        Ok(Err(e)) => WorkerResponse::Failure(e.into()),
        Err(payload) => WorkerResponse::Failure(InferenceError::from_panic(payload.as_ref()).into()),
    }
}
