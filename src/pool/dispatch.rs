//! Worker occupancy and task routing.
//!
//! `Dispatch` is the mutable heart of an initialized pool and lives behind a
//! single mutex. Every worker slot is either idle or busy; a busy slot holds
//! the in-flight task, or nothing while its worker is being restarted. A freed
//! worker takes the head of the queue before it is ever marked idle, so idle
//! workers and queued tasks never coexist.

use super::queue::TaskQueue;
use super::worker::{PoolEvent, WorkerContext, WorkerHandle};
use crate::core::errors::PoolError;
use crate::domain::{Task, TaskId};
use crossbeam_channel::Receiver;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// A task currently running on a worker.
#[derive(Debug, Clone)]
pub(crate) struct InFlight {
    pub(crate) task_id: TaskId,
    pub(crate) file_name: String,
    pub(crate) deadline: Instant,
    /// The worker thread was gone before the task could be handed over.
    pub(crate) lost: bool,
}

/// A task whose deadline passed, together with the worker that was running it.
pub(crate) struct Expired {
    pub(crate) worker_id: usize,
    pub(crate) next_generation: u64,
    pub(crate) task: InFlight,
    pub(crate) handle: Option<WorkerHandle>,
}

/// Worker occupancy counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Occupancy {
    pub(crate) total: usize,
    pub(crate) available: usize,
    pub(crate) busy: usize,
    pub(crate) queued: usize,
}

pub(crate) struct Dispatch {
    workers: BTreeMap<usize, WorkerHandle>,
    idle: VecDeque<usize>,
    busy: HashMap<usize, Option<InFlight>>,
    queue: TaskQueue,
    context: WorkerContext,
    events: Receiver<PoolEvent>,
    task_timeout: Duration,
}

impl Dispatch {
    pub(crate) fn new(
        handles: Vec<WorkerHandle>,
        queue_capacity: usize,
        context: WorkerContext,
        events: Receiver<PoolEvent>,
        task_timeout: Duration,
    ) -> Self {
        let idle = handles.iter().map(WorkerHandle::id).collect();
        let workers = handles.into_iter().map(|h| (h.id(), h)).collect();
        Self {
            workers,
            idle,
            busy: HashMap::new(),
            queue: TaskQueue::new(queue_capacity),
            context,
            events,
            task_timeout,
        }
    }

    pub(crate) fn context(&self) -> &WorkerContext {
        &self.context
    }

    pub(crate) fn events(&self) -> &Receiver<PoolEvent> {
        &self.events
    }

    pub(crate) fn occupancy(&self) -> Occupancy {
        Occupancy {
            total: self.idle.len() + self.busy.len(),
            available: self.idle.len(),
            busy: self.busy.len(),
            queued: self.queue.len(),
        }
    }

    /// Starts `task` on an idle worker, or queues it if none is free.
    pub(crate) fn submit(&mut self, task: Task) -> Result<(), PoolError> {
        match self.idle.pop_front() {
            Some(worker_id) => {
                self.start(worker_id, task);
                Ok(())
            }
            None => self.queue.enqueue(task),
        }
    }

    fn start(&mut self, worker_id: usize, task: Task) {
        let in_flight = InFlight {
            task_id: task.id,
            file_name: task.file_name().to_string(),
            deadline: Instant::now() + self.task_timeout,
            lost: false,
        };
        debug!("Assigning '{}' to worker {}", in_flight.file_name, worker_id);
        self.busy.insert(worker_id, Some(in_flight));

        let Some(handle) = self.workers.get(&worker_id) else {
            return;
        };
        if let Err(task) = handle.assign(task) {
            // Expire the slot now so the dispatcher restarts it on its next pass.
            warn!(
                "Worker {} is unreachable; restarting it for '{}'",
                worker_id,
                task.file_name()
            );
            if let Some(Some(in_flight)) = self.busy.get_mut(&worker_id) {
                in_flight.lost = true;
                in_flight.deadline = Instant::now();
            }
        }
    }

    /// Marks a completion reported by a worker.
    ///
    /// Returns false for stale reports: a worker generation that has been
    /// replaced, or a task that is no longer in flight on that worker.
    pub(crate) fn complete(&mut self, worker_id: usize, generation: u64, task_id: TaskId) -> bool {
        let current = self
            .workers
            .get(&worker_id)
            .is_some_and(|h| h.generation() == generation);
        let matches = matches!(
            self.busy.get(&worker_id),
            Some(Some(in_flight)) if in_flight.task_id == task_id
        );
        if !(current && matches) {
            return false;
        }
        self.release(worker_id);
        true
    }

    /// Hands the queue head to `worker_id`, or marks it idle.
    fn release(&mut self, worker_id: usize) {
        match self.queue.dequeue() {
            Some(task) => self.start(worker_id, task),
            None => {
                self.busy.remove(&worker_id);
                self.idle.push_back(worker_id);
            }
        }
    }

    /// Earliest deadline among in-flight tasks.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.busy
            .values()
            .flatten()
            .map(|in_flight| in_flight.deadline)
            .min()
    }

    /// Removes every task whose deadline has passed, detaching its worker.
    ///
    /// The slots stay busy, with nothing in flight, until
    /// [`install`](Self::install) or [`retire`](Self::retire) resolves them.
    pub(crate) fn take_expired(&mut self, now: Instant) -> Vec<Expired> {
        let overdue: Vec<usize> = self
            .busy
            .iter()
            .filter_map(|(&id, slot)| {
                slot.as_ref()
                    .filter(|in_flight| in_flight.deadline <= now)
                    .map(|_| id)
            })
            .collect();

        overdue
            .into_iter()
            .filter_map(|worker_id| {
                let task = self.busy.insert(worker_id, None).flatten()?;
                let handle = self.workers.remove(&worker_id);
                let next_generation = handle.as_ref().map_or(1, |h| h.generation() + 1);
                Some(Expired {
                    worker_id,
                    next_generation,
                    task,
                    handle,
                })
            })
            .collect()
    }

    /// Puts a restarted worker into its slot and gives it work.
    pub(crate) fn install(&mut self, handle: WorkerHandle) {
        let worker_id = handle.id();
        self.workers.insert(worker_id, handle);
        self.release(worker_id);
    }

    /// Removes a slot whose worker could not be restarted.
    ///
    /// If that was the last worker, the queued tasks can never run and are
    /// returned to the caller.
    pub(crate) fn retire(&mut self, worker_id: usize) -> Vec<Task> {
        self.busy.remove(&worker_id);
        self.workers.remove(&worker_id);
        if self.idle.is_empty() && self.busy.is_empty() {
            self.queue.drain()
        } else {
            Vec::new()
        }
    }

    /// Asks every worker to release its session caches.
    pub(crate) fn broadcast_cleanup(&self) {
        for handle in self.workers.values() {
            handle.cleanup();
        }
    }

    /// Tears the state down into the parts shutdown needs.
    pub(crate) fn dismantle(mut self) -> Dismantled {
        Dismantled {
            queued: self.queue.drain(),
            in_flight: self.busy.into_values().flatten().collect(),
            workers: self.workers.into_values().collect(),
            context: self.context,
        }
    }
}

/// What is left of a `Dispatch` once the pool stops accepting work.
pub(crate) struct Dismantled {
    pub(crate) queued: Vec<Task>,
    pub(crate) in_flight: Vec<InFlight>,
    pub(crate) workers: Vec<WorkerHandle>,
    pub(crate) context: WorkerContext,
}
