//! Bounded FIFO of tasks waiting for a worker.

use crate::core::errors::PoolError;
use crate::domain::Task;
use std::collections::VecDeque;

/// Tasks awaiting a free worker, in strict arrival order.
///
/// There is no priority and no cancellation by id; queued tasks can only be
/// discarded in bulk through [`drain`](TaskQueue::drain).
#[derive(Debug)]
pub struct TaskQueue {
    tasks: VecDeque<Task>,
    capacity: usize,
}

impl TaskQueue {
    /// Creates an empty queue holding at most `capacity` tasks.
    pub fn new(capacity: usize) -> Self {
        Self {
            tasks: VecDeque::new(),
            capacity,
        }
    }

    /// Appends a task at the tail.
    ///
    /// Fails with [`PoolError::QueueOverflow`] if the queue is full; the task
    /// is dropped in that case.
    pub fn enqueue(&mut self, task: Task) -> Result<(), PoolError> {
        if self.tasks.len() >= self.capacity {
            return Err(PoolError::QueueOverflow {
                requested: self.tasks.len() + 1,
                capacity: self.capacity,
            });
        }
        self.tasks.push_back(task);
        Ok(())
    }

    /// Removes and returns the oldest task.
    pub fn dequeue(&mut self) -> Option<Task> {
        self.tasks.pop_front()
    }

    /// Removes every queued task, oldest first.
    pub fn drain(&mut self) -> Vec<Task> {
        self.tasks.drain(..).collect()
    }

    /// Number of queued tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Maximum number of queued tasks.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::InputFile;

    fn task(id: u64) -> Task {
        Task::new(id, id as usize, InputFile::from_bytes(format!("{id}.png"), vec![0_u8]))
    }

    #[test]
    fn dequeues_in_fifo_order() {
        let mut queue = TaskQueue::new(3);
        for id in 0..3 {
            queue.enqueue(task(id)).unwrap();
        }
        let order: Vec<u64> = std::iter::from_fn(|| queue.dequeue()).map(|t| t.id).collect();
        assert_eq!(order, vec![0, 1, 2]);
        assert!(queue.dequeue().is_none());
    }

    #[test]
    fn rejects_when_full() {
        let mut queue = TaskQueue::new(1);
        queue.enqueue(task(0)).unwrap();
        let err = queue.enqueue(task(1)).unwrap_err();
        assert!(matches!(
            err,
            PoolError::QueueOverflow {
                requested: 2,
                capacity: 1
            }
        ));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn drain_empties_the_queue() {
        let mut queue = TaskQueue::new(4);
        queue.enqueue(task(5)).unwrap();
        queue.enqueue(task(6)).unwrap();
        let drained = queue.drain();
        assert_eq!(drained.iter().map(|t| t.id).collect::<Vec<_>>(), vec![5, 6]);
        assert!(queue.is_empty());
        assert_eq!(queue.capacity(), 4);
    }
}
