//! Ready and delayed task storage.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::time::Duration;

/// Identifier of a posted task, usable for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) u64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

pub(crate) struct Task {
    pub id: TaskId,
    pub job: Job,
}

struct Delayed {
    due: Duration,
    task: Task,
}

// Min-heap on (due, id): earlier deadlines first, FIFO among equal deadlines.
impl Ord for Delayed {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.task.id.cmp(&self.task.id))
    }
}

impl PartialOrd for Delayed {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Delayed {
    fn eq(&self, other: &Self) -> bool {
        self.task.id == other.task.id
    }
}

impl Eq for Delayed {}

#[derive(Default)]
pub(crate) struct Queue {
    ready: VecDeque<Task>,
    delayed: BinaryHeap<Delayed>,
    pub shutdown: bool,
}

impl Queue {
    pub fn push(&mut self, task: Task) {
        self.ready.push_back(task);
    }

    pub fn push_delayed(&mut self, task: Task, due: Duration) {
        self.delayed.push(Delayed { due, task });
    }

    /// Move every delayed task whose deadline has passed onto the ready queue.
    pub fn promote_due(&mut self, now: Duration) {
        while self.delayed.peek().is_some_and(|d| d.due <= now) {
            if let Some(delayed) = self.delayed.pop() {
                self.ready.push_back(delayed.task);
            }
        }
    }

    pub fn pop_ready(&mut self) -> Option<Task> {
        self.ready.pop_front()
    }

    /// Deadline of the earliest delayed task.
    pub fn next_due(&self) -> Option<Duration> {
        self.delayed.peek().map(|d| d.due)
    }

    pub fn remove(&mut self, id: TaskId) -> Option<Task> {
        if let Some(pos) = self.ready.iter().position(|t| t.id == id) {
            return self.ready.remove(pos);
        }
        let mut removed = None;
        let delayed = std::mem::take(&mut self.delayed);
        self.delayed = delayed
            .into_iter()
            .filter_map(|d| {
                if d.task.id == id {
                    removed = Some(d.task);
                    None
                } else {
                    Some(d)
                }
            })
            .collect();
        removed
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.ready.iter().any(|t| t.id == id) || self.delayed.iter().any(|d| d.task.id == id)
    }

    pub fn len(&self) -> usize {
        self.ready.len() + self.delayed.len()
    }

    pub fn ready_len(&self) -> usize {
        self.ready.len()
    }

    /// Take every queued task, leaving the queue empty.
    pub fn drain(&mut self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.ready.drain(..).collect();
        tasks.extend(std::mem::take(&mut self.delayed).into_iter().map(|d| d.task));
        tasks
    }
}
