//! Cooperative task scheduling
//!
//! The engine never blocks. Every wait is a task handed to a [`Scheduler`]:
//! idle callbacks with a deadline, fixed-delay timeouts and animation frames.
//! A browser binding implements the trait on top of the host event loop;
//! [`ManualScheduler`] is a deterministic virtual-clock implementation used by
//! replays and tests to force a specific interleaving.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;

/// A deferred unit of work
pub type Task = Box<dyn FnOnce()>;

/// Handle for cancelling a scheduled task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

/// Host scheduling facilities.
///
/// All methods take `&self`; implementations use interior mutability so tasks
/// may schedule further tasks while running.
pub trait Scheduler {
    /// Current time in milliseconds since navigation start
    fn now(&self) -> f64;

    /// Whether the host offers idle callbacks
    fn supports_idle(&self) -> bool;

    /// Run `task` when the host is idle, or after `timeout_ms` at the latest
    fn request_idle_callback(&self, task: Task, timeout_ms: f64) -> TaskId;

    fn set_timeout(&self, task: Task, delay_ms: f64) -> TaskId;

    /// Run `task` before the next frame is painted
    fn request_animation_frame(&self, task: Task) -> TaskId;

    /// Cancel a pending task. Unknown or already-run ids are ignored.
    fn cancel(&self, id: TaskId);
}

/// Kind of a task queued on a [`ManualScheduler`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Idle,
    Timeout,
    AnimationFrame,
}

struct Scheduled {
    id: TaskId,
    kind: TaskKind,
    /// Deadline for idle tasks, fire time for timeouts
    due: f64,
    /// Frame number the task was registered in
    frame: u64,
    task: Task,
}

/// Safety valve for [`ManualScheduler::flush`] against self-rescheduling tasks
const MAX_FLUSH_ROUNDS: usize = 10_000;

/// Deterministic scheduler driven explicitly by the caller.
///
/// Time only moves through [`advance`](Self::advance). Idle callbacks run when
/// [`run_idle`](Self::run_idle) is called or when their deadline passes.
/// Animation frames run on [`run_animation_frame`](Self::run_animation_frame);
/// a frame callback registered while a frame is running waits for the next one.
pub struct ManualScheduler {
    now: Cell<f64>,
    idle_supported: bool,
    next_id: Cell<u64>,
    frame: Cell<u64>,
    queue: RefCell<Vec<Scheduled>>,
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualScheduler {
    /// Scheduler with idle callback support, starting at time 0
    pub fn new() -> Self {
        Self {
            now: Cell::new(0.0),
            idle_supported: true,
            next_id: Cell::new(1),
            frame: Cell::new(0),
            queue: RefCell::new(Vec::new()),
        }
    }

    /// Scheduler for a host without idle callbacks
    pub fn without_idle() -> Self {
        Self {
            idle_supported: false,
            ..Self::new()
        }
    }

    fn enqueue(&self, kind: TaskKind, due: f64, task: Task) -> TaskId {
        let id = TaskId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.queue.borrow_mut().push(Scheduled {
            id,
            kind,
            due,
            frame: self.frame.get(),
            task,
        });
        id
    }

    fn take(&self, id: TaskId) -> Option<Task> {
        let mut queue = self.queue.borrow_mut();
        let index = queue.iter().position(|s| s.id == id)?;
        Some(queue.remove(index).task)
    }

    /// Earliest timed (idle or timeout) task due at or before `limit`
    fn next_due(&self, limit: f64) -> Option<(TaskId, f64)> {
        self.queue
            .borrow()
            .iter()
            .filter(|s| s.kind != TaskKind::AnimationFrame && s.due <= limit)
            .min_by(|a, b| {
                a.due
                    .partial_cmp(&b.due)
                    .unwrap_or(Ordering::Equal)
                    .then(a.id.cmp(&b.id))
            })
            .map(|s| (s.id, s.due))
    }

    /// Move the clock forward, running timeouts and idle deadlines as they fall due
    pub fn advance(&self, ms: f64) {
        let target = self.now.get() + ms.max(0.0);
        while let Some((id, due)) = self.next_due(target) {
            if due > self.now.get() {
                self.now.set(due);
            }
            if let Some(task) = self.take(id) {
                task();
            }
        }
        self.now.set(target);
    }

    /// Move the clock to an absolute time; earlier times are ignored
    pub fn advance_to(&self, time: f64) {
        let now = self.now.get();
        if time > now {
            self.advance(time - now);
        } else {
            self.run_due();
        }
    }

    /// Run tasks that are already due without moving the clock
    pub fn run_due(&self) {
        self.advance(0.0);
    }

    /// Signal that the host is idle: run every idle callback queued so far
    pub fn run_idle(&self) -> usize {
        let ids: Vec<TaskId> = self
            .queue
            .borrow()
            .iter()
            .filter(|s| s.kind == TaskKind::Idle)
            .map(|s| s.id)
            .collect();
        let mut ran = 0;
        for id in ids {
            if let Some(task) = self.take(id) {
                task();
                ran += 1;
            }
        }
        ran
    }

    /// Paint one frame: run the animation frame callbacks registered before it
    pub fn run_animation_frame(&self) -> usize {
        let frame = self.frame.get();
        self.frame.set(frame + 1);
        let ids: Vec<TaskId> = self
            .queue
            .borrow()
            .iter()
            .filter(|s| s.kind == TaskKind::AnimationFrame && s.frame <= frame)
            .map(|s| s.id)
            .collect();
        let mut ran = 0;
        for id in ids {
            if let Some(task) = self.take(id) {
                task();
                ran += 1;
            }
        }
        ran
    }

    /// Run everything until the queue is empty, advancing the clock as needed
    pub fn flush(&self) {
        for _ in 0..MAX_FLUSH_ROUNDS {
            self.run_due();
            if self.pending(TaskKind::Idle) > 0 {
                self.run_idle();
                continue;
            }
            if self.pending(TaskKind::AnimationFrame) > 0 {
                self.run_animation_frame();
                continue;
            }
            match self.next_due(f64::INFINITY) {
                Some((_, due)) => self.advance_to(due),
                None => return,
            }
        }
        tracing::warn!(rounds = MAX_FLUSH_ROUNDS, "scheduler flush did not settle");
    }

    /// Number of queued tasks of the given kind
    pub fn pending(&self, kind: TaskKind) -> usize {
        self.queue.borrow().iter().filter(|s| s.kind == kind).count()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }
}

impl Scheduler for ManualScheduler {
    fn now(&self) -> f64 {
        self.now.get()
    }

    fn supports_idle(&self) -> bool {
        self.idle_supported
    }

    fn request_idle_callback(&self, task: Task, timeout_ms: f64) -> TaskId {
        let due = self.now.get() + timeout_ms.max(0.0);
        if self.idle_supported {
            self.enqueue(TaskKind::Idle, due, task)
        } else {
            self.enqueue(TaskKind::Timeout, due, task)
        }
    }

    fn set_timeout(&self, task: Task, delay_ms: f64) -> TaskId {
        let due = self.now.get() + delay_ms.max(0.0);
        self.enqueue(TaskKind::Timeout, due, task)
    }

    fn request_animation_frame(&self, task: Task) -> TaskId {
        self.enqueue(TaskKind::AnimationFrame, f64::INFINITY, task)
    }

    fn cancel(&self, id: TaskId) {
        self.queue.borrow_mut().retain(|s| s.id != id);
    }
}
