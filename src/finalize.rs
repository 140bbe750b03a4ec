//! Deferral and finalization helpers
//!
//! Several trigger paths (idle callback, page hidden, first input) race to
//! finalize a metric. Instead of locking, each path calls the same
//! [`FinalizeOnce`] guard and only the first call does anything.

use crate::config::IdlePolicy;
use crate::host::PageHost;
use crate::lifecycle::{ListenerId, SignalKind};
use crate::scheduler::TaskId;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

struct OnceInner {
    done: Cell<bool>,
    action: RefCell<Option<Box<dyn FnOnce()>>>,
}

/// Runs its action at most once, however many trigger paths invoke it.
///
/// Clones share state. Invoking the guard again from inside its own action is a no-op.
#[derive(Clone)]
pub struct FinalizeOnce {
    inner: Rc<OnceInner>,
}

impl FinalizeOnce {
    pub fn new(action: impl FnOnce() + 'static) -> Self {
        Self {
            inner: Rc::new(OnceInner {
                done: Cell::new(false),
                action: RefCell::new(Some(Box::new(action))),
            }),
        }
    }

    /// Run the action if no earlier call did. Returns whether this call ran it.
    pub fn run(&self) -> bool {
        if self.inner.done.replace(true) {
            return false;
        }
        let action = self.inner.action.borrow_mut().take();
        if let Some(action) = action {
            action();
        }
        true
    }

    pub fn has_run(&self) -> bool {
        self.inner.done.get()
    }
}

/// Run `action` at the earliest of host idle time (bounded by the idle timeout)
/// or the page turning hidden.
///
/// Without idle support the fixed fallback delay is used instead. Whichever
/// trigger wins tears down the other one, so the action runs exactly once.
/// A page that is already hidden runs the action immediately.
pub fn when_idle_or_hidden(
    host: &PageHost,
    policy: IdlePolicy,
    action: impl FnOnce() + 'static,
) -> FinalizeOnce {
    let listener: Rc<Cell<Option<ListenerId>>> = Rc::new(Cell::new(None));
    let task: Rc<Cell<Option<TaskId>>> = Rc::new(Cell::new(None));

    let fire = {
        let listener = Rc::clone(&listener);
        let task = Rc::clone(&task);
        let lifecycle = Rc::downgrade(&host.lifecycle);
        let scheduler = Rc::downgrade(&host.scheduler);
        FinalizeOnce::new(move || {
            if let (Some(id), Some(lifecycle)) = (listener.take(), lifecycle.upgrade()) {
                lifecycle.remove(id);
            }
            if let (Some(id), Some(scheduler)) = (task.take(), scheduler.upgrade()) {
                scheduler.cancel(id);
            }
            action();
        })
    };

    if host.lifecycle.is_hidden() {
        fire.run();
        return fire;
    }

    let on_idle = fire.clone();
    let id = if host.scheduler.supports_idle() {
        host.scheduler.request_idle_callback(
            Box::new(move || {
                on_idle.run();
            }),
            policy.idle_timeout_ms,
        )
    } else {
        host.scheduler.set_timeout(
            Box::new(move || {
                on_idle.run();
            }),
            policy.fallback_delay_ms,
        )
    };
    task.set(Some(id));

    let on_hidden = fire.clone();
    listener.set(Some(host.lifecycle.on_hidden(move |_| {
        on_hidden.run();
    })));

    fire
}

/// Run `action` after two animation frames, i.e. once a frame has actually been painted
pub fn double_animation_frame(host: &PageHost, action: impl FnOnce() + 'static) {
    let scheduler = Rc::clone(&host.scheduler);
    host.scheduler.request_animation_frame(Box::new(move || {
        scheduler.request_animation_frame(Box::new(action));
    }));
}

/// Run `action` in a fresh task once the document has finished loading
pub fn when_loaded(host: &PageHost, action: impl FnOnce() + 'static) {
    if host.lifecycle.is_load_complete() {
        host.scheduler.set_timeout(Box::new(action), 0.0);
        return;
    }
    let scheduler = Rc::downgrade(&host.scheduler);
    let action: RefCell<Option<Box<dyn FnOnce()>>> = RefCell::new(Some(Box::new(action)));
    host.lifecycle.listen_once(SignalKind::Load, move |_, _| {
        if let (Some(action), Some(scheduler)) = (action.borrow_mut().take(), scheduler.upgrade()) {
            scheduler.set_timeout(action, 0.0);
        }
    });
}
