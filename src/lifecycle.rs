//! Page lifecycle signals
//!
//! The host forwards document-level signals (visibility changes, prerender
//! activation, page-show after a cache restore, load completion and the first
//! user inputs) to a [`PageLifecycle`]. Metric modules register listeners on it
//! and remove them when they no longer need them.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// A document-level signal
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PageSignal {
    VisibilityChange { hidden: bool, timestamp: f64 },
    PrerenderingChange,
    /// `persisted` is set when the page came back from the back/forward cache
    PageShow { persisted: bool, timestamp: f64 },
    Load,
    KeyDown,
    Click,
}

impl PageSignal {
    pub fn kind(&self) -> SignalKind {
        match self {
            PageSignal::VisibilityChange { .. } => SignalKind::VisibilityChange,
            PageSignal::PrerenderingChange => SignalKind::PrerenderingChange,
            PageSignal::PageShow { .. } => SignalKind::PageShow,
            PageSignal::Load => SignalKind::Load,
            PageSignal::KeyDown => SignalKind::KeyDown,
            PageSignal::Click => SignalKind::Click,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    VisibilityChange,
    PrerenderingChange,
    PageShow,
    Load,
    KeyDown,
    Click,
}

/// Document state at the time a listener runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageState {
    pub hidden: bool,
    pub load_complete: bool,
}

pub type SignalListener = Rc<dyn Fn(&PageSignal, PageState)>;

/// Handle for removing a listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Registered {
    id: ListenerId,
    kind: SignalKind,
    once: bool,
    callback: SignalListener,
}

/// Listener registry and document state for one page session.
///
/// Dispatch semantics follow the DOM: listeners added while a signal is being
/// dispatched do not see that signal, and listeners removed during a dispatch
/// are not invoked.
pub struct PageLifecycle {
    state: Cell<PageState>,
    next_id: Cell<u64>,
    listeners: RefCell<Vec<Registered>>,
}

impl Default for PageLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl PageLifecycle {
    /// A visible page whose load has not completed
    pub fn new() -> Self {
        Self::with_state(PageState::default())
    }

    pub fn with_state(state: PageState) -> Self {
        Self {
            state: Cell::new(state),
            next_id: Cell::new(1),
            listeners: RefCell::new(Vec::new()),
        }
    }

    pub fn state(&self) -> PageState {
        self.state.get()
    }

    pub fn is_hidden(&self) -> bool {
        self.state.get().hidden
    }

    pub fn is_load_complete(&self) -> bool {
        self.state.get().load_complete
    }

    fn register(&self, kind: SignalKind, once: bool, callback: SignalListener) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.listeners.borrow_mut().push(Registered {
            id,
            kind,
            once,
            callback,
        });
        id
    }

    pub fn listen(
        &self,
        kind: SignalKind,
        callback: impl Fn(&PageSignal, PageState) + 'static,
    ) -> ListenerId {
        self.register(kind, false, Rc::new(callback))
    }

    /// Listener removed automatically after its first invocation
    pub fn listen_once(
        &self,
        kind: SignalKind,
        callback: impl Fn(&PageSignal, PageState) + 'static,
    ) -> ListenerId {
        self.register(kind, true, Rc::new(callback))
    }

    /// Run `callback` with the signal timestamp whenever the page turns hidden
    pub fn on_hidden(&self, callback: impl Fn(f64) + 'static) -> ListenerId {
        self.listen(SignalKind::VisibilityChange, move |signal, state| {
            if let PageSignal::VisibilityChange { timestamp, .. } = signal {
                if state.hidden {
                    callback(*timestamp);
                }
            }
        })
    }

    /// Run `callback` with the page-show timestamp when the page is restored from cache
    pub fn on_cache_restore(&self, callback: impl Fn(f64) + 'static) -> ListenerId {
        self.listen(SignalKind::PageShow, move |signal, _| {
            if let PageSignal::PageShow {
                persisted: true,
                timestamp,
            } = signal
            {
                callback(*timestamp);
            }
        })
    }

    pub fn remove(&self, id: ListenerId) {
        self.listeners.borrow_mut().retain(|l| l.id != id);
    }

    fn is_registered(&self, id: ListenerId) -> bool {
        self.listeners.borrow().iter().any(|l| l.id == id)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    /// Update document state and invoke the listeners registered for this signal.
    ///
    /// A visibility change that does not change the visibility state is dropped.
    /// A page restored from the back/forward cache is visible.
    pub fn dispatch(&self, signal: PageSignal) {
        let mut state = self.state.get();
        match signal {
            PageSignal::VisibilityChange { hidden, .. } => {
                if state.hidden == hidden {
                    return;
                }
                state.hidden = hidden;
            }
            PageSignal::PageShow {
                persisted: true, ..
            } => state.hidden = false,
            PageSignal::Load => state.load_complete = true,
            _ => {}
        }
        self.state.set(state);

        let kind = signal.kind();
        let snapshot: Vec<(ListenerId, bool, SignalListener)> = self
            .listeners
            .borrow()
            .iter()
            .filter(|l| l.kind == kind)
            .map(|l| (l.id, l.once, Rc::clone(&l.callback)))
            .collect();

        for (id, once, callback) in snapshot {
            if !self.is_registered(id) {
                continue;
            }
            if once {
                self.remove(id);
            }
            callback(&signal, self.state.get());
        }
    }

    pub fn hide(&self, timestamp: f64) {
        self.dispatch(PageSignal::VisibilityChange {
            hidden: true,
            timestamp,
        });
    }

    pub fn show(&self, timestamp: f64) {
        self.dispatch(PageSignal::VisibilityChange {
            hidden: false,
            timestamp,
        });
    }

    /// Page-show from the back/forward cache
    pub fn restore_from_cache(&self, timestamp: f64) {
        self.dispatch(PageSignal::PageShow {
            persisted: true,
            timestamp,
        });
    }

    pub fn complete_load(&self) {
        self.dispatch(PageSignal::Load);
    }
}
