//! Deferred callbacks.
//!
//! The core never decides *when* "after the current synchronous work" is; the
//! host does, through the [`Defer`] primitive. On top of it [`NextTick`]
//! coalesces any number of callbacks registered in one synchronous burst into
//! a single scheduled task.
//!
//! [`TaskQueue`] is the built-in primitive: tasks accumulate until the host
//! calls [`Runtime::tick`](crate::Runtime::tick).

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use super::runtime::Runtime;

/// A one-shot task.
pub type Task = Box<dyn FnOnce()>;

/// Host primitive: run `task` once, after the current synchronous execution
/// and before further externally visible rendering.
pub trait Defer {
    fn schedule(&self, task: Task);
}

/// FIFO task queue drained explicitly by the host.
#[derive(Default)]
pub struct TaskQueue {
    tasks: RefCell<VecDeque<Task>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.borrow().is_empty()
    }

    /// Run tasks until the queue is empty, including tasks scheduled by
    /// the tasks themselves. Returns how many ran.
    pub fn run_all(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self.tasks.borrow_mut().pop_front();
            let Some(task) = next else { break };
            task();
            ran += 1;
        }
        ran
    }
}

impl Defer for TaskQueue {
    fn schedule(&self, task: Task) {
        self.tasks.borrow_mut().push_back(task);
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue").field("len", &self.len()).finish()
    }
}

/// Callback batch for one runtime.
pub(crate) struct NextTick {
    callbacks: RefCell<Vec<Task>>,
    pending: Cell<bool>,
    defer: Rc<dyn Defer>,
    local: Option<Rc<TaskQueue>>,
}

impl NextTick {
    pub(crate) fn new(defer: Rc<dyn Defer>, local: Option<Rc<TaskQueue>>) -> Self {
        Self {
            callbacks: RefCell::new(Vec::new()),
            pending: Cell::new(false),
            defer,
            local,
        }
    }

    /// Register `callback`; schedules one deferred task per burst.
    pub(crate) fn push(runtime: &Runtime, callback: Task) {
        let ticks = runtime.ticks();
        ticks.callbacks.borrow_mut().push(callback);
        if ticks.pending.replace(true) {
            return;
        }
        let weak = runtime.downgrade();
        ticks.defer.schedule(Box::new(move || {
            if let Some(runtime) = Runtime::upgrade(&weak) {
                runtime.ticks().run_callbacks();
            }
        }));
    }

    fn run_callbacks(&self) {
        self.pending.set(false);
        let callbacks = std::mem::take(&mut *self.callbacks.borrow_mut());
        for callback in callbacks {
            callback();
        }
    }

    pub(crate) fn drain_local(&self) -> usize {
        self.local.as_ref().map_or(0, |queue| queue.run_all())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_callbacks_coalesce_into_one_task() {
        let queue = Rc::new(TaskQueue::new());
        let rt = Runtime::with_defer(Config::default(), queue.clone());

        let order = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            rt.next_tick(move || order.borrow_mut().push(i));
        }

        assert_eq!(queue.len(), 1);
        assert!(order.borrow().is_empty());

        assert_eq!(queue.run_all(), 1);
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn test_callback_registered_during_run_gets_new_task() {
        let rt = Runtime::new();
        let hits = Rc::new(Cell::new(0));

        let rt_inner = rt.clone();
        let hits_outer = hits.clone();
        rt.next_tick(move || {
            hits_outer.set(hits_outer.get() + 1);
            let hits_inner = hits_outer.clone();
            rt_inner.next_tick(move || hits_inner.set(hits_inner.get() + 1));
        });

        assert_eq!(rt.tick(), 2);
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn test_tick_is_noop_for_host_defer() {
        let queue = Rc::new(TaskQueue::new());
        let rt = Runtime::with_defer(Config::default(), queue.clone());
        rt.next_tick(|| {});
        assert_eq!(rt.tick(), 0);
        assert_eq!(queue.len(), 1);
    }
}
