//! Scheduler - batched, ordered watcher re-execution.
//!
//! Writes never re-run watchers directly. They enqueue them here, and a
//! single flush (scheduled on the runtime's deferred primitive) re-runs the
//! whole batch:
//!
//! ```text
//! write ─► dep.notify ─► watcher.update ─► queue_watcher ─┐
//! write ─► ...                                            ├─► one deferred flush
//! write ─► ...                                            ┘
//! ```
//!
//! # Ordering
//!
//! The queue is sorted by watcher id before running. Ids are handed out in
//! construction order, so a parent's render watcher runs before its
//! children's, and a component's computed and user watchers run before its
//! render watcher.
//!
//! # Runaway detection
//!
//! Every time a watcher that already ran in this flush is enqueued again, its
//! count goes up, whoever caused the write. This catches a watcher feeding
//! itself as well as two watchers feeding each other. Past `max_update_count`
//! re-queues it is reported once and skipped for the rest of the flush; the
//! other queued watchers still run.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};

use super::next_tick::{NextTick, Task};
use super::runtime::Runtime;
use super::watcher::{Watcher, WatcherId};
use crate::error::Warning;

pub(crate) struct Scheduler {
    queue: RefCell<Vec<Watcher>>,
    /// Ids currently pending in `queue`.
    has: RefCell<HashSet<WatcherId>>,
    /// Ids that have run at least once in the current flush.
    ran: RefCell<HashSet<WatcherId>>,
    /// Re-queue counts within the current flush.
    circular: RefCell<HashMap<WatcherId, u32>>,
    /// Watchers reported as runaway this flush.
    halted: RefCell<HashSet<WatcherId>>,
    /// Resume callbacks run after the flush.
    activated: RefCell<Vec<Task>>,
    /// A flush has been scheduled and has not finished.
    waiting: Cell<bool>,
    flushing: Cell<bool>,
    /// Scan pointer of the running flush.
    index: Cell<usize>,
}

impl Scheduler {
    pub(crate) fn new() -> Self {
        Self {
            queue: RefCell::new(Vec::new()),
            has: RefCell::new(HashSet::new()),
            ran: RefCell::new(HashSet::new()),
            circular: RefCell::new(HashMap::new()),
            halted: RefCell::new(HashSet::new()),
            activated: RefCell::new(Vec::new()),
            waiting: Cell::new(false),
            flushing: Cell::new(false),
            index: Cell::new(0),
        }
    }

    pub(crate) fn is_waiting(&self) -> bool {
        self.waiting.get()
    }

    pub(crate) fn is_flushing(&self) -> bool {
        self.flushing.get()
    }

    pub(crate) fn is_pending(&self, id: WatcherId) -> bool {
        self.has.borrow().contains(&id)
    }

    /// Enqueue `watcher` unless it is already pending in this cycle.
    pub(crate) fn queue_watcher(&self, runtime: &Runtime, watcher: Watcher) {
        let id = watcher.id();
        if self.halted.borrow().contains(&id) || !self.has.borrow_mut().insert(id) {
            return;
        }
        if self.flushing.get() && self.ran.borrow().contains(&id) && self.is_runaway(runtime, &watcher) {
            self.has.borrow_mut().remove(&id);
            return;
        }

        {
            let mut queue = self.queue.borrow_mut();
            if self.flushing.get() {
                // Splice in by id, but never before the entry being run.
                let floor = self.index.get() + 1;
                let mut at = queue.len();
                while at > floor && queue[at - 1].id() > id {
                    at -= 1;
                }
                let len = queue.len();
                queue.insert(at.min(len), watcher);
            } else {
                queue.push(watcher);
            }
        }
        tracing::trace!(watcher = id.raw(), "queued watcher");

        if self.waiting.replace(true) {
            return;
        }
        if runtime.is_async() {
            let weak = runtime.downgrade();
            NextTick::push(
                runtime,
                Box::new(move || {
                    if let Some(runtime) = Runtime::upgrade(&weak) {
                        runtime.scheduler().flush(&runtime);
                    }
                }),
            );
        } else {
            self.flush(runtime);
        }
    }

    /// Count one more re-queue of a watcher that already ran this flush.
    /// Halts and reports it once the count passes `max_update_count`.
    fn is_runaway(&self, runtime: &Runtime, watcher: &Watcher) -> bool {
        let id = watcher.id();
        let count = {
            let mut circular = self.circular.borrow_mut();
            let count = circular.entry(id).or_insert(0);
            *count += 1;
            *count
        };
        if count <= runtime.max_update_count() {
            return false;
        }
        self.halted.borrow_mut().insert(id);
        runtime.warn(Warning::InfiniteUpdate {
            expression: watcher.label(),
            count,
        });
        true
    }

    /// Queue a resume callback to run once the current flush completes.
    pub(crate) fn queue_activated(&self, task: Task) {
        self.activated.borrow_mut().push(task);
    }

    /// Run every queued watcher, in ascending id order.
    pub(crate) fn flush(&self, runtime: &Runtime) {
        if self.flushing.replace(true) {
            return;
        }
        self.queue.borrow_mut().sort_by_key(Watcher::id);
        self.index.set(0);
        tracing::debug!(queued = self.queue.borrow().len(), "flushing watchers");

        loop {
            let index = self.index.get();
            let next = self.queue.borrow().get(index).cloned();
            let Some(watcher) = next else { break };
            let id = watcher.id();

            if self.halted.borrow().contains(&id) || !watcher.is_active() {
                self.has.borrow_mut().remove(&id);
                self.index.set(index + 1);
                continue;
            }

            watcher.before();
            self.has.borrow_mut().remove(&id);
            self.ran.borrow_mut().insert(id);
            tracing::trace!(watcher = id.raw(), "running watcher");
            if let Err(err) = watcher.run() {
                runtime.report_error(&err);
            }

            self.index.set(self.index.get() + 1);
        }

        let activated = std::mem::take(&mut *self.activated.borrow_mut());
        let queue = std::mem::take(&mut *self.queue.borrow_mut());
        let halted = std::mem::take(&mut *self.halted.borrow_mut());
        self.reset();

        // A watcher re-queued mid-flush sits in the queue more than once; its
        // post-update hook still fires once, at its last position.
        let mut seen = HashSet::new();
        let updated: Vec<Watcher> = queue
            .into_iter()
            .rev()
            .filter(|watcher| !halted.contains(&watcher.id()) && seen.insert(watcher.id()))
            .collect();

        for task in activated {
            task();
        }
        // Reverse order: children's post-update hooks before their parents'.
        for watcher in updated {
            if watcher.is_active() {
                watcher.after_flush();
            }
        }
    }

    fn reset(&self) {
        self.index.set(0);
        self.has.borrow_mut().clear();
        self.ran.borrow_mut().clear();
        self.circular.borrow_mut().clear();
        self.halted.borrow_mut().clear();
        self.waiting.set(false);
        self.flushing.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::reactive::{Value, WatchOptions};
    use std::rc::Rc;

    #[test]
    fn test_writes_coalesce_into_one_run() {
        let rt = Runtime::new();
        let state = rt.object();
        state.set("count", 0);

        let runs = Rc::new(RefCell::new(Vec::new()));
        let runs_cb = runs.clone();
        let s = state.clone();
        let _w = rt
            .watch(
                move || Ok(s.get("count")),
                move |new, _| {
                    runs_cb.borrow_mut().push(new.clone());
                    Ok(())
                },
                WatchOptions::new(),
            )
            .unwrap();

        state.set("count", 1);
        state.set("count", 1);
        assert!(runs.borrow().is_empty(), "nothing runs before the flush");

        rt.tick();
        assert_eq!(*runs.borrow(), vec![Value::from(1)]);
    }

    #[test]
    fn test_flush_runs_in_id_order() {
        let rt = Runtime::new();
        let state = rt.object();
        state.set("x", 0);

        let order = Rc::new(RefCell::new(Vec::new()));
        let mut watchers = Vec::new();
        for label in ["first", "second", "third"] {
            let s = state.clone();
            let order = order.clone();
            watchers.push(
                rt.watch(
                    move || Ok(s.get("x")),
                    move |_, _| {
                        order.borrow_mut().push(label);
                        Ok(())
                    },
                    WatchOptions::new(),
                )
                .unwrap(),
            );
        }

        state.set("x", 1);
        rt.tick();
        assert_eq!(*order.borrow(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_mid_flush_invalidation_runs_in_same_flush() {
        let rt = Runtime::new();
        let state = rt.object();
        state.set("a", 0);
        state.set("b", 0);

        // Created first, so it has the smaller id; it watches `b`.
        let b_runs = Rc::new(RefCell::new(0));
        let b_runs_cb = b_runs.clone();
        let sb = state.clone();
        let _wb = rt
            .watch(
                move || Ok(sb.get("b")),
                move |_, _| {
                    *b_runs_cb.borrow_mut() += 1;
                    Ok(())
                },
                WatchOptions::new(),
            )
            .unwrap();

        // Watches `a`, writes `b`.
        let sa = state.clone();
        let writer = state.clone();
        let _wa = rt
            .watch(
                move || Ok(sa.get("a")),
                move |new, _| {
                    writer.set("b", new.clone());
                    Ok(())
                },
                WatchOptions::new(),
            )
            .unwrap();

        state.set("a", 5);
        let tasks = rt.tick();
        assert_eq!(*b_runs.borrow(), 1);
        assert_eq!(tasks, 1, "the smaller-id watcher ran inside the same flush");
    }

    #[test]
    fn test_runaway_watcher_is_reported_and_halted() {
        let warnings = Rc::new(RefCell::new(Vec::new()));
        let warnings_handler = warnings.clone();
        let rt = Runtime::with_config(
            Config::default()
                .max_update_count(10)
                .warn_handler(move |w| warnings_handler.borrow_mut().push(w.clone())),
        );
        let state = rt.object();
        state.set("count", 0);
        state.set("other", 0);

        let s = state.clone();
        let writer = state.clone();
        let runs = Rc::new(RefCell::new(0u32));
        let runs_cb = runs.clone();
        let _runaway = rt
            .watch(
                move || Ok(s.get("count")),
                move |new, _| {
                    *runs_cb.borrow_mut() += 1;
                    writer.set("count", new.as_f64().unwrap_or(0.0) + 1.0);
                    Ok(())
                },
                WatchOptions::new().label("count"),
            )
            .unwrap();

        let other_runs = Rc::new(RefCell::new(0));
        let other_cb = other_runs.clone();
        let so = state.clone();
        let _other = rt
            .watch(
                move || Ok(so.get("other")),
                move |_, _| {
                    *other_cb.borrow_mut() += 1;
                    Ok(())
                },
                WatchOptions::new(),
            )
            .unwrap();

        state.set("count", 1);
        state.set("other", 1);
        rt.tick();

        assert_eq!(*runs.borrow(), 11);
        assert_eq!(*other_runs.borrow(), 1, "unrelated watcher still runs");
        assert!(matches!(
            warnings.borrow().as_slice(),
            [Warning::InfiniteUpdate { count: 11, .. }]
        ));
        assert!(!rt.scheduler().is_waiting());
    }

    #[test]
    fn test_watchers_feeding_each_other_are_halted() {
        let warnings = Rc::new(RefCell::new(Vec::new()));
        let warnings_handler = warnings.clone();
        let rt = Runtime::with_config(
            Config::default()
                .max_update_count(10)
                .warn_handler(move |w| warnings_handler.borrow_mut().push(w.clone())),
        );
        let state = rt.object();
        state.set("a", 0);
        state.set("b", 0);

        // Each watcher bumps the other's source.
        let bump = |watched: &'static str, target: &'static str, runs: Rc<Cell<u32>>, flushed: Rc<Cell<u32>>| {
            let s = state.clone();
            let writer = state.clone();
            rt.watch(
                move || Ok(s.get(watched)),
                move |_, _| {
                    runs.set(runs.get() + 1);
                    let next = writer.get(target).as_f64().unwrap_or(0.0) + 1.0;
                    writer.set(target, next);
                    Ok(())
                },
                WatchOptions::new()
                    .label(watched)
                    .after_flush(move || flushed.set(flushed.get() + 1)),
            )
            .unwrap()
        };
        let (a_runs, a_flushed) = (Rc::new(Cell::new(0)), Rc::new(Cell::new(0)));
        let (b_runs, b_flushed) = (Rc::new(Cell::new(0)), Rc::new(Cell::new(0)));
        let _a = bump("a", "b", a_runs.clone(), a_flushed.clone());
        let _b = bump("b", "a", b_runs.clone(), b_flushed.clone());

        state.set("a", 1);
        rt.tick();

        assert_eq!(a_runs.get(), 11);
        assert_eq!(b_runs.get(), 11);
        assert!(matches!(
            warnings.borrow().as_slice(),
            [Warning::InfiniteUpdate { count: 11, expression }] if &**expression == "a"
        ));
        assert_eq!(a_flushed.get(), 0, "halted watcher gets no post-update hook");
        assert_eq!(b_flushed.get(), 1);
        assert!(!rt.scheduler().is_waiting());
    }

    #[test]
    fn test_requeued_watcher_gets_one_post_update_hook() {
        let rt = Runtime::new();
        let state = rt.object();
        state.set("n", 0);

        let runs = Rc::new(Cell::new(0));
        let flushed = Rc::new(Cell::new(0));
        let (runs_cb, flushed_cb) = (runs.clone(), flushed.clone());
        let s = state.clone();
        let writer = state.clone();
        let _w = rt
            .watch(
                move || Ok(s.get("n")),
                move |new, _| {
                    runs_cb.set(runs_cb.get() + 1);
                    let n = new.as_f64().unwrap_or(0.0);
                    if n < 3.0 {
                        writer.set("n", n + 1.0);
                    }
                    Ok(())
                },
                WatchOptions::new().after_flush(move || flushed_cb.set(flushed_cb.get() + 1)),
            )
            .unwrap();

        state.set("n", 1);
        rt.tick();
        assert_eq!(runs.get(), 3);
        assert_eq!(flushed.get(), 1);
    }

    #[test]
    fn test_sync_flush_mode_runs_immediately() {
        let rt = Runtime::with_config(Config::default().async_flush(false));
        let state = rt.object();
        state.set("n", 0);

        let seen = Rc::new(RefCell::new(0));
        let seen_cb = seen.clone();
        let s = state.clone();
        let _w = rt
            .watch(
                move || Ok(s.get("n")),
                move |_, _| {
                    *seen_cb.borrow_mut() += 1;
                    Ok(())
                },
                WatchOptions::new(),
            )
            .unwrap();

        state.set("n", 1);
        assert_eq!(*seen.borrow(), 1);
    }

    #[test]
    fn test_torn_down_watcher_is_skipped() {
        let rt = Runtime::new();
        let state = rt.object();
        state.set("n", 0);

        let hits = Rc::new(RefCell::new(0));
        let hits_cb = hits.clone();
        let s = state.clone();
        let w = rt
            .watch(
                move || Ok(s.get("n")),
                move |_, _| {
                    *hits_cb.borrow_mut() += 1;
                    Ok(())
                },
                WatchOptions::new(),
            )
            .unwrap();

        state.set("n", 1);
        assert!(rt.scheduler().is_pending(w.id()));
        w.teardown();
        rt.tick();
        assert_eq!(*hits.borrow(), 0);
    }
}
