//! Cancellable timers on the local task set.
//!
//! Every timer is a `spawn_local` task registered under a [`TaskToken`].
//! A timer unregisters itself before its callback runs, so a callback never
//! observes its own token as pending. All methods must be called from
//! within a `tokio::task::LocalSet`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use tokio::task::{spawn_local, AbortHandle};
use tokio::time::{interval_at, sleep_until, Duration, Instant, MissedTickBehavior};

const MIN_PERIOD: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskToken(u64);

#[derive(Default)]
struct SchedulerInner {
    next_token: u64,
    tasks: HashMap<u64, AbortHandle>,
    closed: bool,
}

impl SchedulerInner {
    fn is_live(inner: &Weak<RefCell<SchedulerInner>>, id: u64) -> bool {
        inner
            .upgrade()
            .map(|i| i.borrow().tasks.contains_key(&id))
            .unwrap_or(false)
    }
}

#[derive(Clone, Default)]
pub struct Scheduler {
    inner: Rc<RefCell<SchedulerInner>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_token(&self) -> Option<u64> {
        let mut inner = self.inner.borrow_mut();
        inner.next_token += 1;
        if inner.closed {
            None
        } else {
            Some(inner.next_token)
        }
    }

    /// Run `task` once after `delay`. After [`Scheduler::shutdown`] the
    /// returned token is inert and nothing is spawned.
    pub fn schedule<F>(&self, delay: Duration, task: F) -> TaskToken
    where
        F: FnOnce() + 'static,
    {
        let id = match self.next_token() {
            Some(id) => id,
            None => return TaskToken(self.inner.borrow().next_token),
        };
        let deadline = Instant::now() + delay;
        let weak = Rc::downgrade(&self.inner);
        let handle = spawn_local(async move {
            sleep_until(deadline).await;
            let live = match weak.upgrade() {
                Some(inner) => inner.borrow_mut().tasks.remove(&id).is_some(),
                None => false,
            };
            if live {
                task();
            }
        });
        self.inner
            .borrow_mut()
            .tasks
            .insert(id, handle.abort_handle());
        TaskToken(id)
    }

    /// Run `task` every `period`, first after one full period, until cancelled.
    /// A zero `period` is raised to one millisecond.
    pub fn schedule_every<F>(&self, period: Duration, mut task: F) -> TaskToken
    where
        F: FnMut() + 'static,
    {
        let period = period.max(MIN_PERIOD);
        let id = match self.next_token() {
            Some(id) => id,
            None => return TaskToken(self.inner.borrow().next_token),
        };
        let start = Instant::now() + period;
        let weak = Rc::downgrade(&self.inner);
        let handle = spawn_local(async move {
            let mut ticker = interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if !SchedulerInner::is_live(&weak, id) {
                    break;
                }
                task();
            }
        });
        self.inner
            .borrow_mut()
            .tasks
            .insert(id, handle.abort_handle());
        TaskToken(id)
    }

    /// Returns `true` if the task was still pending.
    pub fn cancel(&self, token: TaskToken) -> bool {
        let handle = self.inner.borrow_mut().tasks.remove(&token.0);
        match handle {
            Some(h) => {
                h.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, token: TaskToken) -> bool {
        self.inner.borrow().tasks.contains_key(&token.0)
    }

    pub fn pending(&self) -> usize {
        self.inner.borrow().tasks.len()
    }

    /// Cancel everything and refuse new work.
    pub fn shutdown(&self) {
        let handles: Vec<AbortHandle> = {
            let mut inner = self.inner.borrow_mut();
            inner.closed = true;
            inner.tasks.drain().map(|(_, h)| h).collect()
        };
        if !handles.is_empty() {
            tracing::debug!(count = handles.len(), "Cancelling pending timers");
        }
        for h in handles {
            h.abort();
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.borrow().closed
    }
}
