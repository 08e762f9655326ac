//! Short-lived user-facing messages.
//!
//! The center only owns existence and timing of entries. Entering and
//! leaving animations belong to whatever renders them.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use sync::{Scheduler, TaskToken};
use tokio::sync::watch;
use tokio::time::Duration;

pub const DEFAULT_NOTIFICATION_LIFETIME: Duration = Duration::from_millis(4000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NotificationId(u64);

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Success,
    Error,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Success => write!(f, "success"),
            Severity::Error => write!(f, "error"),
            Severity::Info => write!(f, "info"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: NotificationId,
    pub severity: Severity,
    pub title: String,
    pub detail: Option<String>,
    pub lifetime: Duration,
}

struct CenterState {
    entries: Vec<Notification>,
    timers: HashMap<NotificationId, TaskToken>,
    next_id: u64,
    live: watch::Sender<Vec<Notification>>,
}

impl CenterState {
    /// Shared by explicit dismissal and auto-expiry.
    fn remove(&mut self, id: NotificationId) -> Option<TaskToken> {
        let before = self.entries.len();
        self.entries.retain(|n| n.id != id);
        let token = self.timers.remove(&id);
        if self.entries.len() != before {
            self.live.send_replace(self.entries.clone());
        }
        token
    }
}

/// Cheap to clone; clones share the same live entries.
#[derive(Clone)]
pub struct NotificationCenter {
    state: Rc<RefCell<CenterState>>,
    scheduler: Scheduler,
    default_lifetime: Duration,
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new(DEFAULT_NOTIFICATION_LIFETIME)
    }
}

impl NotificationCenter {
    pub fn new(default_lifetime: Duration) -> Self {
        let (live, _) = watch::channel(Vec::new());
        NotificationCenter {
            state: Rc::new(RefCell::new(CenterState {
                entries: Vec::new(),
                timers: HashMap::new(),
                next_id: 0,
                live,
            })),
            scheduler: Scheduler::new(),
            default_lifetime,
        }
    }

    /// Add an entry and schedule its removal. Ids are never reused.
    pub fn notify(
        &self,
        severity: Severity,
        title: impl Into<String>,
        detail: Option<String>,
        lifetime: Option<Duration>,
    ) -> NotificationId {
        let lifetime = lifetime.unwrap_or(self.default_lifetime);
        let title = title.into();
        match severity {
            Severity::Error => tracing::warn!(%title, detail = ?detail, "Notification"),
            _ => tracing::info!(%severity, %title, detail = ?detail, "Notification"),
        }

        let id = {
            let mut state = self.state.borrow_mut();
            state.next_id += 1;
            NotificationId(state.next_id)
        };
        if self.scheduler.is_shut_down() {
            tracing::debug!(%id, "Notification center shut down; entry not shown");
            return id;
        }

        {
            let mut state = self.state.borrow_mut();
            state.entries.push(Notification {
                id,
                severity,
                title,
                detail,
                lifetime,
            });
            state.live.send_replace(state.entries.clone());
        }

        let weak = Rc::downgrade(&self.state);
        let token = self.scheduler.schedule(lifetime, move || {
            if let Some(state) = weak.upgrade() {
                state.borrow_mut().remove(id);
            }
        });
        self.state.borrow_mut().timers.insert(id, token);
        id
    }

    pub fn success(&self, title: impl Into<String>, detail: Option<String>) -> NotificationId {
        self.notify(Severity::Success, title, detail, None)
    }

    pub fn error(&self, title: impl Into<String>, detail: Option<String>) -> NotificationId {
        self.notify(Severity::Error, title, detail, None)
    }

    pub fn info(&self, title: impl Into<String>, detail: Option<String>) -> NotificationId {
        self.notify(Severity::Info, title, detail, None)
    }

    /// Remove an entry. Unknown or already expired ids are ignored.
    pub fn dismiss(&self, id: NotificationId) {
        let token = self.state.borrow_mut().remove(id);
        if let Some(token) = token {
            self.scheduler.cancel(token);
        }
    }

    /// Live entries in creation order.
    pub fn entries(&self) -> Vec<Notification> {
        self.state.borrow().entries.clone()
    }

    pub fn get(&self, id: NotificationId) -> Option<Notification> {
        self.state
            .borrow()
            .entries
            .iter()
            .find(|n| n.id == id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.state.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<Notification>> {
        self.state.borrow().live.subscribe()
    }

    /// Cancel all pending expiry timers. Existing entries stay as they are.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
        self.state.borrow_mut().timers.clear();
    }
}
