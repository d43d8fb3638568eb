//! Real-time scheduler on a tokio `LocalSet`
//!
//! Callbacks are `!Send` (they capture `Rc` state), so every timeout is a
//! `spawn_local` task. The scheduler must be used from inside a `LocalSet`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use tokio::task::AbortHandle;

use super::{Callback, Scheduler, TimeoutId};

#[derive(Default)]
struct Tasks {
    next_id: u64,
    handles: HashMap<u64, AbortHandle>,
}

/// Scheduler that sleeps with `tokio::time`.
#[derive(Clone, Default)]
pub struct TokioScheduler {
    tasks: Rc<RefCell<Tasks>>,
}

impl TokioScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of timeouts that have neither fired nor been cleared.
    pub fn pending_count(&self) -> usize {
        self.tasks.borrow().handles.len()
    }
}

impl Scheduler for TokioScheduler {
    fn set_timeout(&self, delay: Duration, callback: Callback) -> TimeoutId {
        let id = {
            let mut tasks = self.tasks.borrow_mut();
            let id = tasks.next_id;
            tasks.next_id += 1;
            id
        };

        let tasks = Rc::clone(&self.tasks);
        let handle = tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            // Deregister before running so the callback can schedule freely.
            let still_pending = tasks.borrow_mut().handles.remove(&id).is_some();
            if still_pending {
                callback();
            }
        });

        self.tasks
            .borrow_mut()
            .handles
            .insert(id, handle.abort_handle());
        TimeoutId(id)
    }

    fn clear_timeout(&self, id: TimeoutId) {
        if let Some(handle) = self.tasks.borrow_mut().handles.remove(&id.0) {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for TokioScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioScheduler")
            .field("pending", &self.pending_count())
            .finish()
    }
}
