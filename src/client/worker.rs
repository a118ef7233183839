//! Worker queue between the core and the platform shell.
//!
//! The shell polls [`WorkerQueue::next_task`], performs the platform
//! operation (file wipe, enclave key management), and reports back via
//! [`WorkerQueue::completed`]. When the queue is drained the poll answers
//! `Idle` while more work is expected and `None` once the client is
//! quiescent.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

pub type TaskId = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerMethod {
    /// Securely wipe the file named in `p1`.
    WipeFile,
    /// Wipe the enclave key whose public key is in `p1`.
    WipeKey,
    /// Create an enclave key; the result is its public key.
    CreateKey,
    /// Encrypt `p2` to the public key in `p1`.
    Encrypt,
    /// Decrypt `p2` with the key belonging to the public key in `p1`.
    Decrypt,
    /// Nothing queued, but more work is expected soon. Poll again.
    Idle,
    /// Nothing queued and none expected until the client acts again.
    None,
}

#[derive(Clone, Debug)]
pub struct WorkerTask {
    pub id: TaskId,
    pub method: WorkerMethod,
    pub p1: String,
    pub p2: String,
    pub p3: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskResult {
    pub with_error: bool,
    pub data: String,
}

/// Task queue with completion tracking.
pub struct WorkerQueue {
    next_id: AtomicU64,
    expecting_more: AtomicBool,
    pending: Mutex<VecDeque<WorkerTask>>,
    in_flight: Mutex<HashMap<TaskId, WorkerTask>>,
    results: Mutex<HashMap<TaskId, TaskResult>>,
}

impl WorkerQueue {
    pub fn new() -> WorkerQueue {
        WorkerQueue {
            next_id: AtomicU64::new(1),
            expecting_more: AtomicBool::new(false),
            pending: Mutex::new(VecDeque::new()),
            in_flight: Mutex::new(HashMap::new()),
            results: Mutex::new(HashMap::new()),
        }
    }

    /// Queue a task for the shell. Returns its id for later lookup.
    pub fn submit(&self, method: WorkerMethod, p1: &str, p2: &str, p3: &str) -> TaskId {
        debug_assert!(!matches!(method, WorkerMethod::Idle | WorkerMethod::None));
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let task = WorkerTask {
            id,
            method,
            p1: p1.to_string(),
            p2: p2.to_string(),
            p3: p3.to_string(),
        };
        self.lock_pending().push_back(task);
        id
    }

    /// Mark whether further tasks are expected when the queue drains.
    /// Controls the `Idle` vs `None` answer of [`WorkerQueue::next_task`].
    pub fn expect_more(&self, expecting: bool) {
        self.expecting_more.store(expecting, Ordering::SeqCst);
    }

    /// The next task for the shell, or `Idle`/`None` when drained.
    pub fn next_task(&self) -> WorkerTask {
        if let Some(task) = self.lock_pending().pop_front() {
            self.lock_in_flight().insert(task.id, task.clone());
            return task;
        }
        let method = if self.expecting_more.load(Ordering::SeqCst) {
            WorkerMethod::Idle
        } else {
            WorkerMethod::None
        };
        WorkerTask {
            id: 0,
            method,
            p1: String::new(),
            p2: String::new(),
            p3: String::new(),
        }
    }

    /// Report a task outcome. Unknown ids are logged and dropped.
    pub fn completed(&self, id: TaskId, with_error: bool, data: &str) {
        if self.lock_in_flight().remove(&id).is_none() {
            log::warn!("worker: completion for unknown task {id}");
            return;
        }
        if with_error {
            log::warn!("worker: task {id} completed with error");
        }
        self.lock_results().insert(
            id,
            TaskResult {
                with_error,
                data: data.to_string(),
            },
        );
    }

    /// Take the result of a completed task.
    pub fn result(&self, id: TaskId) -> Option<TaskResult> {
        self.lock_results().remove(&id)
    }

    /// Tasks handed out but not yet completed.
    pub fn in_flight(&self) -> usize {
        self.lock_in_flight().len()
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, VecDeque<WorkerTask>> {
        self.pending.lock().expect("worker queue lock poisoned")
    }

    fn lock_in_flight(&self) -> std::sync::MutexGuard<'_, HashMap<TaskId, WorkerTask>> {
        self.in_flight.lock().expect("worker queue lock poisoned")
    }

    fn lock_results(&self) -> std::sync::MutexGuard<'_, HashMap<TaskId, TaskResult>> {
        self.results.lock().expect("worker queue lock poisoned")
    }
}

impl Default for WorkerQueue {
    fn default() -> Self {
        WorkerQueue::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_and_completion() {
        let q = WorkerQueue::new();
        let a = q.submit(WorkerMethod::WipeFile, "/tmp/a", "", "");
        let b = q.submit(WorkerMethod::CreateKey, "", "", "");

        let t1 = q.next_task();
        assert_eq!(t1.id, a);
        assert_eq!(t1.method, WorkerMethod::WipeFile);
        assert_eq!(t1.p1, "/tmp/a");

        let t2 = q.next_task();
        assert_eq!(t2.id, b);
        assert_eq!(q.in_flight(), 2);

        q.completed(a, false, "");
        q.completed(b, false, "pubkey");
        assert_eq!(q.in_flight(), 0);
        assert_eq!(
            q.result(b),
            Some(TaskResult {
                with_error: false,
                data: "pubkey".to_string()
            })
        );
        assert!(q.result(b).is_none());
    }

    #[test]
    fn test_idle_vs_none() {
        let q = WorkerQueue::new();
        assert_eq!(q.next_task().method, WorkerMethod::None);
        q.expect_more(true);
        assert_eq!(q.next_task().method, WorkerMethod::Idle);
        q.expect_more(false);
        assert_eq!(q.next_task().method, WorkerMethod::None);
    }

    #[test]
    fn test_unknown_completion_ignored() {
        let q = WorkerQueue::new();
        q.completed(42, false, "ignored");
        assert!(q.result(42).is_none());
    }

    #[test]
    fn test_error_completion_recorded() {
        let q = WorkerQueue::new();
        let id = q.submit(WorkerMethod::Decrypt, "pub", "ct", "");
        let _ = q.next_task();
        q.completed(id, true, "");
        assert!(q.result(id).unwrap().with_error);
    }
}
