//! GlobalFileQueue: the two-lane priority queue (§4.2 of the spec).

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// A single unit of copy work, produced during Phase 1 analysis and
/// consumed exactly once by a worker during Phase 3.
#[derive(Debug, Clone)]
pub struct FileWorkItem {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub job_name: String,
    pub size: u64,
    pub is_priority: bool,
    pub requires_encryption: bool,
}

/// Thread-safe two-lane priority queue. Each lane is an independently locked
/// `VecDeque`; the active-producer count is a lock-free atomic. No condvar
/// signaling is used on the consumer side — the scheduler polls
/// [`GlobalFileQueue::try_dequeue`] with a small backoff, per the spec.
pub struct GlobalFileQueue {
    priority_lane: Mutex<VecDeque<FileWorkItem>>,
    normal_lane: Mutex<VecDeque<FileWorkItem>>,
    active_producers: AtomicUsize,
}

impl GlobalFileQueue {
    pub fn new() -> Self {
        Self {
            priority_lane: Mutex::new(VecDeque::new()),
            normal_lane: Mutex::new(VecDeque::new()),
            active_producers: AtomicUsize::new(0),
        }
    }

    pub fn register_producer(&self) {
        self.active_producers.fetch_add(1, Ordering::SeqCst);
    }

    pub fn producer_done(&self) {
        self.active_producers.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn enqueue(&self, item: FileWorkItem) {
        if item.is_priority {
            self.priority_lane
                .lock()
                .expect("priority lane lock poisoned")
                .push_back(item);
        } else {
            self.normal_lane
                .lock()
                .expect("normal lane lock poisoned")
                .push_back(item);
        }
    }

    /// Always drains the priority lane first; only draws from the normal
    /// lane once the priority lane is empty.
    pub fn try_dequeue(&self) -> Option<FileWorkItem> {
        if let Some(item) = self
            .priority_lane
            .lock()
            .expect("priority lane lock poisoned")
            .pop_front()
        {
            return Some(item);
        }
        self.normal_lane
            .lock()
            .expect("normal lane lock poisoned")
            .pop_front()
    }

    /// Both lanes empty AND zero active producers.
    pub fn is_completed(&self) -> bool {
        self.pending_count() == 0 && self.active_producers.load(Ordering::SeqCst) == 0
    }

    pub fn pending_count(&self) -> usize {
        self.priority_lane.lock().expect("priority lane lock poisoned").len()
            + self.normal_lane.lock().expect("normal lane lock poisoned").len()
    }
}

impl Default for GlobalFileQueue {
    fn default() -> Self {
        Self::new()
    }
}
