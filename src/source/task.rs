//! The per-tile task state machine: `New -> Loading -> Loaded -> Parsing ->
//! Parsed -> Building -> Ready | Canceled | Failed`. Transitions into a
//! terminal state are one-way.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, Weak};

use bytes::Bytes;

use crate::geometry::TileData;
use crate::id::TileId;
use crate::source::manager::TileSource;
use crate::source::provider::RequestId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    New,
    Loading,
    Loaded,
    Parsing,
    Parsed,
    Building,
    Ready,
    Canceled,
    Failed,
}

impl TaskState {
    fn is_terminal(self) -> bool {
        matches!(self, TaskState::Ready | TaskState::Canceled | TaskState::Failed)
    }
}

pub struct TileTask {
    pub tile_id: TileId,
    pub source: Weak<TileSource>,
    pub generation: i64,
    priority: AtomicI64,
    state: Mutex<TaskState>,
    cancel_flag: AtomicBool,
    pub raw_data: Mutex<Option<Bytes>>,
    pub sub_tasks: Mutex<Vec<Arc<TileTask>>>,
    pub parsed_tile: Mutex<Option<Arc<TileData>>>,
    pub request_id: Mutex<Option<RequestId>>,
}

impl TileTask {
    pub fn new(tile_id: TileId, source: Weak<TileSource>, generation: i64, priority: f64) -> Arc<Self> {
        Arc::new(TileTask {
            tile_id,
            source,
            generation,
            priority: AtomicI64::new(priority_to_bits(priority)),
            state: Mutex::new(TaskState::New),
            cancel_flag: AtomicBool::new(false),
            raw_data: Mutex::new(None),
            sub_tasks: Mutex::new(Vec::new()),
            parsed_tile: Mutex::new(None),
            request_id: Mutex::new(None),
        })
    }

    pub fn priority(&self) -> f64 {
        bits_to_priority(self.priority.load(AtomicOrdering::Relaxed))
    }

    pub fn set_priority(&self, priority: f64) {
        self.priority.store(priority_to_bits(priority), AtomicOrdering::Relaxed);
    }

    pub fn state(&self) -> TaskState {
        *self.state.lock().unwrap()
    }

    /// Moves to `next`, refusing the transition once the task has already
    /// reached a terminal state.
    pub fn transition(&self, next: TaskState) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.is_terminal() {
            return false;
        }
        *state = next;
        true
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel_flag.load(AtomicOrdering::Relaxed)
    }

    /// Marks this task and every sub-task canceled. Workers observe the
    /// flag at their own safe points; this call does not itself block on
    /// an in-flight worker.
    pub fn cancel(&self) {
        self.cancel_flag.store(true, AtomicOrdering::Relaxed);
        self.transition(TaskState::Canceled);
        for sub in self.sub_tasks.lock().unwrap().iter() {
            sub.cancel();
        }
    }

    /// The main task is not `Ready` until every sub-task has at least
    /// reached `Loaded`.
    pub fn ready_for_build(&self) -> bool {
        self.sub_tasks
            .lock()
            .unwrap()
            .iter()
            .all(|t| matches!(t.state(), TaskState::Loaded | TaskState::Parsing | TaskState::Parsed | TaskState::Building | TaskState::Ready))
    }
}

fn priority_to_bits(p: f64) -> i64 {
    p.to_bits() as i64
}

fn bits_to_priority(bits: i64) -> f64 {
    f64::from_bits(bits as u64)
}

/// Ordered by priority for the worker queue's binary heap: a
/// `std::collections::BinaryHeap` is a max-heap, and the scheduler wants
/// the highest-priority (closest to view center, least negative distance)
/// task popped first.
pub struct PriorityHandle(pub Arc<TileTask>);

impl PartialEq for PriorityHandle {
    fn eq(&self, other: &Self) -> bool {
        self.0.priority() == other.0.priority()
    }
}
impl Eq for PriorityHandle {}

impl PartialOrd for PriorityHandle {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PriorityHandle {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .priority()
            .partial_cmp(&other.0.priority())
            .unwrap_or(Ordering::Equal)
    }
}
