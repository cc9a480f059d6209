//! The render-thread control loop: tracks the visible tile set, dispatches
//! work to the worker pool, and drains completions. This loop is
//! single-threaded; all heavy work (fetch/decode/build) runs on workers.

use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crossbeam_channel::{Receiver, Sender};
use threadpool::ThreadPool;
use tracing::debug_span;

use crate::errors::TangramError;
use crate::geometry::{RasterTile, TileData};
use crate::id::TileId;
use crate::source::task::{PriorityHandle, TaskState, TileTask};
use crate::source::TileSource;

pub enum TaskCompletion {
    Ready {
        tile_id: TileId,
        source_generation: i64,
        tile_data: Arc<TileData>,
    },
    Canceled {
        tile_id: TileId,
    },
    Failed {
        tile_id: TileId,
        error: TangramError,
    },
}

struct TileEntry {
    task: Arc<TileTask>,
    proxy_ref_count: AtomicI32,
}

/// Owns the live tile set, the priority queue, and proxy counters. All of
/// these are touched only from the render thread; workers communicate
/// exclusively through `completion_rx`.
pub struct TileManager {
    source: Arc<TileSource>,
    tiles: RwLock<HashMap<TileId, TileEntry>>,
    priority_queue: Mutex<BinaryHeap<PriorityHandle>>,
    worker_pool: ThreadPool,
    completion_tx: Sender<TaskCompletion>,
    completion_rx: Receiver<TaskCompletion>,
}

impl TileManager {
    pub fn new(source: Arc<TileSource>, worker_threads: usize) -> Self {
        let (completion_tx, completion_rx) = crossbeam_channel::unbounded();
        TileManager {
            source,
            tiles: RwLock::new(HashMap::new()),
            priority_queue: Mutex::new(BinaryHeap::new()),
            worker_pool: ThreadPool::new(worker_threads.max(1)),
            completion_tx,
            completion_rx,
        }
    }

    /// One frame's worth of reconciliation: create tasks for newly wanted
    /// tiles, mark stale ones for eviction, update proxy accounting, and
    /// drain whatever workers have finished since the last call.
    pub fn update(&self, wanted: &HashSet<TileId>, view_center: (f64, f64)) {
        self.enqueue_newly_wanted(wanted, view_center);
        self.evict_unwanted_non_proxies(wanted);
        self.dispatch_from_queue();
        self.drain_completions();
    }

    fn enqueue_newly_wanted(&self, wanted: &HashSet<TileId>, view_center: (f64, f64)) {
        let mut tiles = self.tiles.write().unwrap();
        for &tile_id in wanted {
            if tiles.contains_key(&tile_id) {
                continue;
            }
            let priority = -distance_to_center(tile_id, view_center);
            let task = self.source.create_task(tile_id, priority);
            tiles.insert(
                tile_id,
                TileEntry {
                    task: task.clone(),
                    proxy_ref_count: AtomicI32::new(0),
                },
            );
            self.priority_queue.lock().unwrap().push(PriorityHandle(task));
            self.bump_proxy_refs(tile_id, &tiles);
        }
    }

    /// While `tile_id` is not yet `Ready`, its nearest ancestor and any
    /// existing descendants are retained as proxies so there is no visual
    /// hole during the fetch.
    fn bump_proxy_refs(&self, tile_id: TileId, tiles: &HashMap<TileId, TileEntry>) {
        let mut ancestor = tile_id.parent();
        while let Some(a) = ancestor {
            if let Some(entry) = tiles.get(&a) {
                entry.proxy_ref_count.fetch_add(1, Ordering::Relaxed);
                break;
            }
            ancestor = a.parent();
        }
        for child in tile_id.children() {
            if let Some(entry) = tiles.get(&child) {
                entry.proxy_ref_count.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn evict_unwanted_non_proxies(&self, wanted: &HashSet<TileId>) {
        let mut tiles = self.tiles.write().unwrap();
        let to_evict: Vec<TileId> = tiles
            .iter()
            .filter(|(id, entry)| !wanted.contains(id) && entry.proxy_ref_count.load(Ordering::Relaxed) <= 0)
            .map(|(id, _)| *id)
            .collect();
        for id in to_evict {
            if let Some(entry) = tiles.remove(&id) {
                entry.task.cancel();
                self.source.cancel(id);
            }
        }
    }

    fn dispatch_from_queue(&self) {
        while let Some(PriorityHandle(task)) = self.priority_queue.lock().unwrap().pop() {
            if task.is_canceled() {
                continue;
            }
            let source = self.source.clone();
            let tx = self.completion_tx.clone();
            self.worker_pool.execute(move || {
                let _span = debug_span!("tile_worker", z = task.tile_id.z, x = task.tile_id.x, y = task.tile_id.y).entered();
                run_task_to_completion(source, task, tx);
            });
        }
    }

    /// On each `Ready` completion whose generation matches the source's
    /// current generation, installs the built tile; stale generations are
    /// discarded silently.
    fn drain_completions(&self) {
        while let Ok(completion) = self.completion_rx.try_recv() {
            match completion {
                TaskCompletion::Ready {
                    tile_id,
                    source_generation,
                    tile_data,
                } => {
                    if source_generation != self.source.generation() {
                        continue;
                    }
                    let tiles = self.tiles.read().unwrap();
                    if let Some(entry) = tiles.get(&tile_id) {
                        *entry.task.parsed_tile.lock().unwrap() = Some(tile_data);
                        entry.task.transition(TaskState::Ready);
                        entry.proxy_ref_count.store(0, Ordering::Relaxed);
                    }
                }
                TaskCompletion::Canceled { .. } => {}
                TaskCompletion::Failed { tile_id, error } => {
                    log::error!("tile {tile_id:?} failed: {error}");
                }
            }
        }
    }

    /// Bumps the source generation, invalidating every in-flight task.
    pub fn clear(&self) {
        self.source.clear();
    }
}

fn distance_to_center(tile_id: TileId, view_center: (f64, f64)) -> f64 {
    let dx = tile_id.x as f64 - view_center.0;
    let dy = tile_id.y as f64 - view_center.1;
    (dx * dx + dy * dy).sqrt()
}

/// Runs load -> parse -> build on the worker, checking the cancellation
/// flag between layers (inside the decoder) and reporting the outcome
/// back to the render thread. Raster sub-tasks are loaded alongside the
/// parent; the parent is not considered buildable until every sub-task
/// has reached at least `Loaded` (`TileTask::ready_for_build`).
fn run_task_to_completion(source: Arc<TileSource>, task: Arc<TileTask>, tx: Sender<TaskCompletion>) {
    let rt = match tokio_current_thread_runtime() {
        Ok(rt) => rt,
        Err(e) => {
            let _ = tx.send(TaskCompletion::Failed { tile_id: task.tile_id, error: e });
            return;
        }
    };

    if let Err(e) = rt.block_on(load_with_sub_tasks(&source, &task)) {
        let _ = tx.send(TaskCompletion::Failed { tile_id: task.tile_id, error: e });
        return;
    }

    if task.is_canceled() {
        let _ = tx.send(TaskCompletion::Canceled { tile_id: task.tile_id });
        return;
    }

    let cancel_check = || task.is_canceled();
    let mut data = match source.parse(&task, &cancel_check) {
        Ok(data) => data,
        Err(e) => {
            let _ = tx.send(TaskCompletion::Failed { tile_id: task.tile_id, error: e });
            return;
        }
    };

    task.transition(TaskState::Building);

    if !task.ready_for_build() {
        let _ = tx.send(TaskCompletion::Failed {
            tile_id: task.tile_id,
            error: TangramError::Invariant("raster sub-task did not reach a buildable state".into()),
        });
        return;
    }

    attach_raster_sub_tiles(&task, &mut data);

    let _ = tx.send(TaskCompletion::Ready {
        tile_id: task.tile_id,
        source_generation: task.generation,
        tile_data: Arc::new(data),
    });
}

/// Loads the parent tile's raw bytes, then each raster sub-task's, using
/// each sub-task's own owning source (a raster overlay registered against
/// the parent's vector source). A sub-task whose source has already been
/// dropped fails the whole task rather than silently skipping it.
async fn load_with_sub_tasks(source: &Arc<TileSource>, task: &Arc<TileTask>) -> Result<(), TangramError> {
    source.load(task.clone()).await?;
    if task.is_canceled() {
        return Ok(());
    }

    let subs: Vec<Arc<TileTask>> = task.sub_tasks.lock().unwrap().clone();
    for sub in subs {
        let sub_source = sub
            .source
            .upgrade()
            .ok_or_else(|| TangramError::Invariant("raster sub-task's source was dropped".into()))?;
        sub_source.load(sub).await?;
    }
    Ok(())
}

/// Copies each raster sub-task's fetched bytes onto the built tile, tagged
/// with the raster source that produced them.
fn attach_raster_sub_tiles(task: &Arc<TileTask>, data: &mut TileData) {
    for sub in task.sub_tasks.lock().unwrap().iter() {
        let Some(bytes) = sub.raw_data.lock().unwrap().clone() else {
            continue;
        };
        if let Some(sub_source) = sub.source.upgrade() {
            data.raster.push(RasterTile {
                source_id: sub_source.id,
                bytes,
            });
        }
    }
}

/// Each worker thread owns a minimal single-threaded runtime so
/// `DataProvider::fetch`'s future can be driven without pulling the host's
/// async runtime into library code.
fn tokio_current_thread_runtime() -> Result<tokio::runtime::Runtime, TangramError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| TangramError::Network(format!("failed to start worker runtime: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::TileFormat;
    use crate::source::provider::test_support::StaticProvider;
    use crate::source::{SourceKind, TileSourceConfig};
    use std::time::Duration;

    fn config() -> TileSourceConfig {
        TileSourceConfig {
            name: "osm".into(),
            url_template: "https://tiles/[z]/[x]/[y].mvt".into(),
            min_display_zoom: 0,
            max_display_zoom: 20,
            max_zoom: 14,
            kind: SourceKind::Vector(TileFormat::Mvt),
            cache_size_bytes: 1024 * 1024,
        }
    }

    #[test]
    fn update_creates_tasks_for_newly_wanted_tiles() {
        let provider = Arc::new(StaticProvider::new());
        let source = TileSource::new(config(), provider);
        let manager = TileManager::new(source, 1);

        let mut wanted = HashSet::new();
        wanted.insert(TileId::new(0, 0, 0));
        manager.update(&wanted, (0.0, 0.0));

        std::thread::sleep(Duration::from_millis(50));
        manager.update(&wanted, (0.0, 0.0));

        assert!(manager.tiles.read().unwrap().contains_key(&TileId::new(0, 0, 0)));
    }
}
