//! `TileSource`: per-source fetch/cache/cancel orchestration with raster
//! sub-task fan-out, modelled as one type carrying a decoder strategy tag
//! rather than a `DataSource -> NetworkDataSource -> MVTSource` hierarchy.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tracing::debug_span;

use crate::decode::{self, TileFormat};
use crate::errors::TangramError;
use crate::geometry::TileData;
use crate::id::{TileId, TileSourceId};
use crate::source::cache::RawDataCache;
use crate::source::config::{SourceKind, TileSourceConfig};
use crate::source::provider::DataProvider;
use crate::source::task::{TaskState, TileTask};

pub struct TileSource {
    pub id: TileSourceId,
    pub config: TileSourceConfig,
    provider: Arc<dyn DataProvider>,
    raw_cache: RawDataCache,
    generation: AtomicI64,
    in_flight: DashMap<TileId, Arc<TileTask>>,
    /// Raster overlays registered against this vector source, fanned out
    /// as sub-tasks of every tile this source produces.
    raster_sources: Vec<Arc<TileSource>>,
}

impl TileSource {
    pub fn new(config: TileSourceConfig, provider: Arc<dyn DataProvider>) -> Arc<Self> {
        Arc::new(TileSource {
            id: TileSourceId::next(),
            raw_cache: RawDataCache::new(config.cache_size_bytes),
            config,
            provider,
            generation: AtomicI64::new(0),
            in_flight: DashMap::new(),
            raster_sources: Vec::new(),
        })
    }

    pub fn with_raster_sources(mut self_: Self, raster_sources: Vec<Arc<TileSource>>) -> Self {
        self_.raster_sources = raster_sources;
        self_
    }

    pub fn generation(&self) -> i64 {
        self.generation.load(Ordering::Relaxed)
    }

    /// Always succeeds. Attaches one sub-task per registered raster source,
    /// using that source's nearest ancestor tile when `tile_id` is beyond
    /// its own `max_zoom`.
    pub fn create_task(self: &Arc<Self>, tile_id: TileId, priority: f64) -> Arc<TileTask> {
        let task = TileTask::new(tile_id, Arc::downgrade(self), self.generation(), priority);

        let mut subs = Vec::with_capacity(self.raster_sources.len());
        for raster in &self.raster_sources {
            let (ancestor, _offset) = tile_id.ancestor_at(raster.config.max_zoom);
            subs.push(raster.create_task(ancestor, priority));
        }
        *task.sub_tasks.lock().unwrap() = subs;

        self.in_flight.insert(tile_id, task.clone());
        task
    }

    /// Schedules the fetch, short-circuiting the network on a fresh cache
    /// hit. On completion the bytes are cached and stamped with the
    /// generation active at fetch time.
    pub async fn load(self: &Arc<Self>, task: Arc<TileTask>) -> Result<(), TangramError> {
        let _span = debug_span!("tile_load", tile_z = task.tile_id.z, tile_x = task.tile_id.x, tile_y = task.tile_id.y).entered();

        if task.is_canceled() {
            return Ok(());
        }

        if let Some(bytes) = self.raw_cache.get_fresh(task.tile_id, task.generation) {
            *task.raw_data.lock().unwrap() = Some(bytes);
            task.transition(TaskState::Loaded);
            return Ok(());
        }

        task.transition(TaskState::Loading);
        let url = self.config.resolve_url(task.tile_id);
        let (_content_type, bytes) = self.provider.fetch(&url).await?;

        if task.is_canceled() {
            return Ok(());
        }

        self.raw_cache.insert(task.tile_id, bytes.clone(), task.generation);
        *task.raw_data.lock().unwrap() = Some(bytes);
        task.transition(TaskState::Loaded);
        Ok(())
    }

    /// Runs the decoder matching this source's media type. Parse failures
    /// are fatal for the task; the caller drops it without surfacing past
    /// the tile boundary.
    pub fn parse(&self, task: &Arc<TileTask>, cancel: &dyn Fn() -> bool) -> Result<TileData, TangramError> {
        task.transition(TaskState::Parsing);
        let bytes = task
            .raw_data
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| TangramError::Decode("parse called before load completed".into()))?;

        let format = match self.config.kind {
            SourceKind::Vector(format) => format,
            SourceKind::Raster => {
                return Err(TangramError::Decode("raster tiles are not decoded by the vector pipeline".into()));
            }
        };
        let data = decode::decode(format, &bytes, self.id, task.tile_id, cancel)?;
        task.transition(TaskState::Parsed);
        Ok(data)
    }

    /// Marks the task (and its sub-tasks) canceled and asks the provider to
    /// cancel the underlying transfer.
    pub fn cancel(&self, tile_id: TileId) {
        if let Some((_, task)) = self.in_flight.remove(&tile_id) {
            task.cancel();
            if let Some(request_id) = *task.request_id.lock().unwrap() {
                self.provider.cancel(request_id);
            }
        }
    }

    /// Bumps the generation counter. Already-dispatched completions keep
    /// the generation they were created under, so the control loop can
    /// discard stale ones without touching `in_flight` synchronously here.
    pub fn clear(&self) {
        self.generation.fetch_add(1, Ordering::Relaxed);
    }

    pub fn remove_in_flight(&self, tile_id: TileId) {
        self.in_flight.remove(&tile_id);
    }
}

pub type WeakTileSource = Weak<TileSource>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::provider::test_support::StaticProvider;

    fn vector_config() -> TileSourceConfig {
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

    #[tokio::test]
    async fn load_populates_cache_and_transitions_to_loaded() {
        let provider = Arc::new(StaticProvider::new());
        provider.register("https://tiles/0/0/0.mvt", "application/x-protobuf", vec![]);
        let source = TileSource::new(vector_config(), provider);

        let task = source.create_task(TileId::new(0, 0, 0), 0.0);
        source.load(task.clone()).await.unwrap();
        assert_eq!(task.state(), TaskState::Loaded);
        assert!(source.raw_cache.get_fresh(TileId::new(0, 0, 0), task.generation).is_some());
    }

    #[tokio::test]
    async fn cancel_before_load_leaves_raw_data_unset() {
        let provider = Arc::new(StaticProvider::new());
        let source = TileSource::new(vector_config(), provider);
        let task = source.create_task(TileId::new(1, 1, 1), 0.0);
        task.cancel();
        source.load(task.clone()).await.unwrap();
        assert!(task.raw_data.lock().unwrap().is_none());
    }
}
