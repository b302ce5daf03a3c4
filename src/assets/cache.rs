use std::path::PathBuf;
use std::sync::Arc;

use rayon::prelude::*;

use crate::assets::decode::{DecodedLayer, decode_layer};
use crate::foundation::core::Canvas;
use crate::foundation::error::{ReelcastError, ReelcastResult};
use crate::timeline::Timeline;

/// Counters reported at the end of a render.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    /// Lookups served without decoding.
    pub hits: u64,
    /// Lookups that decoded an image.
    pub misses: u64,
    /// Entries dropped to make room.
    pub evictions: u64,
    /// Peak number of resident layers.
    pub peak_entries: usize,
}

/// Bounded least-recently-used cache of decoded layers keyed by source path.
///
/// Holds at most `capacity` layers; inserting into a full cache evicts the least recently used
/// entry and never fails.
#[derive(Debug)]
pub struct LayerCache {
    capacity: usize,
    canvas: Canvas,
    // Recency order: front is least recently used.
    entries: Vec<(PathBuf, Arc<DecodedLayer>)>,
    stats: CacheStats,
}

impl LayerCache {
    /// Create an empty cache. `capacity` is raised to at least 1.
    pub fn new(capacity: usize, canvas: Canvas) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            canvas,
            entries: Vec::with_capacity(capacity),
            stats: CacheStats::default(),
        }
    }

    /// Maximum number of resident layers.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of resident layers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Return `true` when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return `true` when `path` is resident. Does not touch recency.
    pub fn contains(&self, path: &std::path::Path) -> bool {
        self.entries.iter().any(|(p, _)| p == path)
    }

    /// Cached layer for `path`, decoding it on a miss.
    pub fn get_or_decode(&mut self, path: &std::path::Path) -> ReelcastResult<Arc<DecodedLayer>> {
        if let Some(pos) = self.entries.iter().position(|(p, _)| p == path) {
            self.stats.hits += 1;
            let entry = self.entries.remove(pos);
            let layer = Arc::clone(&entry.1);
            self.entries.push(entry);
            return Ok(layer);
        }

        self.stats.misses += 1;
        tracing::debug!(file = %path.display(), "layer cache miss");
        let layer = Arc::new(decode_layer(path, self.canvas)?);
        self.insert(path.to_path_buf(), Arc::clone(&layer));
        Ok(layer)
    }

    fn insert(&mut self, path: PathBuf, layer: Arc<DecodedLayer>) {
        while self.entries.len() >= self.capacity {
            let (evicted, _) = self.entries.remove(0);
            self.stats.evictions += 1;
            tracing::debug!(file = %evicted.display(), "layer cache eviction");
        }
        self.entries.push((path, layer));
        self.stats.peak_entries = self.stats.peak_entries.max(self.entries.len());
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

/// Every layer of a timeline decoded up front, indexed by timeline position.
#[derive(Debug)]
pub struct PrecomputedLayers {
    layers: Vec<Arc<DecodedLayer>>,
    hits: u64,
}

impl PrecomputedLayers {
    /// Decode all assets of `timeline` on a worker pool.
    ///
    /// Results land in slots preallocated by timeline index, so the output order does not depend
    /// on worker scheduling. The first failing asset aborts the whole decode.
    pub fn decode_all(
        timeline: &Timeline,
        canvas: Canvas,
        threads: Option<usize>,
    ) -> ReelcastResult<Self> {
        let pool = build_thread_pool(threads)?;
        let paths: Vec<&std::path::Path> =
            timeline.assets().iter().map(|a| a.source.as_path()).collect();

        let mut slots: Vec<Option<ReelcastResult<DecodedLayer>>> =
            (0..paths.len()).map(|_| None).collect();
        pool.install(|| {
            slots
                .par_iter_mut()
                .zip(paths.par_iter())
                .for_each(|(slot, path)| {
                    *slot = Some(decode_layer(path, canvas));
                });
        });

        let mut layers = Vec::with_capacity(slots.len());
        for (slot, path) in slots.into_iter().zip(&paths) {
            let layer = slot.ok_or_else(|| {
                ReelcastError::asset_decode(path, "decode task produced no result")
            })??;
            layers.push(Arc::new(layer));
        }
        tracing::info!(layers = layers.len(), "precomputed all layers");
        Ok(Self { layers, hits: 0 })
    }

    /// Layer at timeline position `index`.
    pub fn get(&mut self, index: usize) -> Option<Arc<DecodedLayer>> {
        let layer = self.layers.get(index).cloned();
        if layer.is_some() {
            self.hits += 1;
        }
        layer
    }

    /// Number of decoded layers.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Return `true` when no layer was decoded.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.layers.len() as u64,
            evictions: 0,
            peak_entries: self.layers.len(),
        }
    }
}

/// Where the compositor gets decoded layers from.
#[derive(Debug)]
pub enum LayerStore {
    /// Bounded LRU, decode on demand.
    Streaming(LayerCache),
    /// All layers resident.
    Precomputed(PrecomputedLayers),
}

impl LayerStore {
    /// Layer for timeline position `index` whose source is `path`.
    pub fn layer(
        &mut self,
        index: usize,
        path: &std::path::Path,
    ) -> ReelcastResult<Arc<DecodedLayer>> {
        match self {
            Self::Streaming(cache) => cache.get_or_decode(path),
            Self::Precomputed(all) => all.get(index).ok_or_else(|| {
                ReelcastError::asset_decode(path, format!("no precomputed layer at index {index}"))
            }),
        }
    }

    /// Counters for the render report.
    pub fn stats(&self) -> CacheStats {
        match self {
            Self::Streaming(cache) => cache.stats(),
            Self::Precomputed(all) => all.stats(),
        }
    }
}

pub(crate) fn build_thread_pool(threads: Option<usize>) -> ReelcastResult<rayon::ThreadPool> {
    if let Some(n) = threads
        && n == 0
    {
        return Err(ReelcastError::config("'threads' must be >= 1 when set"));
    }
    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build rayon thread pool: {e}").into())
}

#[cfg(test)]
#[path = "../../tests/unit/assets/cache.rs"]
mod tests;
