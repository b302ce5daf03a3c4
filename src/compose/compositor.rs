use std::sync::Arc;

use crate::assets::cache::{CacheStats, LayerStore};
use crate::assets::decode::DecodedLayer;
use crate::compose::crossfade::{PremulColor, blend_rows, copy_rows, fade_through_color_rows};
use crate::compose::regions::RegionLayout;
use crate::config::FadePolicy;
use crate::foundation::core::Canvas;
use crate::foundation::error::ReelcastResult;
use crate::timeline::Timeline;

/// Pixel sampled from the first asset as the fade-through color.
pub const THROUGH_COLOR_SAMPLE: (u32, u32) = (10, 10);

/// Band and blend options for a [`Compositor`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CompositorOpts {
    /// Top band ratio.
    pub top_ratio: f64,
    /// Bottom band ratio.
    pub bottom_ratio: f64,
    /// Hard-switch the top band with each asset.
    pub dynamic_top: bool,
    /// Middle-band transition look.
    pub fade_policy: FadePolicy,
}

impl Default for CompositorOpts {
    fn default() -> Self {
        Self {
            top_ratio: 0.0,
            bottom_ratio: 0.0,
            dynamic_top: false,
            fade_policy: FadePolicy::Crossfade,
        }
    }
}

/// Produces the premultiplied foreground layer for any timeline instant.
///
/// Output is a pure function of `t_ms` and the inputs; cache size and query order never change
/// the pixels.
pub struct Compositor {
    timeline: Timeline,
    store: LayerStore,
    canvas: Canvas,
    layout: RegionLayout,
    opts: CompositorOpts,
    // Source of the static bands and the through-color sample.
    first: Option<Arc<DecodedLayer>>,
    through_color: PremulColor,
    memo: Option<(u64, Arc<DecodedLayer>)>,
    last_index: Option<usize>,
    last_bucket: Option<u64>,
}

impl Compositor {
    /// Build a compositor over `timeline`, pulling layers from `store`.
    pub fn new(
        timeline: Timeline,
        mut store: LayerStore,
        canvas: Canvas,
        opts: CompositorOpts,
    ) -> ReelcastResult<Self> {
        let layout = RegionLayout::exact(canvas.height, opts.top_ratio, opts.bottom_ratio);
        let needs_static = layout.bottom > 0 || (layout.top > 0 && !opts.dynamic_top);
        let needs_color = opts.fade_policy == FadePolicy::ThroughColor;

        let first = if needs_static || needs_color {
            let asset = &timeline.assets()[0];
            Some(store.layer(0, &asset.source)?)
        } else {
            None
        };
        let (sx, sy) = THROUGH_COLOR_SAMPLE;
        let through_color = first
            .as_ref()
            .and_then(|l| l.straight_rgba_at(sx, sy))
            .map(PremulColor::from_straight)
            .unwrap_or(PremulColor::BLACK);

        tracing::debug!(
            top = layout.top,
            middle = layout.middle(),
            bottom = layout.bottom,
            dynamic_top = opts.dynamic_top,
            policy = ?opts.fade_policy,
            "compositor ready"
        );

        Ok(Self {
            timeline,
            store,
            canvas,
            layout,
            opts,
            first,
            through_color,
            memo: None,
            last_index: None,
            last_bucket: None,
        })
    }

    /// Timeline being composited.
    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    /// Canvas of every produced layer.
    pub fn canvas(&self) -> Canvas {
        self.canvas
    }

    /// Band split in use.
    pub fn layout(&self) -> RegionLayout {
        self.layout
    }

    /// Layer store counters.
    pub fn cache_stats(&self) -> CacheStats {
        self.store.stats()
    }

    /// Premultiplied foreground at `t_ms` (clamped into the timeline).
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn frame_at(&mut self, t_ms: u64) -> ReelcastResult<Arc<DecodedLayer>> {
        let t = self.timeline.clamp_ms(t_ms);
        if let Some((memo_t, layer)) = &self.memo
            && *memo_t == t
        {
            return Ok(Arc::clone(layer));
        }

        let layer = self.compose(t)?;
        self.memo = Some((t, Arc::clone(&layer)));
        Ok(layer)
    }

    fn compose(&mut self, t: u64) -> ReelcastResult<Arc<DecodedLayer>> {
        let located = self.timeline.locate(t);
        let i = located.current;
        if self.last_index != Some(i) {
            tracing::debug!(index = i, t_ms = t, "active asset changed");
            self.last_index = Some(i);
        }

        let cur = self.store.layer(i, &self.timeline.assets()[i].source)?;
        let blend = located.next.and_then(|n| {
            let w = self.timeline.window_after(i)?;
            w.weight_at(t).map(|num| (n, num, w.window_ms))
        });

        if blend.is_none() && !self.layout.is_split() {
            return Ok(cur);
        }

        let mut out = DecodedLayer::transparent(self.canvas);
        let middle = self.layout.middle_rows();
        match blend {
            Some((n, num, den)) => {
                self.log_progress(num, den);
                let next = self.store.layer(n, &self.timeline.assets()[n].source)?;
                match self.opts.fade_policy {
                    FadePolicy::Crossfade => blend_rows(&mut out, &cur, &next, middle, num, den),
                    FadePolicy::ThroughColor => fade_through_color_rows(
                        &mut out,
                        &cur,
                        &next,
                        self.through_color,
                        middle,
                        num,
                        den,
                    ),
                }
            }
            None => {
                self.last_bucket = None;
                copy_rows(&mut out, &cur, middle);
            }
        }

        let top_src = if self.opts.dynamic_top {
            &cur
        } else {
            self.first.as_ref().unwrap_or(&cur)
        };
        copy_rows(&mut out, top_src, self.layout.top_rows());
        let bottom_src = self.first.as_ref().unwrap_or(&cur);
        copy_rows(&mut out, bottom_src, self.layout.bottom_rows());

        Ok(Arc::new(out))
    }

    fn log_progress(&mut self, num: u64, den: u64) {
        let bucket = num * 10 / den;
        if self.last_bucket != Some(bucket) {
            tracing::debug!(progress_pct = bucket * 10, "crossfade progress");
            self.last_bucket = Some(bucket);
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/compose/compositor.rs"]
mod tests;
