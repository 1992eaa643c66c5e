//! Viewer configuration
//!
//! Nests the cache, window, warm-up and gesture settings. Loadable from a
//! JSON file (missing keys keep their defaults) and overlaid with
//! environment variables.

use pageflow_cache::config::env_usize;
use pageflow_cache::{CacheConfig, ConfigError};
use pageflow_input::{GestureConfig, ZoomBounds};
use pageflow_render::RenderLayout;
use pageflow_scheduler::WindowConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::warmup::WarmupConfig;

/// Zoom range in percent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoomConfig {
    /// Zoom a document opens at; also the warm tier's render zoom
    pub base: f32,
    pub floor: f32,
    pub ceiling: f32,
}

impl Default for ZoomConfig {
    fn default() -> Self {
        Self { base: 100.0, floor: 50.0, ceiling: 220.0 }
    }
}

impl ZoomConfig {
    /// Bounds `[max(floor, base), ceiling]`
    pub fn bounds(&self) -> ZoomBounds {
        ZoomBounds::new(self.base, self.floor, self.ceiling)
    }
}

/// Complete viewer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub cache: CacheConfig,
    pub window: WindowConfig,
    pub warmup: WarmupConfig,
    pub gestures: GestureConfig,
    pub zoom: ZoomConfig,
    /// Lower clamp of the fit-to-width scale
    pub fit_scale_min: f32,
    /// Upper clamp of the fit-to-width scale
    pub fit_scale_max: f32,
    /// Vertical gap between pages in layout pixels
    pub page_gap_px: f32,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            window: WindowConfig::default(),
            warmup: WarmupConfig::default(),
            gestures: GestureConfig::default(),
            zoom: ZoomConfig::default(),
            fit_scale_min: 0.5,
            fit_scale_max: 2.0,
            page_gap_px: 16.0,
        }
    }
}

impl ViewerConfig {
    /// Sets the cache configuration.
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Sets the warm-up configuration.
    pub fn with_warmup(mut self, warmup: WarmupConfig) -> Self {
        self.warmup = warmup;
        self
    }

    /// Layout at the base zoom with no viewport measured yet
    pub fn initial_layout(&self) -> RenderLayout {
        RenderLayout {
            zoom: self.zoom.base,
            base_zoom: self.zoom.base,
            fit_scale_min: self.fit_scale_min,
            fit_scale_max: self.fit_scale_max,
            ..RenderLayout::default()
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// On top of the cache variables read by [`CacheConfig::apply_env`]:
    /// - `PAGEFLOW_EAGER_PAGES`: pages warmed before the viewer is ready (default: 20)
    /// - `PAGEFLOW_WARM_BATCH`: pages warmed per idle slot (default: 3)
    /// - `PAGEFLOW_IDLE_TIMEOUT_MS`: idle slot timeout fallback (default: 200)
    /// - `PAGEFLOW_WINDOW_RADIUS`: pages mounted around the current page (default: 8)
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Overlays environment variables onto an existing configuration.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.cache.apply_env()?;

        if let Some(value) = env_usize("PAGEFLOW_EAGER_PAGES")? {
            self.warmup.eager_pages = to_u32("PAGEFLOW_EAGER_PAGES", value)?;
        }
        if let Some(value) = env_usize("PAGEFLOW_WARM_BATCH")? {
            self.warmup.batch_size = to_u32("PAGEFLOW_WARM_BATCH", value)?;
        }
        if let Some(value) = env_usize("PAGEFLOW_IDLE_TIMEOUT_MS")? {
            self.warmup.idle_timeout_ms = value as u64;
        }
        if let Some(value) = env_usize("PAGEFLOW_WINDOW_RADIUS")? {
            self.window.radius = to_u32("PAGEFLOW_WINDOW_RADIUS", value)?;
        }
        Ok(())
    }

    /// Loads configuration from a JSON file.
    ///
    /// ```json
    /// { "warmup": { "eager_pages": 10 }, "zoom": { "ceiling": 300.0 } }
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Saves configuration to a JSON file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json)?;
        Ok(())
    }
}

fn to_u32(name: &str, value: usize) -> Result<u32, ConfigError> {
    u32::try_from(value).map_err(|_| ConfigError::InvalidValue(name.to_string()))
}
