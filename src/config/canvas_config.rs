use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CanvasConfig {
    /// Lower zoom limit enforced by every zoom mutator
    pub min_zoom: f64,

    /// Upper zoom limit enforced by every zoom mutator
    pub max_zoom: f64,

    /// Additive zoom change per keyboard step
    pub zoom_step: f64,

    /// Zoom change per wheel pixel (applied to the negated wheel delta)
    pub wheel_zoom_sensitivity: f64,

    /// Padding around the content when fitting it to the container
    pub fit_padding: f64,

    /// Maximum number of undo entries kept
    pub max_history: usize,

    /// When false, every task is reported visible
    pub culling_enabled: bool,

    pub culling_min_buffer: f64,
    pub culling_max_buffer: f64,

    /// Default radius for point queries against the spatial index
    pub near_point_radius: f64,

    pub snap_to_grid: bool,
    pub grid_size: f64,

    /// Distance between the arrow tip and the edge end point
    pub arrow_distance: f64,
    pub arrow_size: f64,

    pub error_message_ms: u64,
    pub warning_message_ms: u64,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            min_zoom: 0.1,
            max_zoom: 5.0,
            zoom_step: 0.1,
            wheel_zoom_sensitivity: 0.001,
            fit_padding: 100.0,
            max_history: 50,
            culling_enabled: true,
            culling_min_buffer: 1000.0,
            culling_max_buffer: 2000.0,
            near_point_radius: 50.0,
            snap_to_grid: false,
            grid_size: 20.0,
            arrow_distance: 20.0,
            arrow_size: 8.0,
            error_message_ms: 3000,
            warning_message_ms: 5000,
        }
    }
}

impl CanvasConfig {
    /// Load configuration from a TOML file, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No canvas config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid canvas config in {}", path.display()))?;
        config.validate()?;
        info!(path = %path.display(), "Loaded canvas config");
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.min_zoom > 0.0 && self.min_zoom <= self.max_zoom) {
            anyhow::bail!("min_zoom must be positive and not exceed max_zoom");
        }
        if self.culling_min_buffer > self.culling_max_buffer {
            anyhow::bail!("culling_min_buffer cannot exceed culling_max_buffer");
        }
        if !(15.0..=20.0).contains(&self.arrow_distance) {
            anyhow::bail!("arrow_distance must be between 15 and 20");
        }
        if self.grid_size <= 0.0 {
            anyhow::bail!("grid_size must be positive");
        }
        Ok(())
    }

    pub fn clamp_zoom(&self, zoom: f64) -> f64 {
        zoom.clamp(self.min_zoom, self.max_zoom)
    }
}
