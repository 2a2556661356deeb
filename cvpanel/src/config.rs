use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use directories_next::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::core::error::{PanelError, Result};
use crate::geometry::Rect;
use crate::persistence::storage::write_atomic;
use crate::render::scheduler::RateConfig;

pub const SETTINGS_VERSION: &str = "1";
pub const SETTINGS_FILE: &str = "panel_settings.json";
/// Upper bound for every loop rate, bursting included.
pub const MAX_FPS: f32 = 1000.0;

pub fn config_dir() -> Option<PathBuf> {
    BaseDirs::new().map(|base| base.config_dir().join("CvPanel"))
}

pub fn default_storage_dir() -> String {
    BaseDirs::new()
        .map(|base| base.data_local_dir().join("CvPanel"))
        .unwrap_or_else(|| PathBuf::from(".cvpanel"))
        .to_string_lossy()
        .into_owned()
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PanelSettings {
    pub version: String,
    pub fps_low: f32,
    pub fps_normal: f32,
    pub fps_high: f32,
    /// Scales the fastest tier while bursting. 1.0 keeps burst at that
    /// tier.
    pub burst_multiplier: f32,
    pub burst_grace_ms: u64,
    pub worker_hz: f32,
    pub queue_backlog_threshold: usize,
    /// Consecutive empty ticks tolerated from a continuous page before it is
    /// switched to full-frame rendering.
    pub stalled_tick_limit: u32,
    pub autosave_interval_ms: u64,
    pub shutdown_timeout_ms: u64,
    pub storage_dir: String,
    pub midi_input_port: Option<String>,
    pub screen_width: u32,
    pub screen_height: u32,
}

impl Default for PanelSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION.to_string(),
            fps_low: 10.0,
            fps_normal: 30.0,
            fps_high: 60.0,
            burst_multiplier: 1.0,
            burst_grace_ms: 400,
            worker_hz: 100.0,
            queue_backlog_threshold: 256,
            stalled_tick_limit: 30,
            autosave_interval_ms: 2000,
            shutdown_timeout_ms: 500,
            storage_dir: default_storage_dir(),
            midi_input_port: None,
            screen_width: 800,
            screen_height: 480,
        }
    }
}

impl PanelSettings {
    pub fn rates(&self) -> RateConfig {
        RateConfig {
            low: self.fps_low,
            normal: self.fps_normal,
            high: self.fps_high,
            burst_multiplier: self.burst_multiplier,
        }
    }

    pub fn screen(&self) -> Rect {
        Rect::from_size(self.screen_width, self.screen_height)
    }

    pub fn storage_path(&self) -> PathBuf {
        PathBuf::from(&self.storage_dir)
    }

    /// Rejects values that would stall or spin the loops.
    pub fn validate(&self) -> Result<()> {
        let rates = [self.fps_low, self.fps_normal, self.fps_high];
        if rates.iter().any(|fps| !fps.is_finite() || *fps <= 0.0) {
            return Err(PanelError::Configuration(format!(
                "frame rates must be positive, got {:?}",
                rates
            )));
        }
        if !(self.worker_hz.is_finite() && self.worker_hz > 0.0) {
            return Err(PanelError::Configuration(format!(
                "worker_hz must be positive, got {}",
                self.worker_hz
            )));
        }
        let ordered =
            self.fps_low <= self.fps_normal && self.fps_normal <= self.fps_high;
        if !ordered {
            return Err(PanelError::Configuration(format!(
                "frame rates must satisfy low <= normal <= high, got {:?}",
                rates
            )));
        }
        let multiplier = self.burst_multiplier;
        if !(multiplier.is_finite() && multiplier >= 1.0) {
            return Err(PanelError::Configuration(format!(
                "burst_multiplier must be >= 1.0, got {}",
                multiplier
            )));
        }
        let burst = self.rates().burst_fps();
        if burst > MAX_FPS || self.worker_hz > MAX_FPS {
            return Err(PanelError::Configuration(format!(
                "rates are capped at {} Hz, got burst {} and worker {}",
                MAX_FPS, burst, self.worker_hz
            )));
        }
        if self.screen_width == 0 || self.screen_height == 0 {
            return Err(PanelError::Configuration(
                "screen size must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn settings_path(dir: &Path) -> PathBuf {
    dir.join(SETTINGS_FILE)
}

pub fn load_settings(dir: &Path) -> Result<PanelSettings> {
    let json = fs::read_to_string(settings_path(dir))?;
    let settings = serde_json::from_str::<PanelSettings>(&json)?;
    settings.validate()?;
    Ok(settings)
}

pub fn load_settings_if_exists(dir: &Path) -> Result<Option<PanelSettings>> {
    match load_settings(dir) {
        Ok(settings) => Ok(Some(settings)),
        Err(PanelError::Io(e)) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

pub fn save_settings(dir: &Path, settings: &PanelSettings) -> Result<PathBuf> {
    let json = serde_json::to_string_pretty(settings)?;
    let path = settings_path(dir);
    write_atomic(&path, json.as_bytes())?;
    Ok(path)
}
