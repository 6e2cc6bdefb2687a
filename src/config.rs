//! Application-level configuration loading: handicap charts, sync buffering and fixtures.

use std::{env, fs, io::ErrorKind, path::PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use crate::state::handicap::{ChartRow, HandicapChart, HandicapCharts};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "POOL_SCORING_CONFIG_PATH";
/// Events buffered per match before a slow subscriber is asked to resync.
const DEFAULT_SSE_CAPACITY: usize = 32;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    charts: HandicapCharts,
    sse_capacity: usize,
    seed_path: Option<PathBuf>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|err| {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to parse config; falling back to defaults"
                );
                Self::default()
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse a configuration document. Invalid chart overrides are dropped
    /// in favour of the built-in chart for that format.
    pub fn from_json(contents: &str) -> Result<Self, serde_json::Error> {
        let raw = serde_json::from_str::<RawConfig>(contents)?;
        let config: Self = raw.into();
        info!(
            sse_capacity = config.sse_capacity,
            seed = config.seed_path.is_some(),
            "loaded configuration"
        );
        Ok(config)
    }

    /// Handicap charts used to resolve match thresholds.
    pub fn charts(&self) -> &HandicapCharts {
        &self.charts
    }

    /// Per-match broadcast capacity.
    pub fn sse_capacity(&self) -> usize {
        self.sse_capacity
    }

    /// Fixture file to load into the in-memory store at startup.
    pub fn seed_path(&self) -> Option<&PathBuf> {
        self.seed_path.as_ref()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            charts: HandicapCharts::default(),
            sse_capacity: DEFAULT_SSE_CAPACITY,
            seed_path: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde(default)]
    handicap_charts: RawCharts,
    #[serde(default)]
    sse_capacity: Option<usize>,
    #[serde(default)]
    seed_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCharts {
    #[serde(rename = "3v3", default)]
    three_v_three: Option<Vec<ChartRow>>,
    #[serde(rename = "5v5", default)]
    five_v_five: Option<Vec<ChartRow>>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let three_v_three = chart_or_default(
            "3v3",
            value.handicap_charts.three_v_three,
            HandicapChart::default_three_v_three,
        );
        let five_v_five = chart_or_default(
            "5v5",
            value.handicap_charts.five_v_five,
            HandicapChart::default_five_v_five,
        );

        Self {
            charts: HandicapCharts::new(three_v_three, five_v_five),
            sse_capacity: value
                .sse_capacity
                .filter(|capacity| *capacity > 0)
                .unwrap_or(DEFAULT_SSE_CAPACITY),
            seed_path: value
                .seed_path
                .filter(|path| !path.as_os_str().is_empty()),
        }
    }
}

fn chart_or_default(
    format: &'static str,
    rows: Option<Vec<ChartRow>>,
    fallback: fn() -> HandicapChart,
) -> HandicapChart {
    let Some(rows) = rows else {
        return fallback();
    };

    match HandicapChart::new(rows) {
        Ok(chart) => {
            info!(format, rows = chart.rows().len(), "using configured handicap chart");
            chart
        }
        Err(err) => {
            warn!(
                format,
                error = %err,
                "invalid handicap chart in config; using built-in chart"
            );
            fallback()
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
