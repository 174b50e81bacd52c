use std::path::{Path, PathBuf};

use serde::Deserialize;
use vigil_core::presence::PolicyTable;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Base URL of the reporting backend.
    pub base_url: String,
    /// Backend credentials for token auth.
    pub username: String,
    pub password: String,
    /// Path to the embedding ONNX model.
    pub model_path: PathBuf,
    /// Path to the class-policy TOML file.
    pub policy_path: PathBuf,
    /// Seed-similarity threshold for identity clustering.
    pub similarity_threshold: f32,
    /// Timeout for each blocking call to the backend.
    pub http_timeout_secs: u64,
    /// Seconds between batch analysis runs.
    pub analysis_interval_secs: u64,
    /// Deferred-alert buffer cap; 0 keeps the buffer unbounded.
    pub buffer_cap: usize,
}

impl Config {
    /// Load configuration from `VIGIL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("VIGIL_BASE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8000".to_string()),
            username: std::env::var("VIGIL_USERNAME").unwrap_or_default(),
            password: std::env::var("VIGIL_PASSWORD").unwrap_or_default(),
            model_path: std::env::var("VIGIL_MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("models/resnet18.onnx")),
            policy_path: std::env::var("VIGIL_POLICY_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("policy.toml")),
            similarity_threshold: env_f32("VIGIL_SIMILARITY_THRESHOLD", 0.80),
            http_timeout_secs: env_u64("VIGIL_HTTP_TIMEOUT_SECS", 5),
            analysis_interval_secs: env_u64("VIGIL_ANALYSIS_INTERVAL_SECS", 3600),
            buffer_cap: env_usize("VIGIL_BUFFER_CAP", 0),
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Class-policy lists, read from TOML and resolved once into a
/// [`PolicyTable`]. A missing file falls back to the built-in deployment
/// defaults.
#[derive(Debug, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub suppressed: Vec<String>,
    #[serde(default)]
    pub deferred: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            suppressed: [
                "chair",
                "tv",
                "handbag",
                "suitcase",
                "backpack",
                "dining table",
                "sink",
                "microwave",
                "umbrella",
                "bowl",
                "refrigerator",
                "bottle",
                "cup",
                "oven",
                "couch",
                "bed",
                "potted plant",
                "cake",
                "remote",
                "mouse",
                "book",
                "laptop",
                "knife",
                "orange",
                "apple",
                "wine glass",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            deferred: ["cat", "dog", "bird"].iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl PolicyConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "policy file not found; using built-in defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    pub fn into_table(self) -> PolicyTable {
        PolicyTable::new(&self.suppressed, &self.deferred)
    }
}
