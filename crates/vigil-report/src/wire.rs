//! Wire types for the backend reporting collaborator.

use serde::{Deserialize, Serialize};

fn unknown() -> String {
    "unknown".to_string()
}

/// One stored alert as listed by the backend. Parsed leniently: anything
/// missing degrades to a default rather than failing the batch.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteEvent {
    #[serde(default = "unknown")]
    pub title: String,
    #[serde(default)]
    pub created_date: Option<String>,
    /// URL of the stored frame image.
    #[serde(default)]
    pub image: Option<String>,
    /// Bounding box in `"x1,y1,x2,y2"` form.
    #[serde(default)]
    pub bbox: Option<String>,
}

/// Response to a token authentication request.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

/// Response to a plot/collage upload: where the file is now served from.
#[derive(Debug, Deserialize)]
pub struct UploadResponse {
    pub url: String,
}

/// One identity group in the analysis report.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PersonGroupEntry {
    /// Ordinal id of the group within this run, starting at 1.
    pub id: usize,
    /// Number of member detections.
    pub count: usize,
    /// URL of the uploaded collage image.
    pub url: String,
}

/// The batch analysis report submitted after a clustering run.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub summary: String,
    pub plot_urls: Vec<String>,
    pub people_data: Vec<PersonGroupEntry>,
}
