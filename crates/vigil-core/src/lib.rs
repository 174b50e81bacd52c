//! vigil-core — Presence detection, alert routing, and identity clustering.
//!
//! The algorithmic half of the Vigil edge pipeline: rising-edge presence
//! tracking over per-frame detection counts, priority-based alert routing
//! with piggybacked delivery, and greedy seed-based identity clustering
//! over appearance embeddings extracted via ONNX Runtime.

pub mod attributes;
pub mod cluster;
pub mod embedder;
pub mod presence;
pub mod router;
pub mod types;

pub use cluster::{IdentityClusterer, IdentityGroup, PersonDetectionRecord};
pub use embedder::{EmbeddingExtractor, OnnxEmbedder};
pub use presence::{ClassPolicy, PolicyTable, PresenceTracker};
pub use router::{AlertRouter, AlertSink, NotificationBuffer};
pub use types::{BoundingBox, DetectionEvent, Embedding, ObjectDetail};
