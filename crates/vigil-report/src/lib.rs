//! vigil-report — HTTP client for the Vigil reporting backend.
//!
//! Thin I/O boundary around the backend collaborator: token auth, alert
//! upload with image attachment, event listing, image download, collage
//! upload, and analysis-report submission. Implements `vigil-core`'s
//! `AlertSink` so the router can dispatch through it.

pub mod client;
pub mod wire;

pub use client::{ReportClient, ReportError};
pub use wire::{AnalysisReport, PersonGroupEntry, RemoteEvent};
