//! The periodic batch analysis job.
//!
//! One synchronous run: fetch the full alert history, tally it, pull the
//! person detections back down, cluster them into identities, upload one
//! collage per identity and submit the report. A failed fetch aborts the
//! whole run and no partial report is submitted; per-record failures only
//! drop that record.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Timelike};
use image::ImageFormat;
use uuid::Uuid;

use vigil_core::cluster::{IdentityClusterer, PersonDetectionRecord};
use vigil_core::embedder::EmbeddingExtractor;
use vigil_core::types::BoundingBox;
use vigil_report::wire::{AnalysisReport, PersonGroupEntry, RemoteEvent};
use vigil_report::ReportClient;

use crate::collage;

/// Event title that feeds the identity clustering pass.
const PERSON_CLASS: &str = "person";

/// Execute one analysis run end to end.
pub fn run(
    client: &ReportClient,
    extractor: &mut dyn EmbeddingExtractor,
    clusterer: &IdentityClusterer,
) -> Result<()> {
    let events = client.fetch_events().context("fetch event history")?;
    if events.is_empty() {
        tracing::info!("no stored events; skipping analysis run");
        return Ok(());
    }
    tracing::info!(events = events.len(), "analysis run started");

    let mut object_counts: HashMap<String, usize> = HashMap::new();
    let mut hour_histogram = [0u32; 24];
    for event in &events {
        *object_counts.entry(event.title.clone()).or_insert(0) += 1;
        if let Some(hour) = event.created_date.as_deref().and_then(hour_of) {
            hour_histogram[hour as usize] += 1;
        }
    }

    let records = collect_person_records(client, &events);
    let groups = clusterer
        .group(extractor, &records)
        .context("identity clustering")?;

    let mut people_data = Vec::new();
    for (i, group) in groups.iter().enumerate() {
        let id = i + 1;
        let canvas = collage::assemble(&group.crops);
        let mut png = Vec::new();
        canvas
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .context("encode collage")?;

        let filename = format!("group_{}_{}.png", id, Uuid::new_v4());
        match client.upload_plot(&filename, png) {
            Ok(url) => people_data.push(PersonGroupEntry {
                id,
                count: group.len(),
                url,
            }),
            Err(err) => {
                tracing::warn!(group = id, error = %err, "collage upload failed; group omitted from report");
            }
        }
    }

    let report = AnalysisReport {
        summary: build_summary(events.len(), groups.len(), &object_counts, &hour_histogram),
        plot_urls: Vec::new(),
        people_data,
    };
    client
        .submit_analysis(&report)
        .context("submit analysis report")?;

    Ok(())
}

/// Pull the image back down for every person event; failures drop that
/// record only.
fn collect_person_records(
    client: &ReportClient,
    events: &[RemoteEvent],
) -> Vec<PersonDetectionRecord> {
    let mut records = Vec::new();
    for event in events {
        if event.title != PERSON_CLASS {
            continue;
        }
        let Some(url) = event.image.as_deref() else {
            continue;
        };
        let image = match client.download_image(url) {
            Ok(image) => Arc::new(image),
            Err(err) => {
                tracing::warn!(url, error = %err, "image download failed; record dropped");
                continue;
            }
        };
        let bbox = event
            .bbox
            .as_deref()
            .and_then(BoundingBox::parse_csv)
            .unwrap_or(BoundingBox::ZERO);
        records.push(PersonDetectionRecord { image, bbox });
    }
    tracing::debug!(records = records.len(), "person records collected");
    records
}

/// Hour-of-day for an ISO-8601 timestamp, `None` if it does not parse.
fn hour_of(date: &str) -> Option<u32> {
    DateTime::parse_from_rfc3339(date).ok().map(|dt| dt.hour())
}

fn build_summary(
    total_events: usize,
    unique_people: usize,
    object_counts: &HashMap<String, usize>,
    hour_histogram: &[u32; 24],
) -> String {
    let top = object_counts
        .iter()
        .max_by_key(|(name, count)| (*count, std::cmp::Reverse(name.as_str())))
        .map(|(name, _)| name.as_str())
        .unwrap_or("None");

    let mut summary = format!(
        "Analysis Report\nTotal Events: {total_events}\nUnique People: {unique_people}\nTop Object: {top}"
    );
    if let Some(hour) = peak_hour(hour_histogram) {
        summary.push_str(&format!("\nPeak Hour: {hour:02}:00"));
    }
    summary
}

/// Busiest hour, or `None` when no event carried a parseable timestamp.
fn peak_hour(histogram: &[u32; 24]) -> Option<usize> {
    let (hour, &count) = histogram
        .iter()
        .enumerate()
        .max_by_key(|&(_, &count)| count)?;
    (count > 0).then_some(hour)
}
