//! JSON-lines detection ingestion.
//!
//! The upstream detector process writes one JSON object per line on our
//! stdin: first a header naming the class vocabulary, then one line per
//! frame with the count vector, optional per-object details, and the path
//! of the frame image. Malformed lines are logged and skipped; the stream
//! itself failing ends ingestion.

use std::io::BufRead;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;

use vigil_core::attributes;
use vigil_core::types::{BoundingBox, ObjectDetail};

use crate::engine::{EngineHandle, FrameSnapshot};

/// First line of the stream: the detector's class vocabulary, in count
/// vector order.
#[derive(Debug, Deserialize)]
pub struct IngestHeader {
    pub classes: Vec<String>,
}

/// One frame line.
#[derive(Debug, Deserialize)]
pub struct FrameLine {
    pub counts: Vec<u32>,
    #[serde(default)]
    pub objects: Vec<ObjectDetail>,
    /// Path of the frame image on local disk.
    pub image: String,
}

/// Read the vocabulary header, skipping blank lines.
pub fn read_header(reader: &mut impl BufRead) -> Result<IngestHeader> {
    for line in reader.lines() {
        let line = line.context("read ingest header")?;
        if line.trim().is_empty() {
            continue;
        }
        let header: IngestHeader =
            serde_json::from_str(&line).context("parse ingest header")?;
        return Ok(header);
    }
    anyhow::bail!("ingest stream closed before a header arrived");
}

/// Consume frame lines until the stream ends, feeding the engine.
pub fn run(reader: impl BufRead, engine: &EngineHandle) -> Result<()> {
    let mut frames = 0u64;
    for line in reader.lines() {
        let line = line.context("read ingest line")?;
        if line.trim().is_empty() {
            continue;
        }

        let parsed: FrameLine = match serde_json::from_str(&line) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::warn!(error = %err, "malformed frame line; skipping");
                continue;
            }
        };

        let image = match image::open(&parsed.image) {
            Ok(image) => Arc::new(image.to_rgb8()),
            Err(err) => {
                tracing::warn!(path = %parsed.image, error = %err, "frame image unreadable; skipping");
                continue;
            }
        };

        let mut objects = parsed.objects;
        attach_derived(&mut objects, &image);

        engine.submit_blocking(FrameSnapshot {
            counts: parsed.counts,
            objects,
            image,
        })?;
        frames += 1;
    }

    tracing::info!(frames, "ingest stream ended");
    Ok(())
}

/// Fill in missing color/size attributes from the frame itself.
///
/// Only details with a parseable bbox can be enriched; everything else is
/// left as delivered.
fn attach_derived(objects: &mut [ObjectDetail], image: &image::RgbImage) {
    for object in objects {
        let Some(bbox) = object.bbox.as_deref().and_then(BoundingBox::parse_csv) else {
            continue;
        };
        if object.size.is_none() {
            object.size = Some(attributes::relative_size(
                &bbox,
                image.width(),
                image.height(),
            ));
        }
        if object.color.is_none() {
            if let Some((x, y, w, h)) = bbox.clamp_to(image.width(), image.height()) {
                let crop = image::imageops::crop_imm(image, x, y, w, h).to_image();
                object.color = Some(attributes::dominant_color(&crop).to_string());
            }
        }
    }
}
