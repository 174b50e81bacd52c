use std::sync::Arc;

use chrono::{DateTime, Local};
use image::RgbImage;
use serde::Deserialize;

/// Axis-aligned bounding box in absolute pixel coordinates, `x1 < x2`, `y1 < y2`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    /// The degenerate zero box, used when a wire bbox cannot be recovered.
    pub const ZERO: BoundingBox = BoundingBox {
        x1: 0.0,
        y1: 0.0,
        x2: 0.0,
        y2: 0.0,
    };

    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Parse the `"x1,y1,x2,y2"` wire form. Returns `None` for anything
    /// that does not yield four finite numbers.
    pub fn parse_csv(s: &str) -> Option<Self> {
        let mut parts = s.split(',').map(|p| p.trim().parse::<f32>());
        let x1 = parts.next()?.ok()?;
        let y1 = parts.next()?.ok()?;
        let x2 = parts.next()?.ok()?;
        let y2 = parts.next()?.ok()?;
        if parts.next().is_some() {
            return None;
        }
        if [x1, y1, x2, y2].iter().any(|v| !v.is_finite()) {
            return None;
        }
        Some(Self { x1, y1, x2, y2 })
    }

    /// Render back to the `"x1,y1,x2,y2"` wire form.
    pub fn to_csv(&self) -> String {
        format!("{},{},{},{}", self.x1, self.y1, self.x2, self.y2)
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// Clamp to an image of `img_w` × `img_h` pixels and convert to integer
    /// crop coordinates `(x, y, width, height)`. Returns `None` when nothing
    /// of the box lies inside the image.
    pub fn clamp_to(&self, img_w: u32, img_h: u32) -> Option<(u32, u32, u32, u32)> {
        let x1 = self.x1.max(0.0) as u32;
        let y1 = self.y1.max(0.0) as u32;
        let x2 = (self.x2.max(0.0) as u32).min(img_w);
        let y2 = (self.y2.max(0.0) as u32).min(img_h);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some((x1, y1, x2 - x1, y2 - y1))
    }
}

/// Per-object metadata record attached to a frame by the upstream detector.
///
/// `bbox` stays in its CSV wire form until an event actually needs it;
/// malformed boxes degrade to an event without one.
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectDetail {
    pub name: String,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub bbox: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub size: Option<f32>,
}

/// One "appeared" signal: a class transitioned from absent to present.
///
/// Owned by the router until dispatched or buffered. Holds a shared
/// reference to the frame it was observed in so the outbound alert can
/// attach the image.
#[derive(Debug, Clone)]
pub struct DetectionEvent {
    pub class: String,
    pub timestamp: DateTime<Local>,
    pub confidence: Option<f32>,
    pub bbox: Option<BoundingBox>,
    pub color: Option<String>,
    pub size_pct: Option<f32>,
    pub frame: Arc<RgbImage>,
}

impl DetectionEvent {
    /// Human-readable alert text: what appeared, when, and how it looked.
    pub fn description(&self) -> String {
        let mut text = format!(
            "Detected {} at {}.",
            self.class,
            self.timestamp.format("%H:%M:%S")
        );
        if self.color.is_some() || self.size_pct.is_some() {
            text.push_str(&format!(
                "\nColor: {}, Size: {}% of screen",
                self.color.as_deref().unwrap_or("Unknown"),
                self.size_pct.unwrap_or(0.0)
            ));
        }
        text
    }
}

/// Fixed-length appearance feature vector produced by the embedding model.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Cosine similarity in [-1, 1]. Zero-norm vectors compare as 0.0.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 {
            dot / denom
        } else {
            0.0
        }
    }
}
