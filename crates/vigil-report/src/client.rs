//! Blocking HTTP client for the backend reporting collaborator.
//!
//! Owns transport, wire format and token authentication. Every call
//! blocks with the configured timeout and never retries; retry policy, if
//! any, belongs to the caller.

use std::io::Cursor;
use std::time::Duration;

use image::imageops::{self, FilterType};
use image::{ImageFormat, RgbImage};
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::Client;
use reqwest::header::AUTHORIZATION;
use thiserror::Error;
use uuid::Uuid;

use vigil_core::router::AlertSink;
use vigil_core::types::DetectionEvent;

use crate::wire::{AnalysisReport, RemoteEvent, TokenResponse, UploadResponse};

/// Alert frames are normalized to this size before upload.
const ALERT_IMAGE_WIDTH: u32 = 640;
const ALERT_IMAGE_HEIGHT: u32 = 480;
/// Backend author id attached to uploaded alerts.
const AUTHOR_ID: &str = "1";

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status} from {endpoint}")]
    Status { endpoint: String, status: u16 },
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("image: {0}")]
    Image(#[from] image::ImageError),
}

/// Client for the reporting backend. Cheap to clone; clones share the
/// connection pool and the token obtained before cloning.
#[derive(Clone)]
pub struct ReportClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl ReportClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ReportError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Obtain and store an API token for subsequent alert calls.
    pub fn authenticate(&mut self, username: &str, password: &str) -> Result<(), ReportError> {
        let endpoint = format!("{}/api-token-auth/", self.base_url);
        let response = self
            .http
            .post(&endpoint)
            .form(&[("username", username), ("password", password)])
            .send()?;
        if !response.status().is_success() {
            return Err(status_error(&endpoint, response.status().as_u16()));
        }
        let body: TokenResponse = response.json()?;
        self.token = Some(body.token);
        tracing::info!("authenticated against reporting backend");
        Ok(())
    }

    fn auth_header(&self) -> Result<String, ReportError> {
        self.token
            .as_deref()
            .map(|t| format!("Token {t}"))
            .ok_or(ReportError::NotAuthenticated)
    }

    /// Upload one alert: form fields plus the event frame as a PNG
    /// attachment, normalized to 640×480.
    pub fn send_alert(&self, event: &DetectionEvent) -> Result<(), ReportError> {
        let auth = self.auth_header()?;
        let endpoint = format!("{}/api_root/Post/", self.base_url);

        let resized = imageops::resize(
            event.frame.as_ref(),
            ALERT_IMAGE_WIDTH,
            ALERT_IMAGE_HEIGHT,
            FilterType::Triangle,
        );
        let mut png = Vec::new();
        resized.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

        let created = event.timestamp.to_rfc3339();
        let form = Form::new()
            .text("title", event.class.clone())
            .text("text", event.description())
            .text("created_date", created.clone())
            .text("published_date", created)
            .text("author", AUTHOR_ID)
            .text(
                "confidence",
                event.confidence.map(|c| c.to_string()).unwrap_or_default(),
            )
            .text(
                "bbox",
                event.bbox.map(|b| b.to_csv()).unwrap_or_default(),
            )
            .part(
                "image",
                Part::bytes(png)
                    .file_name(format!("{}.png", Uuid::new_v4()))
                    .mime_str("image/png")?,
            );

        let response = self
            .http
            .post(&endpoint)
            .header(AUTHORIZATION, auth)
            .multipart(form)
            .send()?;
        if response.status().as_u16() != 201 {
            return Err(status_error(&endpoint, response.status().as_u16()));
        }
        tracing::debug!(class = %event.class, "alert uploaded");
        Ok(())
    }

    /// List every stored alert. Input to the batch analysis job; a failure
    /// here aborts that run.
    pub fn fetch_events(&self) -> Result<Vec<RemoteEvent>, ReportError> {
        let auth = self.auth_header()?;
        let endpoint = format!("{}/api_root/Post/", self.base_url);
        let response = self.http.get(&endpoint).header(AUTHORIZATION, auth).send()?;
        if !response.status().is_success() {
            return Err(status_error(&endpoint, response.status().as_u16()));
        }
        Ok(response.json()?)
    }

    /// Download and decode a stored frame image.
    pub fn download_image(&self, url: &str) -> Result<RgbImage, ReportError> {
        let response = self.http.get(url).send()?;
        if !response.status().is_success() {
            return Err(status_error(url, response.status().as_u16()));
        }
        let bytes = response.bytes()?;
        Ok(image::load_from_memory(&bytes)?.to_rgb8())
    }

    /// Upload a rendered image (collage) and return its served URL.
    pub fn upload_plot(&self, filename: &str, png: Vec<u8>) -> Result<String, ReportError> {
        let endpoint = format!("{}/api_root/upload_plot/", self.base_url);
        let form = Form::new().part(
            "file",
            Part::bytes(png)
                .file_name(filename.to_string())
                .mime_str("image/png")?,
        );
        let response = self.http.post(&endpoint).multipart(form).send()?;
        if response.status().as_u16() != 201 {
            return Err(status_error(&endpoint, response.status().as_u16()));
        }
        let body: UploadResponse = response.json()?;
        Ok(body.url)
    }

    /// Submit the final batch analysis report.
    pub fn submit_analysis(&self, report: &AnalysisReport) -> Result<(), ReportError> {
        let endpoint = format!("{}/api_root/analysis/", self.base_url);
        let response = self.http.post(&endpoint).json(report).send()?;
        if !response.status().is_success() {
            return Err(status_error(&endpoint, response.status().as_u16()));
        }
        tracing::info!(
            groups = report.people_data.len(),
            "analysis report submitted"
        );
        Ok(())
    }
}

fn status_error(endpoint: &str, status: u16) -> ReportError {
    ReportError::Status {
        endpoint: endpoint.to_string(),
        status,
    }
}

impl AlertSink for ReportClient {
    fn send(
        &mut self,
        event: &DetectionEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.send_alert(event).map_err(Into::into)
    }
}
