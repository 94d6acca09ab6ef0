//! HTTP client for the two upstream hosts: the sensor/camera device and the
//! analysis backend.

use anyhow::{Context, Result};
use axum::body::Bytes;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use std::time::Duration;

use crate::config::UpstreamConfig;

/// Multipart field name both the browser and the backend use for photos.
pub const IMAGE_FIELD: &str = "image";
/// Filename sent upstream when the browser didn't provide one.
pub const DEFAULT_IMAGE_NAME: &str = "image.jpg";

/// A photo received from the browser, ready to forward.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

#[derive(Clone)]
pub struct Upstream {
    http: reqwest::Client,
    device_url: String,
    analysis_url: String,
}

impl Upstream {
    pub fn new(cfg: &UpstreamConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = cfg.timeout_sec {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder
            .build()
            .context("failed to build upstream http client")?;

        Ok(Self {
            http,
            device_url: cfg.device_url.trim_end_matches('/').to_string(),
            analysis_url: cfg.analysis_url.trim_end_matches('/').to_string(),
        })
    }

    fn device(&self, path: &str) -> String {
        format!("{}{path}", self.device_url)
    }

    fn analysis(&self, path: &str) -> String {
        format!("{}{path}", self.analysis_url)
    }

    // -- Sensor device ------------------------------------------------------

    /// Fresh JPEG frame from the device camera.
    pub async fn fetch_photo(&self) -> reqwest::Result<Bytes> {
        self.http
            .get(self.device("/photo"))
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await
    }

    /// Live readings from the device's root status endpoint.
    pub async fn fetch_status(&self) -> reqwest::Result<Value> {
        self.get_json(self.device("/")).await
    }

    // -- Analysis backend ---------------------------------------------------

    /// Recent analyzed readings, newest first.
    pub async fn fetch_graph(&self) -> reqwest::Result<Value> {
        self.get_json(self.analysis("/graph")).await
    }

    /// Submit an uploaded photo for analysis.
    pub async fn submit_upload(&self, image: ImageUpload) -> reqwest::Result<Value> {
        let mut part = Part::bytes(image.data.to_vec()).file_name(image.file_name);
        if let Some(content_type) = image.content_type.as_deref() {
            part = part.mime_str(content_type)?;
        }
        let form = Form::new().part(IMAGE_FIELD, part);

        self.http
            .post(self.analysis("/submit2"))
            .multipart(form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }

    /// Ask the backend to analyze the device's latest camera frame.
    pub async fn submit_capture(&self) -> reqwest::Result<Value> {
        self.get_json(self.analysis("/submit")).await
    }

    async fn get_json(&self, url: String) -> reqwest::Result<Value> {
        self.http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}
