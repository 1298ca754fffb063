use crate::error::ClientError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// One image record as returned by the ingest API
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageEntry {
    pub id: String,
    pub user_id: String,
    pub original_name: String,
    pub file_name: String,
    pub file_size: i64,
    pub file_type: String,
    pub storage_key: String,
    pub access_url: String,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub status: String,
    pub rejection_reason: Option<String>,
    pub similarity_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationInfo {
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

/// One page of listed images
#[derive(Debug, Clone)]
pub struct ListedImages {
    pub images: Vec<ImageEntry>,
    pub pagination: PaginationInfo,
}

/// Result of uploading one file
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub image: ImageEntry,
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct ListEnvelope {
    data: Vec<ImageEntry>,
    pagination: PaginationInfo,
}

#[derive(Debug, Deserialize)]
struct UploadEnvelope {
    data: ImageEntry,
    message: String,
}

#[derive(Debug, Deserialize)]
struct MultiUploadEnvelope {
    data: Vec<ImageEntry>,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UrlData {
    url: String,
}

#[derive(Debug, Deserialize)]
struct UrlEnvelope {
    data: UrlData,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Remote side of the gallery. Abstracted so reconciliation logic can be
/// exercised against a fake server.
#[async_trait]
pub trait RemoteGallery: Send + Sync {
    async fn list_images(
        &self,
        user_id: &str,
        status: Option<&str>,
        page: i64,
        limit: i64,
    ) -> Result<ListedImages, ClientError>;

    async fn delete_image(&self, image_id: &str, user_id: &str) -> Result<(), ClientError>;

    async fn fresh_url(&self, image_id: &str, user_id: &str) -> Result<String, ClientError>;
}

/// HTTP client for the Portrait ingest API
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Upload a single image file
    pub async fn upload_image(
        &self,
        user_id: &str,
        file_name: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadOutcome, ClientError> {
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime_type)?;
        let form = Form::new()
            .part("image", part)
            .text("userId", user_id.to_string());

        let response = self
            .client
            .post(format!("{}/api/images/upload", self.base_url))
            .multipart(form)
            .send()
            .await?;

        let envelope: UploadEnvelope = Self::parse(response).await?;
        debug!(message = %envelope.message, "Upload completed");

        Ok(UploadOutcome {
            image: envelope.data,
            message: envelope.message,
        })
    }

    /// Upload several image files in one request
    pub async fn upload_multiple(
        &self,
        user_id: &str,
        files: Vec<(String, String, Vec<u8>)>,
    ) -> Result<Vec<ImageEntry>, ClientError> {
        let mut form = Form::new().text("userId", user_id.to_string());
        for (file_name, mime_type, bytes) in files {
            let part = Part::bytes(bytes).file_name(file_name).mime_str(&mime_type)?;
            form = form.part("images", part);
        }

        let response = self
            .client
            .post(format!("{}/api/images/upload/multiple", self.base_url))
            .multipart(form)
            .send()
            .await?;

        let envelope: MultiUploadEnvelope = Self::parse(response).await?;
        debug!(message = %envelope.message, "Batch upload completed");

        Ok(envelope.data)
    }

    async fn parse<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|b| b.message)
                .unwrap_or_else(|| status.to_string());
            return Err(ClientError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl RemoteGallery for ApiClient {
    async fn list_images(
        &self,
        user_id: &str,
        status: Option<&str>,
        page: i64,
        limit: i64,
    ) -> Result<ListedImages, ClientError> {
        let mut request = self
            .client
            .get(format!("{}/api/images/{user_id}", self.base_url))
            .query(&[("page", page.to_string()), ("limit", limit.to_string())]);

        if let Some(status) = status {
            request = request.query(&[("status", status)]);
        }

        let envelope: ListEnvelope = Self::parse(request.send().await?).await?;

        Ok(ListedImages {
            images: envelope.data,
            pagination: envelope.pagination,
        })
    }

    async fn delete_image(&self, image_id: &str, user_id: &str) -> Result<(), ClientError> {
        let response = self
            .client
            .delete(format!("{}/api/images/{image_id}", self.base_url))
            .json(&serde_json::json!({ "userId": user_id }))
            .send()
            .await?;

        let _: serde_json::Value = Self::parse(response).await?;
        Ok(())
    }

    async fn fresh_url(&self, image_id: &str, user_id: &str) -> Result<String, ClientError> {
        let response = self
            .client
            .get(format!("{}/api/images/url/{image_id}", self.base_url))
            .query(&[("userId", user_id)])
            .send()
            .await?;

        let envelope: UrlEnvelope = Self::parse(response).await?;
        Ok(envelope.data.url)
    }
}
