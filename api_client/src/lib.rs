//! API client module for the remote media store backing the gallery.

mod transform;

pub use transform::{CropMode, Gravity, TransformOptions};

use chrono::{SecondsFormat, Utc};
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub const DEFAULT_API_BASE_URL: &str = "https://api.cloudinary.com";
pub const DEFAULT_DELIVERY_BASE_URL: &str = "https://res.cloudinary.com";
pub const DEFAULT_UPLOAD_PRESET: &str = "wedding-gallery-upload";
pub const DEFAULT_GALLERY_TAG: &str = "wedding-gallery";

/// Metadata attached to every upload and echoed back by the listing.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct PhotoContext {
    pub uploader_name: Option<String>,
    pub title: Option<String>,
    pub upload_date: Option<String>,
    pub original_filename: Option<String>,
}

impl PhotoContext {
    pub fn is_empty(&self) -> bool {
        *self == PhotoContext::default()
    }

    /// Encode as the `key=value|key=value` form field the upload endpoint
    /// expects. `=` and `|` inside values are backslash-escaped.
    pub fn encode(&self) -> String {
        let fields = [
            ("uploader_name", &self.uploader_name),
            ("title", &self.title),
            ("upload_date", &self.upload_date),
            ("original_filename", &self.original_filename),
        ];
        fields
            .iter()
            .filter_map(|(key, value)| {
                value
                    .as_ref()
                    .map(|v| format!("{}={}", key, escape_context_value(v)))
            })
            .collect::<Vec<_>>()
            .join("|")
    }
}

fn escape_context_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '=' || c == '|' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Context arrives nested under `custom` from the listing and upload
/// endpoints, but flat from some older resources.
fn deserialize_context<'de, D>(deserializer: D) -> Result<PhotoContext, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawContext {
        Nested { custom: PhotoContext },
        Flat(PhotoContext),
    }

    Ok(match Option::<RawContext>::deserialize(deserializer)? {
        Some(RawContext::Nested { custom }) => custom,
        Some(RawContext::Flat(ctx)) => ctx,
        None => PhotoContext::default(),
    })
}

/// One resource as reported by the media store.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RemotePhotoDescriptor {
    pub public_id: String,
    #[serde(default)]
    pub secure_url: Option<String>,
    #[serde(default, deserialize_with = "deserialize_context")]
    pub context: PhotoContext,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub bytes: Option<u64>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListPhotosResponse {
    resources: Option<Vec<RemotePhotoDescriptor>>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorMessage,
}

#[derive(Debug, Deserialize)]
struct ErrorMessage {
    message: String,
}

/// A single file to push to the media store.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub uploader_name: String,
    pub title: Option<String>,
}

impl UploadRequest {
    /// Build the context stored alongside the upload. The title defaults to
    /// the file name up to its first dot.
    pub fn context(&self) -> PhotoContext {
        let title = self.title.clone().unwrap_or_else(|| {
            self.file_name
                .split('.')
                .next()
                .unwrap_or(&self.file_name)
                .to_string()
        });
        PhotoContext {
            uploader_name: Some(self.uploader_name.clone()),
            title: Some(title),
            upload_date: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
            original_filename: Some(self.file_name.clone()),
        }
    }

    fn mime_type(&self) -> String {
        self.content_type.clone().unwrap_or_else(|| {
            mime_guess::from_path(&self.file_name)
                .first_or_octet_stream()
                .to_string()
        })
    }
}

#[derive(Debug, Error)]
pub enum ApiClientError {
    #[error("Request Error: {0}")]
    RequestError(String),
    #[error("Media Store Error: {0}")]
    MediaStoreError(String),
    #[error("Other Error: {0}")]
    Other(String),
}

/// The operations the gallery core needs from a media host.
///
/// Implementations are driven from a single-threaded executor, so the
/// returned futures need not be `Send`.
#[allow(async_fn_in_trait)]
pub trait MediaStore {
    async fn list_photos(&self) -> Result<Vec<RemotePhotoDescriptor>, ApiClientError>;

    async fn upload_photo(
        &self,
        request: &UploadRequest,
    ) -> Result<RemotePhotoDescriptor, ApiClientError>;

    fn resolve_display_url(&self, remote_id: &str, options: &TransformOptions) -> String;
}

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub cloud_name: String,
    pub upload_preset: String,
    pub gallery_tag: String,
    pub api_base_url: String,
    pub delivery_base_url: String,
}

impl StoreSettings {
    pub fn new(cloud_name: impl Into<String>) -> Self {
        StoreSettings {
            cloud_name: cloud_name.into(),
            upload_preset: DEFAULT_UPLOAD_PRESET.to_string(),
            gallery_tag: DEFAULT_GALLERY_TAG.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            delivery_base_url: DEFAULT_DELIVERY_BASE_URL.to_string(),
        }
    }
}

pub struct ApiClient {
    client: reqwest::Client,
    settings: StoreSettings,
}

impl ApiClient {
    pub fn new(settings: StoreSettings) -> Self {
        ApiClient {
            client: reqwest::Client::new(),
            settings,
        }
    }

    /// Create a new client that sends both API and delivery traffic to one
    /// base URL. Mainly used for testing.
    pub fn with_base_url(mut settings: StoreSettings, base_url: String) -> Self {
        settings.api_base_url = base_url.clone();
        settings.delivery_base_url = base_url;
        ApiClient::new(settings)
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    fn list_url(&self) -> String {
        format!(
            "{}/{}/image/list/{}.json",
            self.settings.delivery_base_url, self.settings.cloud_name, self.settings.gallery_tag
        )
    }

    fn upload_url(&self) -> String {
        format!(
            "{}/v1_1/{}/image/upload",
            self.settings.api_base_url, self.settings.cloud_name
        )
    }

    async fn error_from_response(response: reqwest::Response) -> ApiClientError {
        let status = response.status();
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.error.message)
            .unwrap_or(text);
        let reason = status.canonical_reason().unwrap_or("Unknown status");
        if message.is_empty() {
            ApiClientError::MediaStoreError(reason.to_string())
        } else {
            ApiClientError::MediaStoreError(format!("{}: {}", reason, message))
        }
    }
}

impl MediaStore for ApiClient {
    #[cfg_attr(feature = "trace-spans", tracing::instrument(skip(self)))]
    async fn list_photos(&self) -> Result<Vec<RemotePhotoDescriptor>, ApiClientError> {
        let url = self.list_url();
        tracing::debug!(%url, "Listing gallery photos");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ApiClientError::RequestError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let list_response = response
            .json::<ListPhotosResponse>()
            .await
            .map_err(|e| ApiClientError::RequestError(e.to_string()))?;

        Ok(list_response.resources.unwrap_or_default())
    }

    #[cfg_attr(
        feature = "trace-spans",
        tracing::instrument(skip(self, request), fields(file = %request.file_name))
    )]
    async fn upload_photo(
        &self,
        request: &UploadRequest,
    ) -> Result<RemotePhotoDescriptor, ApiClientError> {
        if request.file_name.is_empty() {
            return Err(ApiClientError::Other("Invalid file name".into()));
        }

        let context = request.context();
        let part = Part::bytes(request.bytes.clone())
            .file_name(request.file_name.clone())
            .mime_str(&request.mime_type())
            .map_err(|e| ApiClientError::Other(e.to_string()))?;
        let form = Form::new()
            .part("file", part)
            .text("upload_preset", self.settings.upload_preset.clone())
            .text("tags", self.settings.gallery_tag.clone())
            .text("context", context.encode());

        let response = self
            .client
            .post(self.upload_url())
            .multipart(form)
            .send()
            .await
            .map_err(|e| ApiClientError::RequestError(e.to_string()))?;

        if !response.status().is_success() {
            let err = Self::error_from_response(response).await;
            tracing::warn!(file = %request.file_name, error = %err, "Upload rejected");
            return Err(err);
        }

        let mut descriptor: RemotePhotoDescriptor = response
            .json()
            .await
            .map_err(|e| ApiClientError::RequestError(e.to_string()))?;

        // Some presets strip context from the upload echo.
        if descriptor.context.is_empty() {
            descriptor.context = context;
        }
        tracing::info!(public_id = %descriptor.public_id, "Uploaded photo");
        Ok(descriptor)
    }

    fn resolve_display_url(&self, remote_id: &str, options: &TransformOptions) -> String {
        format!(
            "{}/{}/image/upload/{}/{}",
            self.settings.delivery_base_url,
            self.settings.cloud_name,
            options.to_path_segment(),
            remote_id
        )
    }
}
