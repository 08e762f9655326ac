//! Photo records shown in the gallery.

use api_client::{MediaStore, PhotoContext, RemotePhotoDescriptor, TransformOptions};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_LOCAL_ID: AtomicU64 = AtomicU64::new(1);

const ANONYMOUS_UPLOADER: &str = "Anonymous";

/// Whether the remote listing has reported a record yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStatus {
    Optimistic,
    Confirmed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteMetadata {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub bytes: Option<u64>,
    pub format: Option<String>,
    pub tags: Vec<String>,
    pub context: PhotoContext,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoRecord {
    pub id: String,
    pub remote_id: Option<String>,
    /// Direct URL to the original, used when there is no remote id to
    /// derive a transformed URL from.
    pub source_url: Option<String>,
    pub title: String,
    pub uploader_name: String,
    pub file_name: String,
    pub uploaded_at: DateTime<Utc>,
    pub remote_metadata: Option<RemoteMetadata>,
    pub status: SyncStatus,
}

impl PhotoRecord {
    /// A record that exists only on this client so far.
    pub fn local(file_name: impl Into<String>, uploader_name: impl Into<String>) -> Self {
        let file_name = file_name.into();
        let n = NEXT_LOCAL_ID.fetch_add(1, Ordering::Relaxed);
        PhotoRecord {
            id: format!("local-{}", n),
            remote_id: None,
            source_url: None,
            title: file_name.split('.').next().unwrap_or_default().to_string(),
            uploader_name: uploader_name.into(),
            file_name,
            uploaded_at: Utc::now(),
            remote_metadata: None,
            status: SyncStatus::Optimistic,
        }
    }

    pub fn from_descriptor(descriptor: &RemotePhotoDescriptor, status: SyncStatus) -> Self {
        let ctx = &descriptor.context;
        let id = descriptor.public_id.clone();
        let uploaded_at = ctx
            .upload_date
            .as_deref()
            .or(descriptor.created_at.as_deref())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        PhotoRecord {
            id: id.clone(),
            remote_id: Some(id.clone()),
            source_url: descriptor.secure_url.clone(),
            title: ctx.title.clone().unwrap_or_else(|| id.clone()),
            uploader_name: ctx
                .uploader_name
                .clone()
                .unwrap_or_else(|| ANONYMOUS_UPLOADER.to_string()),
            file_name: ctx.original_filename.clone().unwrap_or(id),
            uploaded_at,
            remote_metadata: Some(RemoteMetadata {
                width: descriptor.width,
                height: descriptor.height,
                bytes: descriptor.bytes,
                format: descriptor.format.clone(),
                tags: descriptor.tags.clone(),
                context: ctx.clone(),
            }),
            status,
        }
    }

    /// The remote identifier used as the dedup key. Empty strings do not count.
    pub fn remote_key(&self) -> Option<&str> {
        self.remote_id.as_deref().filter(|id| !id.is_empty())
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == SyncStatus::Confirmed
    }

    pub fn display_url<S: MediaStore>(
        &self,
        store: &S,
        options: &TransformOptions,
    ) -> Option<String> {
        match self.remote_key() {
            Some(id) => Some(store.resolve_display_url(id, options)),
            None => self.source_url.clone(),
        }
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        let meta = self.remote_metadata.as_ref()?;
        Some((meta.width?, meta.height?))
    }

    pub fn format(&self) -> Option<&str> {
        self.remote_metadata.as_ref()?.format.as_deref()
    }
}
