//! Which photo is enlarged, plus the derived text shown around photos.

use api_client::{MediaStore, TransformOptions};
use chrono::{DateTime, Utc};
use sync::PhotoRecord;
use tokio::sync::watch;

pub const EMPTY_GALLERY_MESSAGE: &str = "No photos uploaded yet. Be the first to share a memory!";

const CARD_DATE_FORMAT: &str = "%B %-d, %Y";
const MODAL_DATE_FORMAT: &str = "%B %-d, %Y at %I:%M %p";

/// Holds the focused photo. Nothing else happens on focus changes besides
/// notifying subscribers.
pub struct GalleryController {
    focused: watch::Sender<Option<PhotoRecord>>,
}

impl Default for GalleryController {
    fn default() -> Self {
        Self::new()
    }
}

impl GalleryController {
    pub fn new() -> Self {
        let (focused, _) = watch::channel(None);
        GalleryController { focused }
    }

    pub fn focus(&self, record: PhotoRecord) {
        tracing::debug!(record = %record.id, "Focusing photo");
        self.focused.send_replace(Some(record));
    }

    pub fn unfocus(&self) {
        self.focused.send_replace(None);
    }

    pub fn focused(&self) -> Option<PhotoRecord> {
        self.focused.borrow().clone()
    }

    pub fn is_focused(&self) -> bool {
        self.focused.borrow().is_some()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<PhotoRecord>> {
        self.focused.subscribe()
    }
}

pub fn thumbnail_url<S: MediaStore>(store: &S, record: &PhotoRecord) -> Option<String> {
    record.display_url(store, &TransformOptions::thumbnail())
}

pub fn full_size_url<S: MediaStore>(store: &S, record: &PhotoRecord) -> Option<String> {
    record.display_url(store, &TransformOptions::full_size())
}

/// `"1200 × 800"` when both dimensions are known.
pub fn dimension_badge(record: &PhotoRecord) -> Option<String> {
    record
        .dimensions()
        .map(|(w, h)| format!("{} × {}", w, h))
}

pub fn card_date(at: &DateTime<Utc>) -> String {
    at.format(CARD_DATE_FORMAT).to_string()
}

pub fn modal_date(at: &DateTime<Utc>) -> String {
    at.format(MODAL_DATE_FORMAT).to_string()
}

pub fn gallery_caption(count: usize) -> String {
    if count == 1 {
        "1 beautiful memory shared".to_string()
    } else {
        format!("{} beautiful memories shared", count)
    }
}

/// Everything a gallery tile shows for one record.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotoCard {
    pub id: String,
    pub title: String,
    pub uploader_name: String,
    pub date: String,
    pub thumbnail_url: Option<String>,
    pub pending: bool,
}

impl PhotoCard {
    pub fn new<S: MediaStore>(store: &S, record: &PhotoRecord) -> Self {
        PhotoCard {
            id: record.id.clone(),
            title: record.title.clone(),
            uploader_name: record.uploader_name.clone(),
            date: card_date(&record.uploaded_at),
            thumbnail_url: thumbnail_url(store, record),
            pending: !record.is_confirmed(),
        }
    }
}

/// Details for the enlarged view.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotoDetails {
    pub title: String,
    pub uploader_name: String,
    pub date: String,
    pub url: Option<String>,
    pub dimensions: Option<String>,
    pub format: Option<String>,
}

impl PhotoDetails {
    pub fn new<S: MediaStore>(store: &S, record: &PhotoRecord) -> Self {
        PhotoDetails {
            title: record.title.clone(),
            uploader_name: record.uploader_name.clone(),
            date: modal_date(&record.uploaded_at),
            url: full_size_url(store, record),
            dimensions: dimension_badge(record),
            format: record.format().map(|f| f.to_uppercase()),
        }
    }
}
