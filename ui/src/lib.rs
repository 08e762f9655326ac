//! Presentation-side state for the wedding gallery.
//!
//! [`GalleryApp`] wires one [`ReconciliationEngine`] to the notification
//! center and the upload and gallery controllers. Everything here must run
//! inside a tokio `LocalSet`.

mod gallery;
mod notifications;
mod upload;

pub use gallery::{
    card_date, dimension_badge, full_size_url, gallery_caption, modal_date, thumbnail_url,
    GalleryController, PhotoCard, PhotoDetails, EMPTY_GALLERY_MESSAGE,
};
pub use notifications::{
    Notification, NotificationCenter, NotificationId, Severity, DEFAULT_NOTIFICATION_LIFETIME,
};
pub use upload::{SelectedFile, UploadController, UploadError};

use api_client::MediaStore;
use std::cell::Cell;
use std::rc::Rc;
use sync::{
    EngineSettings, PhotoRecord, ReconciliationEngine, SyncError, DEFAULT_MATCH_WINDOW,
    DEFAULT_OPTIMISTIC_EXPIRY,
};
use tokio::time::Duration;

/// Runtime knobs for the gallery.
#[derive(Debug, Clone, Copy)]
pub struct GalleryConfig {
    pub optimistic_expiry: Duration,
    pub notification_lifetime: Duration,
    pub match_window: Duration,
}

impl Default for GalleryConfig {
    fn default() -> Self {
        GalleryConfig {
            optimistic_expiry: DEFAULT_OPTIMISTIC_EXPIRY,
            notification_lifetime: DEFAULT_NOTIFICATION_LIFETIME,
            match_window: DEFAULT_MATCH_WINDOW,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Gallery,
    Upload,
}

pub struct GalleryApp<S: MediaStore> {
    store: Rc<S>,
    engine: Rc<ReconciliationEngine<S>>,
    notifications: NotificationCenter,
    uploads: UploadController<S>,
    gallery: GalleryController,
    view: Cell<View>,
}

impl<S: MediaStore> GalleryApp<S> {
    pub fn new(store: Rc<S>, config: GalleryConfig) -> Self {
        let engine = Rc::new(ReconciliationEngine::new(
            store.clone(),
            EngineSettings {
                optimistic_expiry: config.optimistic_expiry,
                match_window: config.match_window,
            },
        ));
        let notifications = NotificationCenter::new(config.notification_lifetime);
        let uploads = UploadController::new(store.clone(), engine.clone(), notifications.clone());
        GalleryApp {
            store,
            engine,
            notifications,
            uploads,
            gallery: GalleryController::new(),
            view: Cell::new(View::Gallery),
        }
    }

    /// Run the initial load. Calling it again does nothing.
    pub async fn start(&self) {
        self.engine.activate().await;
    }

    /// Manual refresh. Failures become an error notification and leave the
    /// gallery as it was.
    pub async fn refresh(&self) -> bool {
        match self.engine.refresh().await {
            Ok(_) => true,
            Err(SyncError::ShutDown) => false,
            Err(e) => {
                tracing::error!(error = %e, "Refresh failed");
                self.notifications.error(
                    "Failed to refresh gallery",
                    Some("Please check your connection and try again".to_string()),
                );
                false
            }
        }
    }

    /// Submit the upload form and return to the gallery on success.
    pub async fn submit_upload(&self) -> Result<usize, UploadError> {
        let count = self.uploads.submit().await?;
        self.view.set(View::Gallery);
        Ok(count)
    }

    pub fn photos(&self) -> Vec<PhotoRecord> {
        self.engine.gallery()
    }

    pub fn cards(&self) -> Vec<PhotoCard> {
        self.photos()
            .iter()
            .map(|r| PhotoCard::new(&*self.store, r))
            .collect()
    }

    pub fn caption(&self) -> String {
        let count = self.photos().len();
        if count == 0 {
            EMPTY_GALLERY_MESSAGE.to_string()
        } else {
            gallery_caption(count)
        }
    }

    pub fn load_error(&self) -> Option<String> {
        self.engine.load_error()
    }

    pub fn is_loading(&self) -> bool {
        self.engine.is_loading()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn engine(&self) -> &ReconciliationEngine<S> {
        &self.engine
    }

    pub fn notifications(&self) -> &NotificationCenter {
        &self.notifications
    }

    pub fn uploads(&self) -> &UploadController<S> {
        &self.uploads
    }

    pub fn gallery(&self) -> &GalleryController {
        &self.gallery
    }

    pub fn view(&self) -> View {
        self.view.get()
    }

    pub fn set_view(&self, view: View) {
        self.view.set(view);
    }

    /// Focus the photo with this record or remote id, if it is in the gallery.
    pub fn focus_photo(&self, id: &str) -> bool {
        let found = self
            .photos()
            .into_iter()
            .find(|r| r.id == id || r.remote_key() == Some(id));
        match found {
            Some(record) => {
                self.gallery.focus(record);
                true
            }
            None => false,
        }
    }

    pub fn focused_details(&self) -> Option<PhotoDetails> {
        self.gallery
            .focused()
            .map(|r| PhotoDetails::new(&*self.store, &r))
    }

    /// Tear down every component: timers stop and late results are ignored.
    pub fn shutdown(&self) {
        self.uploads.shutdown();
        self.engine.shutdown();
        self.notifications.shutdown();
    }
}

impl<S: MediaStore> Drop for GalleryApp<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
