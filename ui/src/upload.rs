//! Upload form state and batch submission.

use crate::notifications::NotificationCenter;
use api_client::{ApiClientError, MediaStore, UploadRequest};
use futures::future::try_join_all;
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use sync::{PhotoRecord, ReconciliationEngine, Scheduler, SyncStatus, TaskToken};
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Duration;

const PROGRESS_TICK: Duration = Duration::from_millis(200);
const PROGRESS_STEP: u8 = 10;
/// The ramp never claims completion on its own.
const PROGRESS_CAP: u8 = 90;
const UPLOAD_FALLBACK_MESSAGE: &str = "Failed to upload photos. Please try again.";
const MISSING_INFORMATION: &str = "Please add your name and select at least one photo";

fn failure_message(e: &ApiClientError) -> String {
    let detail = match e {
        ApiClientError::RequestError(m)
        | ApiClientError::MediaStoreError(m)
        | ApiClientError::Other(m) => m,
    };
    if detail.trim().is_empty() {
        UPLOAD_FALLBACK_MESSAGE.to_string()
    } else {
        e.to_string()
    }
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Missing information: {}", MISSING_INFORMATION)]
    Validation,
    #[error("An upload is already in progress")]
    InProgress,
    #[error("Upload failed: {0}")]
    Failed(String),
    #[error("Upload controller has been shut down")]
    ShutDown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectedFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl SelectedFile {
    /// Content type is guessed from the file name.
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        let content_type = mime_guess::from_path(&name)
            .first_or_octet_stream()
            .to_string();
        SelectedFile {
            name,
            content_type,
            bytes,
        }
    }

    pub fn with_content_type(
        name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        SelectedFile {
            name: name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let name = path
            .file_name()
            .and_then(|f| f.to_str())
            .ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "Invalid file name")
            })?
            .to_string();
        let bytes = tokio::fs::read(path).await?;
        Ok(SelectedFile::new(name, bytes))
    }

    pub fn is_image(&self) -> bool {
        self.content_type.starts_with("image/")
    }
}

struct UploadState {
    files: Vec<SelectedFile>,
    uploader_name: String,
    title: Option<String>,
    in_progress: bool,
    shut_down: bool,
    progress: watch::Sender<u8>,
}

impl UploadState {
    fn set_progress(&self, value: u8) {
        self.progress.send_replace(value.min(100));
    }
}

/// Held while a batch is in flight. Dropping it stops the progress ramp and,
/// unless the batch finished, returns the form to idle.
struct InFlight {
    state: Rc<RefCell<UploadState>>,
    scheduler: Scheduler,
    ramp: TaskToken,
    armed: bool,
}

impl InFlight {
    fn finish(mut self) {
        self.armed = false;
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.scheduler.cancel(self.ramp);
        if !self.armed {
            return;
        }
        if let Ok(mut state) = self.state.try_borrow_mut() {
            tracing::debug!("Upload abandoned before the batch resolved");
            state.in_progress = false;
            state.set_progress(0);
        }
    }
}

pub struct UploadController<S: MediaStore> {
    store: Rc<S>,
    engine: Rc<ReconciliationEngine<S>>,
    notifications: NotificationCenter,
    scheduler: Scheduler,
    state: Rc<RefCell<UploadState>>,
}

impl<S: MediaStore> UploadController<S> {
    pub fn new(
        store: Rc<S>,
        engine: Rc<ReconciliationEngine<S>>,
        notifications: NotificationCenter,
    ) -> Self {
        let (progress, _) = watch::channel(0);
        UploadController {
            store,
            engine,
            notifications,
            scheduler: Scheduler::new(),
            state: Rc::new(RefCell::new(UploadState {
                files: Vec::new(),
                uploader_name: String::new(),
                title: None,
                in_progress: false,
                shut_down: false,
                progress,
            })),
        }
    }

    /// Append image files to the selection. Anything that is not an image
    /// is dropped, whichever input it came from. Returns how many were kept.
    pub fn select_files(&self, files: Vec<SelectedFile>) -> usize {
        let mut state = self.state.borrow_mut();
        let mut accepted = 0;
        for file in files {
            if file.is_image() {
                state.files.push(file);
                accepted += 1;
            } else {
                tracing::debug!(
                    file = %file.name,
                    content_type = %file.content_type,
                    "Ignoring non-image file"
                );
            }
        }
        accepted
    }

    /// Remove the file at `index`; out-of-range indices are ignored.
    pub fn remove_file(&self, index: usize) -> Option<SelectedFile> {
        let mut state = self.state.borrow_mut();
        if index < state.files.len() {
            Some(state.files.remove(index))
        } else {
            None
        }
    }

    pub fn set_uploader_name(&self, name: impl Into<String>) {
        self.state.borrow_mut().uploader_name = name.into();
    }

    pub fn set_title(&self, title: Option<String>) {
        self.state.borrow_mut().title = title.filter(|t| !t.trim().is_empty());
    }

    pub fn uploader_name(&self) -> String {
        self.state.borrow().uploader_name.clone()
    }

    pub fn title(&self) -> Option<String> {
        self.state.borrow().title.clone()
    }

    pub fn file_names(&self) -> Vec<String> {
        self.state
            .borrow()
            .files
            .iter()
            .map(|f| f.name.clone())
            .collect()
    }

    pub fn selection_len(&self) -> usize {
        self.state.borrow().files.len()
    }

    pub fn is_uploading(&self) -> bool {
        self.state.borrow().in_progress
    }

    /// Upload progress in percent.
    pub fn progress(&self) -> u8 {
        *self.state.borrow().progress.borrow()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<u8> {
        self.state.borrow().progress.subscribe()
    }

    fn start_progress_ramp(&self) -> TaskToken {
        let weak = Rc::downgrade(&self.state);
        self.scheduler.schedule_every(PROGRESS_TICK, move || {
            if let Some(state) = weak.upgrade() {
                let state = state.borrow();
                let current = *state.progress.borrow();
                state.set_progress(current.saturating_add(PROGRESS_STEP).min(PROGRESS_CAP));
            }
        })
    }

    /// Upload the whole selection as one batch.
    ///
    /// Either every file is handed to the gallery or none is. On failure the
    /// selection and name are kept so the guest can retry.
    #[cfg_attr(feature = "trace-spans", tracing::instrument(skip(self)))]
    pub async fn submit(&self) -> Result<usize, UploadError> {
        let requests = {
            let mut state = self.state.borrow_mut();
            if state.shut_down {
                return Err(UploadError::ShutDown);
            }
            if state.in_progress {
                return Err(UploadError::InProgress);
            }
            let uploader_name = state.uploader_name.trim().to_string();
            if state.files.is_empty() || uploader_name.is_empty() {
                drop(state);
                self.notifications
                    .error("Missing information", Some(MISSING_INFORMATION.to_string()));
                return Err(UploadError::Validation);
            }
            state.in_progress = true;
            state.set_progress(0);
            state
                .files
                .iter()
                .map(|f| UploadRequest {
                    file_name: f.name.clone(),
                    bytes: f.bytes.clone(),
                    content_type: Some(f.content_type.clone()),
                    uploader_name: uploader_name.clone(),
                    title: state.title.clone(),
                })
                .collect::<Vec<_>>()
        };

        tracing::info!(count = requests.len(), "Uploading photo batch");
        let in_flight = InFlight {
            state: self.state.clone(),
            scheduler: self.scheduler.clone(),
            ramp: self.start_progress_ramp(),
            armed: true,
        };
        let result = try_join_all(requests.iter().map(|r| self.store.upload_photo(r))).await;

        if self.state.borrow().shut_down {
            tracing::debug!("Dropping upload result that arrived after shutdown");
            return Err(UploadError::ShutDown);
        }
        in_flight.finish();

        match result {
            Ok(descriptors) => {
                let records: Vec<PhotoRecord> = descriptors
                    .iter()
                    .map(|d| PhotoRecord::from_descriptor(d, SyncStatus::Optimistic))
                    .collect();
                let count = records.len();
                self.engine.record_upload(records);
                {
                    let mut state = self.state.borrow_mut();
                    state.files.clear();
                    state.uploader_name.clear();
                    state.title = None;
                    state.in_progress = false;
                    state.set_progress(100);
                }
                self.notifications.success(
                    "Upload successful!",
                    Some(format!(
                        "Successfully uploaded {} photo{}",
                        count,
                        if count == 1 { "" } else { "s" }
                    )),
                );
                Ok(count)
            }
            Err(e) => {
                let message = failure_message(&e);
                tracing::error!(error = %message, "Batch upload failed");
                {
                    let mut state = self.state.borrow_mut();
                    state.in_progress = false;
                    state.set_progress(0);
                }
                self.notifications
                    .error("Upload failed", Some(message.clone()));
                Err(UploadError::Failed(message))
            }
        }
    }

    /// Stop the progress ramp and ignore an upload still in flight.
    pub fn shutdown(&self) {
        self.state.borrow_mut().shut_down = true;
        self.scheduler.shutdown();
    }
}

impl<S: MediaStore> Drop for UploadController<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_store_error_falls_back_to_generic_message() {
        let e = ApiClientError::MediaStoreError(String::new());
        assert_eq!(failure_message(&e), UPLOAD_FALLBACK_MESSAGE);

        let e = ApiClientError::RequestError("connection reset".into());
        assert_eq!(failure_message(&e), "Request Error: connection reset");
    }

    #[test]
    fn content_type_is_guessed_from_name() {
        assert_eq!(SelectedFile::new("a.PNG", vec![]).content_type, "image/png");
        assert!(!SelectedFile::new("README", vec![]).is_image());
    }
}
