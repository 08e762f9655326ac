use api_client::{
    ApiClientError, MediaStore, RemotePhotoDescriptor, TransformOptions, UploadRequest,
};
use httptest::{matchers::*, responders::*, Expectation, Server};
use serde_json::json;
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::time::Duration;

/// Build a listed descriptor the way the media host reports it.
pub fn descriptor(
    public_id: &str,
    uploader: &str,
    file_name: &str,
    upload_date: &str,
) -> RemotePhotoDescriptor {
    serde_json::from_value(json!({
        "public_id": public_id,
        "secure_url": format!("https://cdn.example.com/{}.jpg", public_id),
        "format": "jpg",
        "width": 1200,
        "height": 800,
        "bytes": 2048,
        "tags": ["wedding-gallery"],
        "created_at": upload_date,
        "context": {
            "custom": {
                "uploader_name": uploader,
                "title": file_name.split('.').next().unwrap_or(file_name),
                "upload_date": upload_date,
                "original_filename": file_name
            }
        }
    }))
    .expect("static descriptor json")
}

/// In-memory media store with switchable failures and latency.
#[derive(Default)]
pub struct MemoryStore {
    listing: RefCell<Vec<RemotePhotoDescriptor>>,
    fail_list: Cell<bool>,
    failing_files: RefCell<HashSet<String>>,
    publish_uploads: Cell<bool>,
    latency: Cell<Duration>,
    next_id: Cell<u64>,
    list_calls: Cell<usize>,
    upload_calls: Cell<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listing(listing: Vec<RemotePhotoDescriptor>) -> Self {
        let store = Self::default();
        store.set_listing(listing);
        store
    }

    pub fn set_listing(&self, listing: Vec<RemotePhotoDescriptor>) {
        *self.listing.borrow_mut() = listing;
    }

    pub fn push_listed(&self, descriptor: RemotePhotoDescriptor) {
        self.listing.borrow_mut().push(descriptor);
    }

    pub fn fail_listing(&self, fail: bool) {
        self.fail_list.set(fail);
    }

    /// Reject uploads of `file_name`.
    pub fn fail_upload_of(&self, file_name: &str) {
        self.failing_files.borrow_mut().insert(file_name.to_string());
    }

    /// When set, accepted uploads show up in the next listing.
    pub fn publish_uploads(&self, publish: bool) {
        self.publish_uploads.set(publish);
    }

    /// Delay every call by `latency` of tokio time.
    pub fn set_latency(&self, latency: Duration) {
        self.latency.set(latency);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.get()
    }

    pub fn upload_calls(&self) -> usize {
        self.upload_calls.get()
    }

    async fn wait(&self) {
        let latency = self.latency.get();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

impl MediaStore for MemoryStore {
    async fn list_photos(&self) -> Result<Vec<RemotePhotoDescriptor>, ApiClientError> {
        self.list_calls.set(self.list_calls.get() + 1);
        let fail = self.fail_list.get();
        let listing = self.listing.borrow().clone();
        self.wait().await;
        if fail {
            return Err(ApiClientError::RequestError("connection refused".into()));
        }
        Ok(listing)
    }

    async fn upload_photo(
        &self,
        request: &UploadRequest,
    ) -> Result<RemotePhotoDescriptor, ApiClientError> {
        self.upload_calls.set(self.upload_calls.get() + 1);
        self.wait().await;
        if self.failing_files.borrow().contains(&request.file_name) {
            return Err(ApiClientError::MediaStoreError(format!(
                "Bad Request: {} rejected",
                request.file_name
            )));
        }
        let n = self.next_id.get() + 1;
        self.next_id.set(n);
        let context = request.context();
        let uploaded = RemotePhotoDescriptor {
            public_id: format!("wedding/upload-{}", n),
            secure_url: Some(format!("https://cdn.example.com/upload-{}.jpg", n)),
            created_at: context.upload_date.clone(),
            context,
            tags: vec!["wedding-gallery".into()],
            format: Some("jpg".into()),
            bytes: Some(request.bytes.len() as u64),
            width: Some(640),
            height: Some(480),
        };
        if self.publish_uploads.get() {
            self.listing.borrow_mut().insert(0, uploaded.clone());
        }
        Ok(uploaded)
    }

    fn resolve_display_url(&self, remote_id: &str, options: &TransformOptions) -> String {
        format!("memory://{}/{}", options.to_path_segment(), remote_id)
    }
}

/// Create an empty mock media host.
pub fn media_host() -> Server {
    Server::run()
}

fn listing_body() -> serde_json::Value {
    json!({
        "resources": [
            {
                "public_id": "wedding/first-dance",
                "format": "jpg",
                "width": 4000,
                "height": 3000,
                "bytes": 1048576,
                "created_at": "2024-01-15T19:00:00Z",
                "context": {
                    "custom": {
                        "uploader_name": "Aunt May",
                        "title": "First dance",
                        "upload_date": "2024-01-15T19:05:00.000Z",
                        "original_filename": "IMG_0001.jpg"
                    }
                }
            },
            {
                "public_id": "wedding/cake",
                "format": "png",
                "width": 800,
                "height": 600,
                "created_at": "2024-01-15T18:00:00Z"
            }
        ]
    })
}

/// Expect a GET of the gallery listing for `cloud`.
pub fn expect_list(server: &Server, cloud: &str) {
    server.expect(
        Expectation::matching(all_of![
            request::method("GET"),
            request::path(eq(format!("/{}/image/list/wedding-gallery.json", cloud))),
        ])
        .times(1..)
        .respond_with(json_encoded(listing_body())),
    );
}

/// Expect a failing GET of the gallery listing for `cloud`.
pub fn expect_list_failure(server: &Server, cloud: &str) {
    server.expect(
        Expectation::matching(all_of![
            request::method("GET"),
            request::path(eq(format!("/{}/image/list/wedding-gallery.json", cloud))),
        ])
        .times(1..)
        .respond_with(status_code(401).body(r#"{"error":{"message":"Invalid cloud name"}}"#)),
    );
}

/// Expect `count` uploads for `cloud`, each answered with a fresh resource.
pub fn expect_upload(server: &Server, cloud: &str, count: usize) {
    server.expect(
        Expectation::matching(all_of![
            request::method("POST"),
            request::path(eq(format!("/v1_1/{}/image/upload", cloud))),
        ])
        .times(count)
        .respond_with(json_encoded(json!({
            "public_id": "wedding/new-upload",
            "secure_url": "https://cdn.example.com/new-upload.jpg",
            "format": "jpg",
            "width": 640,
            "height": 480,
            "bytes": 3
        }))),
    );
}
