use api_client::{ApiClient, ApiClientError, MediaStore, StoreSettings, UploadRequest};
use httptest::{matchers::*, responders::*, Expectation, Server};
use serde_json::json;

const LIST_PATH: &str = "/demo/image/list/wedding-gallery.json";

fn request(name: &str) -> UploadRequest {
    UploadRequest {
        file_name: name.into(),
        bytes: b"img".to_vec(),
        content_type: None,
        uploader_name: "Guest".into(),
        title: Some("Title".into()),
    }
}

fn client_for(server: &Server) -> ApiClient {
    ApiClient::with_base_url(StoreSettings::new("demo"), server.url_str(""))
}

#[tokio::test]
async fn test_list_photos_mock() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", LIST_PATH)).respond_with(json_encoded(
            json!({"resources": [
                {"public_id": "a", "format": "jpg", "width": 1, "height": 2,
                 "context": {"custom": {"uploader_name": "Ann"}}},
                {"public_id": "b", "format": "png"}
            ]}),
        )),
    );

    let photos = client_for(&server).list_photos().await.unwrap();
    assert_eq!(photos.len(), 2);
    assert_eq!(photos[0].context.uploader_name.as_deref(), Some("Ann"));
    assert_eq!(photos[1].format.as_deref(), Some("png"));
}

#[tokio::test]
async fn test_list_photos_without_resources_is_empty() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", LIST_PATH))
            .respond_with(json_encoded(json!({}))),
    );
    assert!(client_for(&server).list_photos().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_list_photos_reports_remote_message() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", LIST_PATH)).respond_with(
            status_code(404).body(r#"{"error":{"message":"Resource not found"}}"#),
        ),
    );

    let err = client_for(&server).list_photos().await.unwrap_err();
    match err {
        ApiClientError::MediaStoreError(msg) => {
            assert_eq!(msg, "Not Found: Resource not found");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_upload_sends_preset_tag_and_context() {
    let server = Server::run();
    server.expect(
        Expectation::matching(all_of![
            request::method_path("POST", "/v1_1/demo/image/upload"),
            request::body(matches("wedding-gallery-upload")),
            request::body(matches(r"uploader_name=Guest\|title=Title")),
            request::body(matches(r#"filename="a.jpg""#)),
        ])
        .respond_with(json_encoded(json!({
            "public_id": "wedding/a",
            "format": "jpg",
            "context": {"custom": {"uploader_name": "Guest", "title": "Title"}}
        }))),
    );

    let descriptor = client_for(&server).upload_photo(&request("a.jpg")).await.unwrap();
    assert_eq!(descriptor.public_id, "wedding/a");
    assert_eq!(descriptor.context.title.as_deref(), Some("Title"));
}

#[tokio::test]
async fn test_upload_rejected() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("POST", "/v1_1/demo/image/upload")).respond_with(
            status_code(400).body(r#"{"error":{"message":"Upload preset not found"}}"#),
        ),
    );

    let err = client_for(&server).upload_photo(&request("a.jpg")).await.unwrap_err();
    assert!(err.to_string().contains("Upload preset not found"));
}

#[tokio::test]
async fn test_upload_rejects_empty_file_name() {
    let client = ApiClient::new(StoreSettings::new("demo"));
    let err = client.upload_photo(&request("")).await.unwrap_err();
    assert!(matches!(err, ApiClientError::Other(_)));
}

#[tokio::test]
async fn test_upload_keeps_sent_context_when_echo_has_none() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("POST", "/v1_1/demo/image/upload"))
            .respond_with(json_encoded(json!({"public_id": "wedding/cake", "format": "jpg"}))),
    );

    let mut req = request("cake.jpg");
    req.title = None;
    let descriptor = client_for(&server).upload_photo(&req).await.unwrap();
    assert_eq!(descriptor.context.uploader_name.as_deref(), Some("Guest"));
    assert_eq!(descriptor.context.title.as_deref(), Some("cake"));
    assert_eq!(descriptor.context.original_filename.as_deref(), Some("cake.jpg"));
}
