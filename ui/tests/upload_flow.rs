use mocks::MemoryStore;
use std::rc::Rc;
use sync::{EngineSettings, ReconciliationEngine};
use tokio::task::LocalSet;
use tokio::time::{sleep, timeout, Duration};
use ui::{NotificationCenter, SelectedFile, Severity, UploadController, UploadError};

struct Harness {
    store: Rc<MemoryStore>,
    engine: Rc<ReconciliationEngine<MemoryStore>>,
    notifications: NotificationCenter,
    uploads: UploadController<MemoryStore>,
}

fn harness() -> Harness {
    let store = Rc::new(MemoryStore::new());
    let engine = Rc::new(ReconciliationEngine::new(store.clone(), EngineSettings::default()));
    let notifications = NotificationCenter::default();
    let uploads = UploadController::new(store.clone(), engine.clone(), notifications.clone());
    Harness {
        store,
        engine,
        notifications,
        uploads,
    }
}

fn photo(name: &str) -> SelectedFile {
    SelectedFile::new(name, vec![0xff, 0xd8, 0xff])
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn blank_name_is_rejected_before_any_network_call() {
    LocalSet::new()
        .run_until(async {
            let h = harness();
            h.uploads.select_files(vec![photo("a.jpg")]);
            h.uploads.set_uploader_name("   ");

            let err = h.uploads.submit().await.unwrap_err();
            assert!(matches!(err, UploadError::Validation));
            assert_eq!(h.store.upload_calls(), 0);
            assert_eq!(h.uploads.file_names(), vec!["a.jpg".to_string()]);
            assert!(!h.uploads.is_uploading());

            let entries = h.notifications.entries();
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].severity, Severity::Error);
            assert_eq!(entries[0].title, "Missing information");
        })
        .await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn empty_selection_is_rejected() {
    LocalSet::new()
        .run_until(async {
            let h = harness();
            h.uploads.set_uploader_name("Sam");
            assert!(matches!(h.uploads.submit().await, Err(UploadError::Validation)));
            assert_eq!(h.store.upload_calls(), 0);
            assert_eq!(h.uploads.uploader_name(), "Sam");
        })
        .await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn failed_batch_hands_nothing_to_the_gallery() {
    LocalSet::new()
        .run_until(async {
            let h = harness();
            h.store.fail_upload_of("b.jpg");
            h.uploads.select_files(vec![photo("a.jpg"), photo("b.jpg"), photo("c.jpg")]);
            h.uploads.set_uploader_name("Sam");

            let err = h.uploads.submit().await.unwrap_err();
            match err {
                UploadError::Failed(message) => assert!(message.contains("b.jpg rejected")),
                other => panic!("unexpected error: {other:?}"),
            }
            assert!(h.engine.gallery().is_empty());
            assert_eq!(h.engine.optimistic_len(), 0);
            assert_eq!(h.uploads.selection_len(), 3);
            assert_eq!(h.uploads.uploader_name(), "Sam");
            assert_eq!(h.uploads.progress(), 0);
            assert!(!h.uploads.is_uploading());

            let entries = h.notifications.entries();
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].title, "Upload failed");
            assert!(entries[0].detail.as_deref().unwrap_or_default().contains("b.jpg"));
        })
        .await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn successful_batch_is_shown_immediately() {
    LocalSet::new()
        .run_until(async {
            let h = harness();
            h.uploads.select_files(vec![photo("a.jpg"), photo("b.png")]);
            h.uploads.set_uploader_name("Sam");
            h.uploads.set_title(Some("Reception".into()));

            assert_eq!(h.uploads.submit().await.unwrap(), 2);
            assert_eq!(h.store.upload_calls(), 2);

            let gallery = h.engine.gallery();
            assert_eq!(gallery.len(), 2);
            assert!(gallery.iter().all(|r| !r.is_confirmed() && r.remote_key().is_some()));
            assert!(gallery.iter().all(|r| r.title == "Reception" && r.uploader_name == "Sam"));

            assert_eq!(h.uploads.selection_len(), 0);
            assert_eq!(h.uploads.uploader_name(), "");
            assert!(h.uploads.title().is_none());
            assert_eq!(h.uploads.progress(), 100);

            let entries = h.notifications.entries();
            assert_eq!(entries[0].title, "Upload successful!");
            assert_eq!(entries[0].detail.as_deref(), Some("Successfully uploaded 2 photos"));
        })
        .await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn single_upload_message_is_singular() {
    LocalSet::new()
        .run_until(async {
            let h = harness();
            h.uploads.select_files(vec![photo("a.jpg")]);
            h.uploads.set_uploader_name("Sam");
            h.uploads.submit().await.unwrap();
            let entries = h.notifications.entries();
            assert_eq!(entries[0].detail.as_deref(), Some("Successfully uploaded 1 photo"));
        })
        .await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn uploaded_photo_is_confirmed_by_next_listing() {
    LocalSet::new()
        .run_until(async {
            let h = harness();
            h.store.publish_uploads(true);
            h.uploads.select_files(vec![photo("a.jpg")]);
            h.uploads.set_uploader_name("Sam");
            h.uploads.submit().await.unwrap();
            assert_eq!(h.engine.optimistic_len(), 1);

            h.engine.refresh().await.unwrap();
            let gallery = h.engine.gallery();
            assert_eq!(gallery.len(), 1);
            assert!(gallery[0].is_confirmed());
            assert_eq!(h.engine.optimistic_len(), 0);
            assert_eq!(h.engine.pending_timers(), 0);
        })
        .await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn non_images_are_dropped_from_every_selection() {
    LocalSet::new()
        .run_until(async {
            let h = harness();
            let accepted = h.uploads.select_files(vec![
                photo("a.jpg"),
                SelectedFile::new("notes.txt", b"hi".to_vec()),
                SelectedFile::with_content_type("clip", "video/mp4", vec![1]),
                SelectedFile::with_content_type("raw", "image/heic", vec![1]),
            ]);
            assert_eq!(accepted, 2);
            assert_eq!(h.uploads.file_names(), vec!["a.jpg".to_string(), "raw".to_string()]);
        })
        .await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn remove_file_ignores_out_of_range_index() {
    LocalSet::new()
        .run_until(async {
            let h = harness();
            h.uploads.select_files(vec![photo("a.jpg"), photo("b.jpg"), photo("c.jpg")]);
            assert!(h.uploads.remove_file(7).is_none());
            assert_eq!(h.uploads.selection_len(), 3);
            let removed = h.uploads.remove_file(1).unwrap();
            assert_eq!(removed.name, "b.jpg");
            assert_eq!(h.uploads.file_names(), vec!["a.jpg".to_string(), "c.jpg".to_string()]);
        })
        .await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn progress_ramps_and_caps_until_the_batch_resolves() {
    LocalSet::new()
        .run_until(async {
            let h = harness();
            h.store.set_latency(Duration::from_secs(3));
            h.uploads.select_files(vec![photo("a.jpg")]);
            h.uploads.set_uploader_name("Sam");

            let (result, _) = tokio::join!(h.uploads.submit(), async {
                sleep(Duration::from_millis(500)).await;
                assert!(h.uploads.is_uploading());
                assert_eq!(h.uploads.progress(), 20);
                sleep(Duration::from_millis(2000)).await;
                assert_eq!(h.uploads.progress(), 90);
            });
            result.unwrap();
            assert_eq!(h.uploads.progress(), 100);
        })
        .await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn second_submit_while_uploading_is_rejected() {
    LocalSet::new()
        .run_until(async {
            let h = harness();
            h.store.set_latency(Duration::from_millis(100));
            h.uploads.select_files(vec![photo("a.jpg")]);
            h.uploads.set_uploader_name("Sam");

            let (first, second) = tokio::join!(h.uploads.submit(), async {
                sleep(Duration::from_millis(10)).await;
                h.uploads.submit().await
            });
            assert_eq!(first.unwrap(), 1);
            assert!(matches!(second, Err(UploadError::InProgress)));
            assert_eq!(h.store.upload_calls(), 1);
        })
        .await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn result_after_shutdown_is_ignored() {
    LocalSet::new()
        .run_until(async {
            let h = harness();
            h.store.set_latency(Duration::from_millis(100));
            h.uploads.select_files(vec![photo("a.jpg")]);
            h.uploads.set_uploader_name("Sam");

            let (result, _) = tokio::join!(h.uploads.submit(), async {
                sleep(Duration::from_millis(10)).await;
                h.uploads.shutdown();
            });
            assert!(matches!(result, Err(UploadError::ShutDown)));
            assert!(h.engine.gallery().is_empty());
            assert!(h.notifications.is_empty());
            assert!(matches!(h.uploads.submit().await, Err(UploadError::ShutDown)));
        })
        .await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn abandoned_submit_unlocks_the_form() {
    LocalSet::new()
        .run_until(async {
            let h = harness();
            h.store.set_latency(Duration::from_secs(10));
            h.uploads.select_files(vec![photo("a.jpg")]);
            h.uploads.set_uploader_name("Sam");

            assert!(timeout(Duration::from_secs(1), h.uploads.submit()).await.is_err());
            assert!(!h.uploads.is_uploading());
            assert_eq!(h.uploads.progress(), 0);
            assert_eq!(h.uploads.selection_len(), 1);

            sleep(Duration::from_secs(1)).await;
            assert_eq!(h.uploads.progress(), 0);

            h.store.set_latency(Duration::ZERO);
            assert_eq!(h.uploads.submit().await.unwrap(), 1);
            assert_eq!(h.uploads.progress(), 100);
            assert_eq!(h.engine.gallery().len(), 1);
        })
        .await;
}

#[tokio::test]
async fn selected_file_reads_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("toast.jpeg");
    std::fs::write(&path, [0xff, 0xd8, 0xff]).unwrap();

    let file = SelectedFile::from_path(&path).await.unwrap();
    assert_eq!(file.name, "toast.jpeg");
    assert_eq!(file.content_type, "image/jpeg");
    assert_eq!(file.bytes.len(), 3);
    assert!(file.is_image());

    assert!(SelectedFile::from_path(&dir.path().join("missing.jpg")).await.is_err());
}
