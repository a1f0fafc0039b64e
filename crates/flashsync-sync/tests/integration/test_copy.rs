//! Integration tests for the copy phase

use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate};
use flashsync_core::domain::FileStatus;
use flashsync_sync::{OperationStatus, SyncEvent};
use wiremock::{
    matchers::{method, path, query_param},
    Mock, ResponseTemplate,
};

use crate::common::{self, Harness};

fn photo(size: usize) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_bytes(vec![7u8; size])
}

#[tokio::test]
async fn test_check_copy_downloads_into_day_folder() {
    let mut h = Harness::new().await;
    common::mount_card(&h.server, &[("IMG_0001.JPG", 100)]).await;
    common::mount_download(&h.server, "IMG_0001.JPG", photo(100), 1).await;

    assert!(h.orchestrator.check_copy_files().await.unwrap());

    let local = h.local_path("IMG_0001.JPG");
    assert!(local.ends_with("pictures/20160917/IMG_0001.jpg"));
    assert_eq!(std::fs::read(&local).unwrap(), vec![7u8; 100]);
    assert_eq!(h.status_of("IMG_0001.JPG"), Some(FileStatus::Copied));

    let entry = h
        .orchestrator
        .catalog()
        .get(&common::photo_path("IMG_0001.JPG"))
        .unwrap();
    assert!(entry.is_alive_local);
    assert!(entry.copied_time.is_some());

    let modified = std::fs::metadata(&local).unwrap().modified().unwrap();
    assert_eq!(
        DateTime::<Local>::from(modified).date_naive(),
        NaiveDate::from_ymd_opt(2016, 9, 17).unwrap()
    );

    let events = h.drain_events();
    let last_progress = events
        .iter()
        .filter_map(|event| match event {
            SyncEvent::Progress(progress) => Some(progress.bytes_transferred),
            _ => None,
        })
        .last();
    assert_eq!(last_progress, Some(100));
    assert!(events.iter().any(|event| matches!(
        event,
        SyncEvent::Status(OperationStatus::CopyCompleted { files: 1, .. })
    )));
}

#[tokio::test]
async fn test_second_run_has_nothing_to_copy() {
    let mut h = Harness::new().await;
    common::mount_card(&h.server, &[("IMG_0001.JPG", 100)]).await;
    common::mount_download(&h.server, "IMG_0001.JPG", photo(100), 1).await;

    h.orchestrator.check_copy_files().await.unwrap();
    h.drain_events();
    h.orchestrator.check_copy_files().await.unwrap();

    let statuses = h.drain_statuses();
    assert!(statuses.contains(&OperationStatus::NoFileToBeCopied));
    assert_eq!(h.status_of("IMG_0001.JPG"), Some(FileStatus::Copied));
}

#[tokio::test]
async fn test_changed_card_blocks_copy() {
    let mut h = Harness::new().await;
    common::mount_card(&h.server, &[("IMG_0001.JPG", 100)]).await;
    h.orchestrator.check_files().await.unwrap();

    h.server.reset().await;
    common::mount_identity(&h.server, "ffffffffffffffffffffffffffffffff", 100).await;
    common::mount_download(&h.server, "IMG_0001.JPG", photo(100), 0).await;

    let path = common::photo_path("IMG_0001.JPG");
    assert_eq!(
        h.orchestrator.select_file(&path).await.unwrap(),
        Some(FileStatus::ToBeCopied)
    );
    h.drain_events();

    assert!(!h.orchestrator.copy_files().await.unwrap());
    assert_eq!(
        h.drain_statuses().last(),
        Some(&OperationStatus::NotSameCard)
    );
    assert_eq!(h.status_of("IMG_0001.JPG"), Some(FileStatus::ToBeCopied));
}

#[tokio::test]
async fn test_short_download_is_weird() {
    let mut h = Harness::new().await;
    common::mount_card(&h.server, &[("IMG_0001.JPG", 100)]).await;
    common::mount_download(&h.server, "IMG_0001.JPG", photo(50), 1).await;

    assert!(h.orchestrator.check_copy_files().await.unwrap());

    assert_eq!(h.status_of("IMG_0001.JPG"), Some(FileStatus::Weird));
    assert!(!h.local_path("IMG_0001.JPG").exists());
}

#[tokio::test]
async fn test_vanished_download_is_not_copied() {
    let mut h = Harness::new().await;
    common::mount_card(&h.server, &[("IMG_0001.JPG", 100)]).await;
    common::mount_download(&h.server, "IMG_0001.JPG", ResponseTemplate::new(404), 1).await;

    assert!(h.orchestrator.check_copy_files().await.unwrap());

    let entry = h
        .orchestrator
        .catalog()
        .get(&common::photo_path("IMG_0001.JPG"))
        .unwrap();
    assert_eq!(entry.status(), FileStatus::NotCopied);
    assert!(!entry.is_alive_remote);
}

#[tokio::test]
async fn test_server_error_keeps_file_queued() {
    let mut h = Harness::new().await;
    common::mount_card(&h.server, &[("IMG_0001.JPG", 100)]).await;
    // Retried up to the policy's attempt limit
    common::mount_download(&h.server, "IMG_0001.JPG", ResponseTemplate::new(500), 3).await;

    assert!(!h.orchestrator.check_copy_files().await.unwrap());

    assert_eq!(h.status_of("IMG_0001.JPG"), Some(FileStatus::ToBeCopied));
    assert_eq!(
        h.drain_statuses().last(),
        Some(&OperationStatus::ConnectionUnable)
    );
}

#[tokio::test]
async fn test_delete_upon_copy_removes_from_card() {
    let mut h = Harness::with_config(|b| b.delete_upon_copy(true)).await;
    common::mount_card(&h.server, &[("IMG_0001.JPG", 100)]).await;
    common::mount_download(&h.server, "IMG_0001.JPG", photo(100), 1).await;
    Mock::given(method("GET"))
        .and(path("/upload.cgi"))
        .and(query_param("DEL", common::photo_path("IMG_0001.JPG")))
        .respond_with(ResponseTemplate::new(200).set_body_string("SUCCESS"))
        .expect(1)
        .mount(&h.server)
        .await;

    assert!(h.orchestrator.check_copy_files().await.unwrap());
    assert_eq!(h.status_of("IMG_0001.JPG"), Some(FileStatus::Copied));
}

#[tokio::test]
async fn test_delete_upon_copy_refused_when_upload_disabled() {
    let mut h = Harness::with_config(|b| b.delete_upon_copy(true)).await;
    // Mounted first so it wins over the identity's enabled answer
    common::mount_command(&h.server, "118", "0").await;
    common::mount_card(&h.server, &[("IMG_0001.JPG", 100)]).await;
    common::mount_download(&h.server, "IMG_0001.JPG", photo(100), 0).await;

    assert!(!h.orchestrator.check_copy_files().await.unwrap());

    assert_eq!(
        h.drain_statuses().last(),
        Some(&OperationStatus::DeleteDisabled)
    );
    assert_eq!(h.status_of("IMG_0001.JPG"), Some(FileStatus::ToBeCopied));
}

#[tokio::test]
async fn test_failed_delete_reports_delete_failed() {
    let mut h = Harness::with_config(|b| b.delete_upon_copy(true)).await;
    common::mount_card(&h.server, &[("IMG_0001.JPG", 100)]).await;
    common::mount_download(&h.server, "IMG_0001.JPG", photo(100), 1).await;
    Mock::given(method("GET"))
        .and(path("/upload.cgi"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ERROR"))
        .mount(&h.server)
        .await;

    assert!(!h.orchestrator.check_copy_files().await.unwrap());

    assert_eq!(h.status_of("IMG_0001.JPG"), Some(FileStatus::Copied));
    assert_eq!(
        h.drain_statuses().last(),
        Some(&OperationStatus::DeleteFailed)
    );
}

#[tokio::test]
async fn test_stop_during_download() {
    let mut h = Harness::new().await;
    common::mount_card(&h.server, &[("IMG_0001.JPG", 100)]).await;
    common::mount_download(
        &h.server,
        "IMG_0001.JPG",
        photo(100).set_delay(Duration::from_millis(800)),
        1,
    )
    .await;

    let stop = h.orchestrator.stop_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        stop.stop_work();
    });

    assert!(!h.orchestrator.check_copy_files().await.unwrap());

    assert_eq!(h.drain_statuses().last(), Some(&OperationStatus::Stopped));
    assert_eq!(h.status_of("IMG_0001.JPG"), Some(FileStatus::ToBeCopied));
    assert!(!h.local_path("IMG_0001.JPG").exists());
    assert!(!h.orchestrator.stop_handle().is_working());
}

#[tokio::test]
async fn test_stop_before_first_phase_is_honoured() {
    let mut h = Harness::new().await;
    common::mount_card(&h.server, &[("IMG_0001.JPG", 100)]).await;
    h.probe.stop_during_network_check(h.orchestrator.stop_handle());

    assert!(!h.orchestrator.check_copy_files().await.unwrap());

    assert_eq!(h.drain_statuses(), vec![OperationStatus::Stopped]);
    assert!(h.server.received_requests().await.unwrap().is_empty());
    assert!(!h.orchestrator.stop_handle().is_working());

    // The next run starts with a fresh scope
    assert!(h.orchestrator.check_files().await.unwrap());
    assert_eq!(h.status_of("IMG_0001.JPG"), Some(FileStatus::NotCopied));
}

#[tokio::test]
async fn test_instant_copy_on_select() {
    let mut h = Harness::with_config(|b| b.instant_copy(true)).await;
    common::mount_card(&h.server, &[("IMG_0001.JPG", 100), ("IMG_0002.JPG", 200)]).await;
    common::mount_download(&h.server, "IMG_0001.JPG", photo(100), 0).await;
    common::mount_download(&h.server, "IMG_0002.JPG", photo(200), 1).await;

    h.orchestrator.check_files().await.unwrap();
    assert_eq!(h.status_of("IMG_0002.JPG"), Some(FileStatus::NotCopied));

    h.orchestrator
        .select_file(&common::photo_path("IMG_0002.JPG"))
        .await
        .unwrap();

    assert_eq!(h.status_of("IMG_0001.JPG"), Some(FileStatus::NotCopied));
    assert_eq!(h.status_of("IMG_0002.JPG"), Some(FileStatus::Copied));
    assert!(h.local_path("IMG_0002.JPG").exists());
}

#[tokio::test]
async fn test_select_toggles_back() {
    let mut h = Harness::new().await;
    common::mount_card(&h.server, &[("IMG_0001.JPG", 100)]).await;
    h.orchestrator.check_files().await.unwrap();

    let path = common::photo_path("IMG_0001.JPG");
    assert_eq!(
        h.orchestrator.select_file(&path).await.unwrap(),
        Some(FileStatus::ToBeCopied)
    );
    assert_eq!(
        h.orchestrator.select_file(&path).await.unwrap(),
        Some(FileStatus::NotCopied)
    );
    assert_eq!(h.orchestrator.select_file("/nowhere").await.unwrap(), None);
}
