//! Integration tests for previews, filters and card reset

use chrono::NaiveDate;
use flashsync_core::domain::{FileStatus, TargetFilter, TargetPeriod};
use flashsync_sync::{OperationStatus, PreviewOutcome};
use wiremock::ResponseTemplate;

use crate::common::{self, Harness};

#[tokio::test]
async fn test_preview_of_copied_file() {
    let mut h = Harness::new().await;
    common::mount_card(&h.server, &[("IMG_0001.JPG", 100)]).await;
    common::mount_download(
        &h.server,
        "IMG_0001.JPG",
        ResponseTemplate::new(200).set_body_bytes(vec![3u8; 100]),
        1,
    )
    .await;
    h.orchestrator.check_copy_files().await.unwrap();

    let path = common::photo_path("IMG_0001.JPG");
    let loader = h.orchestrator.preview_loader();
    let entry = h.orchestrator.catalog().get(&path).unwrap().clone();
    // The zero-filled copy has no EXIF thumbnail, so local loading is off
    assert!(!entry.can_load_data_local);
    assert_eq!(loader.load(&entry).await, PreviewOutcome::Unreadable);
}

#[tokio::test]
async fn test_missing_preview_marks_entry_not_copied() {
    let mut h = Harness::new().await;
    common::mount_card(&h.server, &[("IMG_0001.JPG", 100)]).await;
    let local = h.write_local("IMG_0001.JPG", 100);
    h.orchestrator.check_files().await.unwrap();

    let path = common::photo_path("IMG_0001.JPG");
    let mut entry = h.orchestrator.catalog().get(&path).unwrap().clone();
    entry.can_load_data_local = true;
    let loader = h.orchestrator.preview_loader();

    match loader.load(&entry).await {
        PreviewOutcome::Loaded(data) => assert_eq!(data.len(), 100),
        other => panic!("expected the local copy, got {other:?}"),
    }

    std::fs::remove_file(&local).unwrap();
    let outcome = loader.load(&entry).await;
    assert_eq!(outcome, PreviewOutcome::Missing);

    h.orchestrator.apply_preview(&path, &outcome);
    let entry = h.orchestrator.catalog().get(&path).unwrap();
    assert_eq!(entry.status(), FileStatus::NotCopied);
    assert!(!entry.is_alive_local);
}

#[tokio::test]
async fn test_filter_limits_copies() {
    let mut h = Harness::new().await;
    common::mount_card(&h.server, &[("IMG_0001.JPG", 100)]).await;
    common::mount_download(
        &h.server,
        "IMG_0001.JPG",
        ResponseTemplate::new(200).set_body_bytes(vec![3u8; 100]),
        0,
    )
    .await;

    let other_day = NaiveDate::from_ymd_opt(2016, 9, 18).unwrap();
    h.orchestrator
        .set_filter(TargetFilter::new(TargetPeriod::Select, vec![other_day]));

    assert!(h.orchestrator.check_copy_files().await.unwrap());
    assert_eq!(h.status_of("IMG_0001.JPG"), Some(FileStatus::NotCopied));
    assert!(h
        .drain_statuses()
        .contains(&OperationStatus::NoFileToBeCopied));
}

#[tokio::test]
async fn test_reset_card_forgets_identity() {
    let mut h = Harness::new().await;
    common::mount_card(&h.server, &[("IMG_0001.JPG", 100)]).await;
    h.orchestrator.check_copy_files().await.unwrap();
    assert!(h.orchestrator.card().cid().is_some());

    h.orchestrator.reset_card();

    assert_eq!(h.orchestrator.card().cid(), None);
    assert!(h.orchestrator.last_check_copy().is_none());
}
