//! Integration tests for auto-check ticks

use flashsync_core::domain::FileStatus;
use flashsync_sync::OperationStatus;
use wiremock::{MockServer, ResponseTemplate};

use crate::common::{self, Harness};

async fn listing_requests(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.query().is_some_and(|q| q.starts_with("op=100")))
        .count()
}

#[tokio::test]
async fn test_recent_tick_only_probes_for_updates() {
    let mut h = Harness::new().await;
    common::mount_card(&h.server, &[("IMG_0001.JPG", 100)]).await;
    h.write_local("IMG_0001.JPG", 100);

    assert!(h.orchestrator.execute_auto_check().await.unwrap());
    assert!(h.orchestrator.thumbnails_filled());
    let after_first = listing_requests(&h.server).await;
    assert!(after_first > 0);

    h.drain_events();
    assert!(h.orchestrator.execute_auto_check().await.unwrap());

    assert_eq!(listing_requests(&h.server).await, after_first);
    assert_eq!(
        h.drain_statuses(),
        vec![OperationStatus::Checking, OperationStatus::Completed]
    );
}

#[tokio::test]
async fn test_tick_runs_full_check_when_card_was_written() {
    let mut h = Harness::new().await;
    common::mount_card(&h.server, &[("IMG_0001.JPG", 100)]).await;
    h.write_local("IMG_0001.JPG", 100);
    h.orchestrator.execute_auto_check().await.unwrap();

    h.server.reset().await;
    common::mount_identity(&h.server, common::CID, 200).await;
    common::mount_photos(&h.server, &[("IMG_0001.JPG", 100), ("IMG_0002.JPG", 200)]).await;
    common::mount_download(
        &h.server,
        "IMG_0002.JPG",
        ResponseTemplate::new(200).set_body_bytes(vec![1u8; 200]),
        1,
    )
    .await;

    assert!(h.orchestrator.execute_auto_check().await.unwrap());

    assert_eq!(h.status_of("IMG_0002.JPG"), Some(FileStatus::Copied));
    assert_eq!(h.orchestrator.card().write_timestamp(), Some(200));
}

#[tokio::test]
async fn test_tick_without_link_backs_off_quietly() {
    let mut h = Harness::new().await;
    common::mount_card(&h.server, &[("IMG_0001.JPG", 100)]).await;
    h.write_local("IMG_0001.JPG", 100);
    h.orchestrator.execute_auto_check().await.unwrap();

    h.probe.set_link_up(false);
    h.drain_events();

    assert!(h.orchestrator.execute_auto_check().await.unwrap());
    assert_eq!(
        h.drain_statuses(),
        vec![OperationStatus::ConnectionUnable]
    );
}
