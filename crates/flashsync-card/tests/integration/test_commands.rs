//! Integration tests for identity queries, thumbnails and deletion

use flashsync_card::CardError;
use tokio_util::sync::CancellationToken;
use wiremock::{
    matchers::{method, path, query_param},
    Mock, ResponseTemplate,
};

use crate::common;

#[tokio::test]
async fn test_identity_queries_are_trimmed() {
    let (server, client, _probe) = common::setup_card_mock().await;
    common::mount_command(&server, "108", "FlashAir 3.00.00\r\n").await;
    common::mount_command(&server, "120", "02544d53573038470000000000000000\r\n").await;
    common::mount_command(&server, "104", " flashair_home \r\n").await;
    let cancel = CancellationToken::new();

    assert_eq!(
        client.get_firmware_version(&cancel).await.unwrap(),
        "FlashAir 3.00.00"
    );
    assert_eq!(
        client.get_cid(&cancel).await.unwrap(),
        "02544d53573038470000000000000000"
    );
    assert_eq!(client.get_ssid(&cancel).await.unwrap(), "flashair_home");
}

#[tokio::test]
async fn test_update_status() {
    let (server, client, _probe) = common::setup_card_mock().await;
    common::mount_command(&server, "102", "1").await;

    assert!(client
        .check_update_status(&CancellationToken::new())
        .await
        .unwrap());
}

#[tokio::test]
async fn test_update_status_other_answers_are_false() {
    let (server, client, _probe) = common::setup_card_mock().await;
    common::mount_command(&server, "102", "0\r\n").await;

    assert!(!client
        .check_update_status(&CancellationToken::new())
        .await
        .unwrap());
}

#[tokio::test]
async fn test_unparsable_write_timestamp_is_minus_one() {
    let (server, client, _probe) = common::setup_card_mock().await;
    common::mount_command(&server, "121", "not a number").await;

    let stamp = client
        .get_write_timestamp(&CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(stamp, -1);
}

#[tokio::test]
async fn test_write_timestamp_parses() {
    let (server, client, _probe) = common::setup_card_mock().await;
    common::mount_command(&server, "121", "1234567\r\n").await;

    let stamp = client
        .get_write_timestamp(&CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(stamp, 1_234_567);
}

#[tokio::test]
async fn test_old_firmware_answers_empty_cid() {
    let (server, client, _probe) = common::setup_card_mock().await;
    Mock::given(method("GET"))
        .and(path("/command.cgi"))
        .and(query_param("op", "120"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;

    let cid = client.get_cid(&CancellationToken::new()).await.unwrap();
    assert_eq!(cid, "");
}

#[tokio::test]
async fn test_count_files_falls_back_to_zero() {
    let (server, client, _probe) = common::setup_card_mock().await;
    Mock::given(method("GET"))
        .and(path("/command.cgi"))
        .and(query_param("op", "101"))
        .and(query_param("DIR", "/DCIM"))
        .respond_with(ResponseTemplate::new(200).set_body_string("garbage"))
        .mount(&server)
        .await;

    let count = client
        .count_files("/DCIM", None, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(count, 0);
}

// ============================================================================
// Thumbnails
// ============================================================================

#[tokio::test]
async fn test_thumbnail_download() {
    let (server, client, _probe) = common::setup_card_mock().await;
    common::mount_thumbnail(
        &server,
        "/DCIM/A.JPG",
        ResponseTemplate::new(200).set_body_bytes(b"thumb".to_vec()),
    )
    .await;

    let data = client
        .get_thumbnail("/DCIM/A.JPG", None, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(data, b"thumb");
}

#[tokio::test]
async fn test_missing_thumbnail_is_unavailable() {
    let (server, client, _probe) = common::setup_card_mock().await;
    common::mount_thumbnail(&server, "/DCIM/A.RAW", ResponseTemplate::new(404)).await;

    let result = client
        .get_thumbnail("/DCIM/A.RAW", None, &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(CardError::ThumbnailUnavailable(_))));
}

// ============================================================================
// Deletion
// ============================================================================

#[tokio::test]
async fn test_delete_success() {
    let (server, client, _probe) = common::setup_card_mock().await;
    common::mount_delete(
        &server,
        "/DCIM/A.JPG",
        ResponseTemplate::new(200).set_body_string("SUCCESS"),
    )
    .await;

    client
        .delete_file("/DCIM/A.JPG", None, &CancellationToken::new())
        .await
        .expect("delete failed");
}

#[tokio::test]
async fn test_delete_other_answer_fails() {
    let (server, client, _probe) = common::setup_card_mock().await;
    common::mount_delete(
        &server,
        "/DCIM/A.JPG",
        ResponseTemplate::new(200).set_body_string("ERROR"),
    )
    .await;

    let result = client
        .delete_file("/DCIM/A.JPG", None, &CancellationToken::new())
        .await;
    match result {
        Err(CardError::DeletionFailed { reason, .. }) => assert_eq!(reason, "ERROR"),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn test_delete_with_upload_disabled_fails() {
    let (server, client, _probe) = common::setup_card_mock().await;
    common::mount_delete(&server, "/DCIM/A.JPG", ResponseTemplate::new(404)).await;

    let result = client
        .delete_file("/DCIM/A.JPG", None, &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(CardError::DeletionFailed { .. })));
}
