//! Shared test helpers for card integration tests
//!
//! Each helper mounts CGI endpoints on a wiremock server; `setup_card_mock`
//! returns a client pointed at it with short timeouts.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use flashsync_card::{CardClient, TransferPolicy};
use flashsync_core::{domain::CardIdentity, ports::INetworkProbe};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
};
use wiremock::{
    matchers::{method, path, query_param},
    Match, Mock, MockServer, Request, ResponseTemplate,
};

/// Probe whose answers the test controls
pub struct MockProbe {
    pub network: AtomicBool,
    pub link_up: AtomicBool,
    pub wireless: AtomicBool,
}

impl MockProbe {
    pub fn new() -> Self {
        Self {
            network: AtomicBool::new(true),
            link_up: AtomicBool::new(true),
            wireless: AtomicBool::new(true),
        }
    }

    pub fn set_link_up(&self, up: bool) {
        self.link_up.store(up, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl INetworkProbe for MockProbe {
    async fn is_network_available(&self) -> bool {
        self.network.load(Ordering::SeqCst)
    }

    async fn is_link_up(&self, _card: Option<&CardIdentity>) -> bool {
        self.link_up.load(Ordering::SeqCst)
    }

    async fn is_wireless_connected(&self, _ssid: &str) -> bool {
        self.wireless.load(Ordering::SeqCst)
    }
}

/// One second timeouts and a tight monitor, so failures surface quickly
pub fn fast_policy() -> TransferPolicy {
    TransferPolicy {
        timeout: Duration::from_secs(1),
        monitor_interval: Duration::from_millis(50),
        max_attempts: 3,
        retry_delay: Duration::from_millis(10),
        buffer_size: 64 * 1024,
    }
}

pub async fn setup_card_mock() -> (MockServer, CardClient, Arc<MockProbe>) {
    let server = MockServer::start().await;
    let probe = Arc::new(MockProbe::new());
    let root = format!("{}/", server.uri());
    let client =
        CardClient::with_policy(&root, fast_policy(), probe.clone()).expect("client setup failed");
    (server, client, probe)
}

/// Serves a single response from a raw socket, for bodies wiremock cannot
/// produce.
///
/// The response declares `declared` bytes but only sends `body`. The
/// connection then stays open for `hold` and closes. Returns a client for
/// the socket together with its probe.
pub async fn setup_raw_card(
    declared: usize,
    body: Vec<u8>,
    hold: Duration,
) -> (CardClient, Arc<MockProbe>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();

        let mut request = Vec::new();
        let mut buffer = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let read = socket.read(&mut buffer).await.unwrap();
            if read == 0 {
                return;
            }
            request.extend_from_slice(&buffer[..read]);
        }

        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {declared}\r\nConnection: close\r\n\r\n"
        );
        socket.write_all(head.as_bytes()).await.unwrap();
        socket.write_all(&body).await.unwrap();
        socket.flush().await.unwrap();

        tokio::time::sleep(hold).await;
        let _ = socket.shutdown().await;
    });

    let probe = Arc::new(MockProbe::new());
    let client = CardClient::with_policy(&format!("http://{addr}/"), fast_policy(), probe.clone())
        .expect("client setup failed");
    (client, probe)
}

/// Mounts a `command.cgi?op=<op>` endpoint answering `body`
pub async fn mount_command(server: &MockServer, op: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path("/command.cgi"))
        .and(query_param("op", op))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

/// Mounts a directory listing for `dir`
pub async fn mount_listing(server: &MockServer, dir: &str, lines: &[&str]) {
    let body = format!("WLANSD_FILELIST\r\n{}\r\n", lines.join("\r\n"));
    Mock::given(method("GET"))
        .and(path("/command.cgi"))
        .and(query_param("op", "100"))
        .and(query_param("DIR", dir))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

/// Mounts a plain file download
pub async fn mount_file(server: &MockServer, remote_path: &str, content: &[u8]) {
    Mock::given(method("GET"))
        .and(path(remote_path))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(content.to_vec()))
        .mount(server)
        .await;
}

/// Matches `thumbnail.cgi?<path>`, whose query has no key
pub struct RawQuery(pub String);

impl Match for RawQuery {
    fn matches(&self, request: &Request) -> bool {
        request.url.query() == Some(self.0.as_str())
    }
}

pub async fn mount_thumbnail(server: &MockServer, remote_path: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/thumbnail.cgi"))
        .and(RawQuery(remote_path.to_string()))
        .respond_with(response)
        .mount(server)
        .await;
}

pub async fn mount_delete(server: &MockServer, remote_path: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/upload.cgi"))
        .and(query_param("DEL", remote_path))
        .respond_with(response)
        .mount(server)
        .await;
}
