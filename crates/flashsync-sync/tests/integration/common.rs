//! Shared test helpers for orchestrator integration tests
//!
//! `Harness` wires a [`SyncOrchestrator`] to a wiremock card, the real local
//! storage adapter inside a temp directory and a controllable network probe.

use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use flashsync_card::{CardClient, TransferPolicy};
use flashsync_core::{
    config::ConfigBuilder,
    domain::{CardIdentity, FileStatus},
    ports::INetworkProbe,
};
use flashsync_sync::{
    filesystem::LocalStorageAdapter, images::ImageInspector, OperationStatus, StopHandle,
    SyncEvent, SyncOrchestrator,
};
use tempfile::TempDir;
use tokio::sync::mpsc;
use wiremock::{
    matchers::{method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

/// Firmware new enough for CID, write timestamp and upload queries
pub const FIRMWARE: &str = "FlashAir 3.00.00";
pub const CID: &str = "02544d53573038470000000000000000";
pub const SSID: &str = "flashair_home";

/// 2016-09-17 in FAT date encoding
pub const FAT_DATE: u16 = (36 << 9) | (9 << 5) | 17;
pub const DAY_FOLDER: &str = "20160917";
pub const PHOTO_DIR: &str = "/DCIM/100__TSB";

/// Probe whose answers the test controls
pub struct MockProbe {
    pub network: AtomicBool,
    pub link_up: AtomicBool,
    /// Stopped from inside the next network availability check
    pub stop_on_network_check: Mutex<Option<StopHandle>>,
}

impl MockProbe {
    pub fn new() -> Self {
        Self {
            network: AtomicBool::new(true),
            link_up: AtomicBool::new(true),
            stop_on_network_check: Mutex::new(None),
        }
    }

    /// Calls `stop_work` on `stop` while the next run checks the network
    pub fn stop_during_network_check(&self, stop: StopHandle) {
        *self.stop_on_network_check.lock().unwrap() = Some(stop);
    }

    pub fn set_network(&self, available: bool) {
        self.network.store(available, Ordering::SeqCst);
    }

    pub fn set_link_up(&self, up: bool) {
        self.link_up.store(up, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl INetworkProbe for MockProbe {
    async fn is_network_available(&self) -> bool {
        let stop = self.stop_on_network_check.lock().unwrap().take();
        if let Some(stop) = stop {
            stop.stop_work();
        }
        self.network.load(Ordering::SeqCst)
    }

    async fn is_link_up(&self, _card: Option<&CardIdentity>) -> bool {
        self.link_up.load(Ordering::SeqCst)
    }

    async fn is_wireless_connected(&self, _ssid: &str) -> bool {
        false
    }
}

pub fn fast_policy() -> TransferPolicy {
    TransferPolicy {
        timeout: Duration::from_secs(1),
        monitor_interval: Duration::from_millis(50),
        max_attempts: 3,
        retry_delay: Duration::from_millis(10),
        buffer_size: 64 * 1024,
    }
}

pub struct Harness {
    pub server: MockServer,
    pub orchestrator: SyncOrchestrator,
    pub events: mpsc::UnboundedReceiver<SyncEvent>,
    pub probe: Arc<MockProbe>,
    pub dir: TempDir,
}

impl Harness {
    /// Default settings with instant copy off
    pub async fn new() -> Self {
        Self::with_config(|builder| builder).await
    }

    pub async fn with_config(configure: impl FnOnce(ConfigBuilder) -> ConfigBuilder) -> Self {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let probe = Arc::new(MockProbe::new());
        let root = format!("{}/", server.uri());

        let builder = ConfigBuilder::new()
            .remote_root(root.clone())
            .local_folder(dir.path().join("pictures"))
            .recycle_folder(dir.path().join("recycle"))
            .instant_copy(false);
        let config = configure(builder).build();

        let client = CardClient::with_policy(&root, fast_policy(), probe.clone()).unwrap();
        let storage = LocalStorageAdapter::new(config.sync.recycle_folder());
        let (orchestrator, events) = SyncOrchestrator::new(
            &config,
            Arc::new(client),
            Arc::new(storage),
            Arc::new(ImageInspector),
            probe.clone(),
        );

        Self {
            server,
            orchestrator,
            events,
            probe,
            dir,
        }
    }

    /// Where a photo named `name` lands locally
    pub fn local_path(&self, name: &str) -> PathBuf {
        self.dir
            .path()
            .join("pictures")
            .join(DAY_FOLDER)
            .join(lowercase_extension(name))
    }

    pub fn recycle_dir(&self) -> PathBuf {
        self.dir.path().join("recycle")
    }

    pub fn write_local(&self, name: &str, size: usize) -> PathBuf {
        let path = self.local_path(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, vec![0u8; size]).unwrap();
        path
    }

    pub fn status_of(&self, name: &str) -> Option<FileStatus> {
        self.orchestrator
            .catalog()
            .get(&photo_path(name))
            .map(|e| e.status())
    }

    /// Every status published so far
    pub fn drain_statuses(&mut self) -> Vec<OperationStatus> {
        self.drain_events()
            .into_iter()
            .filter_map(|event| match event {
                SyncEvent::Status(status) => Some(status),
                _ => None,
            })
            .collect()
    }

    pub fn drain_events(&mut self) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

pub fn photo_path(name: &str) -> String {
    format!("{PHOTO_DIR}/{name}")
}

fn lowercase_extension(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) => format!("{stem}.{}", ext.to_lowercase()),
        None => name.to_string(),
    }
}

// ============================================================================
// Card endpoints
// ============================================================================

/// Mounts a `command.cgi?op=<op>` endpoint answering `body`
pub async fn mount_command(server: &MockServer, op: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path("/command.cgi"))
        .and(query_param("op", op))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

/// Mounts firmware, CID, SSID, write timestamp and upload parameters
pub async fn mount_identity(server: &MockServer, cid: &str, write_timestamp: i64) {
    mount_command(server, "108", FIRMWARE).await;
    mount_command(server, "120", cid).await;
    mount_command(server, "104", SSID).await;
    mount_command(server, "121", &write_timestamp.to_string()).await;
    mount_command(server, "118", "1").await;
}

async fn mount_listing(server: &MockServer, dir: &str, lines: &[String]) {
    let body = format!("WLANSD_FILELIST\r\n{}\r\n", lines.join("\r\n"));
    Mock::given(method("GET"))
        .and(path("/command.cgi"))
        .and(query_param("op", "100"))
        .and(query_param("DIR", dir))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

/// Mounts a card holding `photos` (name, size) under [`PHOTO_DIR`]
pub async fn mount_photos(server: &MockServer, photos: &[(&str, u64)]) {
    mount_listing(server, "/", &[format!(",DCIM,0,16,{FAT_DATE},0")]).await;
    mount_listing(server, "/DCIM", &[format!("/DCIM,100__TSB,0,16,{FAT_DATE},0")]).await;

    let lines: Vec<String> = photos
        .iter()
        .map(|(name, size)| format!("{PHOTO_DIR},{name},{size},32,{FAT_DATE},32768"))
        .collect();
    mount_listing(server, PHOTO_DIR, &lines).await;
}

/// Mounts a standard card: identity plus `photos`
pub async fn mount_card(server: &MockServer, photos: &[(&str, u64)]) {
    mount_identity(server, CID, 100).await;
    mount_photos(server, photos).await;
}

/// Mounts the download of `name` and expects `calls` requests
pub async fn mount_download(server: &MockServer, name: &str, response: ResponseTemplate, calls: u64) {
    Mock::given(method("GET"))
        .and(path(photo_path(name)))
        .respond_with(response)
        .expect(calls)
        .mount(server)
        .await;
}
