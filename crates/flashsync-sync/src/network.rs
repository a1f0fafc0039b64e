//! Network probe adapter for Linux
//!
//! - Availability: any non-loopback interface under `/sys/class/net` whose
//!   operstate is `up`
//! - Card liveness: a short TCP connect to the card's host and port
//! - Active wireless network: the SSID reported by `iwgetid -r`

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use flashsync_core::domain::CardIdentity;
use flashsync_core::ports::INetworkProbe;
use tokio::net::TcpStream;
use tokio::process::Command;
use tracing::debug;
use url::Url;

const SYS_CLASS_NET: &str = "/sys/class/net";
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// [`INetworkProbe`] backed by sysfs, TCP connects and `iwgetid`
#[derive(Debug, Clone)]
pub struct NetworkProbeAdapter {
    host: String,
    port: u16,
    connect_timeout: Duration,
    sys_class_net: PathBuf,
}

impl NetworkProbeAdapter {
    /// Creates a probe for the card behind `remote_root`
    pub fn new(remote_root: &str) -> anyhow::Result<Self> {
        let url = Url::parse(remote_root).context("invalid card root")?;
        let host = url
            .host_str()
            .with_context(|| format!("card root has no host: {remote_root}"))?
            .to_string();
        let port = url.port_or_known_default().unwrap_or(80);

        Ok(Self {
            host,
            port,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            sys_class_net: PathBuf::from(SYS_CLASS_NET),
        })
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Reads interfaces from `dir` instead of `/sys/class/net`
    pub fn with_sys_class_net(mut self, dir: impl Into<PathBuf>) -> Self {
        self.sys_class_net = dir.into();
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    async fn any_interface_up(dir: &Path) -> std::io::Result<bool> {
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name() == "lo" {
                continue;
            }
            let state = tokio::fs::read_to_string(entry.path().join("operstate"))
                .await
                .unwrap_or_default();
            if state.trim() == "up" {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn can_connect(&self) -> bool {
        let connect = TcpStream::connect((self.host.as_str(), self.port));
        match tokio::time::timeout(self.connect_timeout, connect).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!(host = %self.host, port = self.port, error = %e, "Card unreachable");
                false
            }
            Err(_) => {
                debug!(host = %self.host, port = self.port, "Card connect timed out");
                false
            }
        }
    }
}

#[async_trait::async_trait]
impl INetworkProbe for NetworkProbeAdapter {
    async fn is_network_available(&self) -> bool {
        match Self::any_interface_up(&self.sys_class_net).await {
            Ok(up) => up,
            Err(e) => {
                // No sysfs (containers, other platforms): let the request decide
                debug!(error = %e, "Cannot read network interfaces");
                true
            }
        }
    }

    async fn is_link_up(&self, card: Option<&CardIdentity>) -> bool {
        if let Some(ssid) = card
            .filter(|c| c.is_wireless_connected())
            .and_then(CardIdentity::ssid)
        {
            if !self.is_wireless_connected(ssid).await {
                return false;
            }
        }
        self.can_connect().await
    }

    async fn is_wireless_connected(&self, ssid: &str) -> bool {
        let output = match Command::new("iwgetid").arg("-r").output().await {
            Ok(output) if output.status.success() => output,
            Ok(_) => return false,
            Err(e) => {
                debug!(error = %e, "iwgetid unavailable");
                return false;
            }
        };
        String::from_utf8_lossy(&output.stdout).trim() == ssid
    }
}
