//! Network probe port
//!
//! The card is a radio device: a read can hang forever after the access
//! point disappears without the TCP stack noticing. The transfer layer polls
//! this probe while a request is in flight so it can give up early and report
//! a lost connection instead of a plain timeout.

use crate::domain::CardIdentity;

/// Connectivity checks against the card
#[async_trait::async_trait]
pub trait INetworkProbe: Send + Sync {
    /// Whether any network is available at all
    async fn is_network_available(&self) -> bool;

    /// Whether the card is still reachable.
    ///
    /// When `card` is known to be reached over its own wireless network,
    /// implementations should also confirm that network is still active.
    async fn is_link_up(&self, card: Option<&CardIdentity>) -> bool;

    /// Whether `ssid` is the currently active wireless network
    async fn is_wireless_connected(&self, ssid: &str) -> bool;
}
