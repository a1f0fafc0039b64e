//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the domain core
//! depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`ILocalStorage`] - Local copies: existence, writes, timestamps, recycling
//! - [`INetworkProbe`] - Link liveness and active wireless network checks
//! - [`IImageInspector`] - EXIF date and thumbnail extraction
//! - [`ProgressSink`] - Download progress reporting

pub mod image_inspector;
pub mod local_storage;
pub mod network_probe;
pub mod progress;

pub use image_inspector::IImageInspector;
pub use local_storage::{FileSystemState, FileTimes, ILocalStorage};
pub use network_probe::INetworkProbe;
pub use progress::{ProgressInfo, ProgressSink};
