//! flashsync Core - Domain logic and business rules
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `CardIdentity`, `FileEntry`, `TargetFilter`
//! - **Port definitions** - Traits for adapters: `ILocalStorage`, `INetworkProbe`,
//!   `IImageInspector`, `ProgressSink`
//! - **Configuration** - YAML-backed `Config` with validation and a builder
//!
//! # Architecture
//!
//! The domain module contains pure logic with no I/O. Ports define trait
//! interfaces that the sync crate and the daemon implement.

pub mod config;
pub mod domain;
pub mod ports;
