//! devlens daemon - telemetry store, diagnostics and socket server
//!
//! This crate provides the runtime side of devlens:
//! - `store` - the store actor owning the session and error/log stores
//! - `instrument` - adapters that turn host activity into store records
//! - `diagnostics` - assembly of the exportable diagnostic document
//! - `server` - Unix socket server for the probe and CLI clients
//! - `config` - `devlens.toml` loading
//! - `cli` - the `devlensd` command line
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      devlensd daemon                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐    │
//! │  │  DaemonServer   │────▶│        StoreActor           │    │
//! │  │ (Unix Socket)   │     │ (sessions, errors, logs)    │    │
//! │  └────────┬────────┘     └──────────────┬──────────────┘    │
//! │           │                             │                   │
//! │           ▼                             │ events            │
//! │  ┌─────────────────┐                    ▼                   │
//! │  │ Diagnostics     │     ┌─────────────────────────────┐    │
//! │  │ Assembler       │     │   broadcast::Sender         │    │
//! │  └─────────────────┘     └─────────────────────────────┘    │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Production code is panic-free: no `.unwrap()`, `.expect()`, `panic!()`,
//! and channel closure is handled everywhere.

pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod instrument;
pub mod server;
pub mod store;
