//! clinicnote-core - Core library for ClinicNote
//!
//! This crate contains the offline-first client engine: a local
//! persistent document store, a connectivity monitor, a typed remote
//! data gateway, and the sync engine that reconciles the two. The UI
//! layers (and the CLI) build on top of it.

pub mod config;
pub mod connectivity;
pub mod db;
pub mod error;
pub mod gateway;
pub mod models;
pub mod notifier;
pub mod store;
pub mod sync;
pub mod util;

pub use config::ClientConfig;
pub use error::{Error, Result};
pub use models::{DocumentKey, EntityType, LocalDocument};
pub use store::DocumentStore;
pub use sync::SyncEngine;
