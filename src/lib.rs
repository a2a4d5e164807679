//! chatrelay - storage adapter for chat events
//!
//! Turns chat metadata syncs and message events into conversation and message
//! rows in a PostgREST store, or into a local SQLite database, behind one
//! `MessageStore` capability set.

pub mod actors;
pub mod config;
pub mod core;
pub mod ingest;
pub mod storage;
pub mod utils;

pub mod api;
pub mod cli;

pub use api::*;
pub use config::Settings;
pub use crate::core::error::{StoreError, StoreResult};
pub use crate::core::models::{IncomingMessage, MediaInfo};
pub use storage::{open_store, MessageStore, WriteOutcome};

use once_cell::sync::OnceCell;
use std::sync::Arc;

static SYSTEM: OnceCell<System> = OnceCell::new();

pub struct System {
    store: Arc<dyn MessageStore>,
}

impl System {
    fn global() -> anyhow::Result<&'static System> {
        SYSTEM
            .get()
            .ok_or_else(|| anyhow::anyhow!("System not initialized. Call init() first"))
    }
}

/// Initialize the system from settings files and the environment
pub async fn init() -> anyhow::Result<()> {
    let settings = Settings::new()?;
    init_with_settings(&settings).await
}

pub async fn init_with_settings(settings: &Settings) -> anyhow::Result<()> {
    let store = open_store(settings).await?;
    init_with_store(store)
}

/// Install an already built backend as the process-wide store
pub fn init_with_store(store: Arc<dyn MessageStore>) -> anyhow::Result<()> {
    let backend = store.backend();
    SYSTEM
        .set(System { store })
        .map_err(|_| anyhow::anyhow!("System already initialized"))?;

    tracing::info!("chatrelay initialized with {} backend", backend);
    Ok(())
}

/// The process-wide store
pub fn store() -> anyhow::Result<Arc<dyn MessageStore>> {
    Ok(System::global()?.store.clone())
}

/// Release backend resources
pub async fn shutdown() -> anyhow::Result<()> {
    if let Some(system) = SYSTEM.get() {
        system.store.close().await?;
    }
    tracing::info!("chatrelay shutdown complete");
    Ok(())
}
