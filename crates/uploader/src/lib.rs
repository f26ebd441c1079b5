//! Resumable, chunked file uploads through a single transfer slot.
//!
//! This crate holds the **upload protocol and scheduling** logic. It has no
//! HTTP dependency: callers inject a [`Transport`] implementation that
//! reaches the remote endpoint.
//!
//! # Pieces
//!
//! 1. **Engine** ([`ChunkedUpload`]) drives one file through
//!    create → chunk loop → finish, adapting the chunk length to network
//!    conditions and always adopting the server's offset.
//! 2. **Executor** ([`Executor`]) hosts at most one engine and talks to the
//!    scheduler through [`SyncRequest`] / [`ExecutorEvent`] messages only.
//!    [`BackgroundExecutor`] runs on tokio tasks, [`InlineExecutor`] runs on
//!    the caller's task for deterministic tests.
//! 3. **Scheduler** ([`UploadScheduler`]) owns the queue, ticks the executor
//!    and folds progress reports back into queue state.
//! 4. **Manager** ([`UploadManager`]) pairs the scheduler with the transport
//!    for server-side cleanup and startup rehydration.

pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod manager;
pub mod memory;
pub mod scheduler;
pub mod status;
pub mod transport;
pub mod types;
mod worker;

// Re-export primary types for convenience.
pub use config::UploaderConfig;
pub use engine::{ChunkedUpload, EngineState, ReportFn};
pub use error::UploadError;
pub use executor::{BackgroundExecutor, Executor, InlineExecutor, MessageHandler};
pub use manager::UploadManager;
pub use memory::{EndpointCall, MemoryEndpoint, Scripted};
pub use scheduler::{StatusCallback, UploadScheduler};
pub use status::{StatusClass, StatusPolicy};
pub use transport::{Response, Transport, TransportError, TransportFuture};
pub use types::{ErrorReport, ExecutorEvent, ProgressReport, SyncRequest, UploadEntry};
