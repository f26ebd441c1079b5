//! HTTP binding of the upload transport.
//!
//! [`HttpTransport`] maps each [`Transport`](chunkup_uploader::Transport)
//! operation onto the endpoint's REST routes with `reqwest`.

pub mod client;

pub use client::{Error, HttpTransport};
