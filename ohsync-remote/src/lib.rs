//! Open Humans HTTP adapter.
//!
//! [`OhClient`] implements [`ohsync_sync::RemoteStore`] over the
//! direct-sharing API and lists public data; [`HttpFetcher`] streams
//! downloads for the transfer pool.

mod client;
mod public;
mod wire;

pub use client::{Credential, HttpFetcher, OhClient};
