//! Command-line checkpoint client.
//!
//! Wires the core session to the real world: a reqwest client for the
//! access registry, a file-backed credential store, host probing, an image
//! directory standing in for the camera and an external barcode reader.

pub mod cli;
pub mod decoder;
pub mod frames;
pub mod host;
pub mod infrastructure;
pub mod storage;

pub use infrastructure::{ApiClient, ClientRoles};
pub use storage::FileStore;
