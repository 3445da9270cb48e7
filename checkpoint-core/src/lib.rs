//! # Checkpoint Core
//!
//! Core library of the site-access checkpoint client. A guard scans the
//! 2-D barcode of a national ID; the client extracts the document number,
//! validates the bearer against the access registry and records an
//! entry/exit event for the establishment.
//!
//! ## Architecture
//!
//! - [`payload`]: barcode payload parsing into an identity record
//! - [`frame`]: camera frame intake, throttling, device tiers and the decode worker
//! - [`auth`]: credential persistence and single-flight token refresh
//! - [`gateway`]: registry transport contract and the refresh-and-replay layer
//! - [`validation`]: scan gate, response reducers and the scan state machine
//! - [`history`]: paginated event history
//! - [`session`]: the control task tying the pieces together
//!
//! Data flows camera frame → [`frame::FramePipeline`] → raw payload →
//! [`payload::parse`] → [`validation::Orchestrator`] → registry → outcome →
//! [`history::HistoryFeed`].

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]

pub mod auth;
pub mod error;
pub mod frame;
pub mod gateway;
pub mod history;
pub mod payload;
pub mod session;
pub mod validation;

pub use error::{CheckpointError, Result};
pub use session::{CheckpointSession, SessionEvent, SessionSettings};
