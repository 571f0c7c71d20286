//! # clipsync-relay
//!
//! Real-time clipboard relay server for clipsync.
//!
//! This crate implements a relay server that:
//! - Accepts WebSocket connections from a user's devices
//! - Authenticates each connection with a static or HMAC-signed token
//! - Fans each clipboard change out to the user's other online devices
//! - Stores clips too large to carry inline as downloadable blobs
//! - Never persists clips beyond the delivery attempt
//!
//! ## Architecture
//!
//! ```text
//! Device A ──┐                       ┌── Device B
//!            │   WebSocket (JSON)    │
//!            ├──────────────────────►│
//!            │                       │
//!        ┌───┴───────────────────────┴───┐
//!        │         clipsync-relay        │
//!        │  validate → dedupe → rate     │
//!        │  limit → broadcast            │
//!        │  ┌─────────────────────────┐  │
//!        │  │  uploads dir (blobs)    │  │
//!        │  └─────────────────────────┘  │
//!        └───────────────────────────────┘
//! ```
//!
//! ## Protocol
//!
//! Every frame is a JSON envelope:
//! - `hello` (first frame, once): token, user id, device id
//! - `clip`: inline base64 data or an `upload_url`, relayed with `from` set
//!   to the sender's device id

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod auth;
pub mod broadcast;
pub mod config;
pub mod dedupe;
pub mod error;
pub mod http;
pub mod limits;
pub mod metrics;
pub mod registry;
pub mod server;
pub mod session;
pub mod storage;
pub mod validation;

pub use config::Config;
pub use server::ClipRelay;
