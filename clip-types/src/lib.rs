//! # clip-types
//!
//! Wire format types for the clipsync clipboard relay protocol.
//!
//! This crate provides the foundational types shared by the relay and the client:
//! - [`UserId`], [`DeviceId`] - Identity types
//! - [`Envelope`] - The JSON message wrapper exchanged over the WebSocket
//! - [`Hello`], [`Clip`] - Handshake and clipboard payloads
//! - [`RecentIds`] - Bounded FIFO set used for duplicate and echo suppression
//! - [`WireError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod envelope;
mod error;
mod ids;
mod messages;
mod recent;

pub use envelope::{Envelope, MessageType};
pub use error::WireError;
pub use ids::{DeviceId, UserId, MAX_DEVICE_ID_LEN};
pub use messages::{Clip, Hello, DEFAULT_MIME, MAX_INLINE_BYTES};
pub use recent::RecentIds;
