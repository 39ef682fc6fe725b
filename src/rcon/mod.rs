//! Minecraft remote-console (RCON) protocol client.
//!
//! - [`codec`]: wire framing for `tokio_util::codec::Framed`.
//! - [`backoff`]: reconnect delay schedule.
//! - [`client`]: the persistent, self-healing connection.
//! - [`telemetry`]: lenient parsers for `tps` and `list` replies.

pub mod backoff;
pub mod client;
pub mod codec;
pub mod telemetry;

pub use client::{ConnectionState, RconClient};
