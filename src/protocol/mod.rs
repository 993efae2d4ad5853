//! Client-server communication protocol.
//!
//! This module defines the wire layer shared by sessions and the reference server: the
//! request and reply frame types, their binary encoding, and the channels frames travel on.
//!
//! # Binary Format
//!
//! - Every frame starts with a 4-byte big-endian payload length, capped at
//!   [`MAX_FRAME_LEN`].
//! - The payload is one [`Request`] or one [`ServerMessage`], encoded with `bincode` using
//!   big-endian fixed-width integers. Trailing bytes after the message are rejected.
//!
//! # Replies
//!
//! Each request is answered by exactly one reply, made of one or more [`ServerMessage`]
//! frames:
//!
//! ```text
//! ack:      Notice* Ok
//! failure:  Notice* Error
//! rows:     Notice* ColumnMeta (Row | Notice)* FetchDone Notice* StatementOk
//! docs:     Notice* DocumentStart (Document | Notice)* FetchDone Notice* StatementOk
//! ```
//!
//! A stream may be cut short by `Error` anywhere after its header. `Closed` answers
//! [`Request::Close`] only.
//!
//! # Reference Server
//!
//! [`Catalog`] keeps schemas, tables, views and collections in memory and answers every
//! request with a complete reply. [`CatalogServer`] serves it over TCP;
//! [`LoopbackChannel`] serves it in-process.
mod catalog;
mod channel;
mod loopback;
mod request;
pub(crate) mod response;
mod server;
pub mod statement;
mod thread;
mod transport;

use thread::ThreadPool;

pub use catalog::Catalog;
pub use channel::{MAX_FRAME_LEN, StreamChannel, WireChannel};
pub use loopback::LoopbackChannel;
pub use request::{ObjectKind, Request};
pub use response::{ServerMessage, Status, Warning, WarningLevel};
pub use server::CatalogServer;
pub use transport::{ProtocolTransport, TransportError, decode, encode};
