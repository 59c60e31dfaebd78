//! # gatelink-protocol
//!
//! Wire-level vocabulary for the gateway protocol:
//!
//! - **[`Frame`]**: the tagged union of messages exchanged over the socket
//!   (`req` / `res` / `event`)
//! - **Codec**: [`encode`] / [`decode`] between frames and UTF-8 JSON text,
//!   with [`DecodeError`] for malformed input
//! - **Handshake**: [`handshake::ConnectParams`] and friends — the typed
//!   payload the client sends in answer to the server's connect challenge
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by `gatelink-client`; has no async or I/O
//! dependencies of its own.

#![deny(unsafe_code)]

pub mod codec;
pub mod frame;
pub mod handshake;

pub use codec::{DecodeError, decode, encode};
pub use frame::{CHALLENGE_EVENT, CONNECT_METHOD, ErrorBody, Frame, INVOKE_METHOD};
