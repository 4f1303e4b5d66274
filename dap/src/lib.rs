//! # CASL II / COMET II Debug Adapter Protocol server
//!
//! A length-prefixed JSON-over-TCP session (spec §4.7, §5, §6) built on top
//! of the `casl2` assembler/VM library. `session::handle_connection` is
//! generic over the stream so tests can drive it over an in-process duplex
//! pipe instead of a real socket.

pub mod codec;
pub mod error;
pub mod protocol;
pub mod session;

pub use session::handle_connection;
