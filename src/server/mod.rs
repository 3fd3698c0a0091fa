//! Cache Server Module
//!
//! Newline-delimited text protocol over TCP.

pub mod protocol;
mod tcp;

pub use protocol::{execute, parse, Command, Response};
pub use tcp::{serve, MAX_LINE_LEN};
