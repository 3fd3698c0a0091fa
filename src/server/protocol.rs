//! Line Protocol
//!
//! Parses one request line and runs it against the cache.
//!
//! ```text
//! PUT key value [ttlMs]   -> OK | ERROR_USAGE_PUT
//! GET key                 -> VALUE <value> | NOT_FOUND | ERROR_USAGE_GET
//! ```

use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use tracing::warn;

use crate::cache::ShardedCache;

// == Command ==
/// A well-formed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Put {
        key: String,
        value: String,
        ttl_ms: u64,
    },
    Get {
        key: String,
    },
}

// == Response ==
/// Every reply the server can send, one per line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Ok,
    Value(String),
    NotFound,
    UsagePut,
    UsageGet,
    UnknownCommand,
    EmptyCommand,
    Internal(String),
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Ok => f.write_str("OK"),
            Response::Value(value) => write!(f, "VALUE {value}"),
            Response::NotFound => f.write_str("NOT_FOUND"),
            Response::UsagePut => f.write_str("ERROR_USAGE_PUT"),
            Response::UsageGet => f.write_str("ERROR_USAGE_GET"),
            Response::UnknownCommand => f.write_str("ERROR_UNKNOWN_COMMAND"),
            Response::EmptyCommand => f.write_str("ERROR_EMPTY_COMMAND"),
            Response::Internal(msg) => write!(f, "ERROR_INTERNAL {msg}"),
        }
    }
}

// == Parse ==
/// Parses a request line; malformed input yields the error reply directly.
///
/// The command keyword is case-insensitive. For `PUT`, the text after the
/// key is split once more at its first space; if what follows parses as an
/// integer it is the TTL in milliseconds, otherwise the whole text is the
/// value. A negative TTL means no expiry.
pub fn parse(line: &str) -> Result<Command, Response> {
    let line = line.trim();
    if line.is_empty() {
        return Err(Response::EmptyCommand);
    }

    let (command, rest) = split_once_space(line);
    let (key, tail) = match rest {
        Some(rest) => {
            let (key, tail) = split_once_space(rest);
            (Some(key), tail)
        }
        None => (None, None),
    };

    match command.to_ascii_uppercase().as_str() {
        "PUT" => {
            let (Some(key), Some(tail)) = (key, tail) else {
                return Err(Response::UsagePut);
            };
            let (value, ttl_ms) = match split_once_space(tail) {
                (value, Some(ttl)) => match ttl.parse::<i64>() {
                    Ok(ttl) => (value, u64::try_from(ttl).unwrap_or(0)),
                    Err(_) => (tail, 0),
                },
                (value, None) => (value, 0),
            };
            if key.is_empty() || value.is_empty() {
                return Err(Response::UsagePut);
            }
            Ok(Command::Put {
                key: key.to_string(),
                value: value.to_string(),
                ttl_ms,
            })
        }
        "GET" => match key {
            Some(key) if !key.is_empty() => Ok(Command::Get {
                key: key.to_string(),
            }),
            _ => Err(Response::UsageGet),
        },
        _ => Err(Response::UnknownCommand),
    }
}

fn split_once_space(s: &str) -> (&str, Option<&str>) {
    match s.split_once(' ') {
        Some((head, tail)) => (head, Some(tail)),
        None => (s, None),
    }
}

// == Execute ==
/// Parses and runs `line`, returning the reply to send.
///
/// A panic while executing a valid command is reported as
/// `ERROR_INTERNAL <message>` rather than tearing down the connection.
pub fn execute(cache: &ShardedCache<String, String>, line: &str) -> Response {
    let command = match parse(line) {
        Ok(command) => command,
        Err(response) => return response,
    };

    let result = panic::catch_unwind(AssertUnwindSafe(|| match command {
        Command::Put { key, value, ttl_ms } => {
            cache.put(key, value, ttl_ms);
            Response::Ok
        }
        Command::Get { key } => match cache.get(&key) {
            Some(value) => Response::Value(value),
            None => Response::NotFound,
        },
    }));

    result.unwrap_or_else(|payload| {
        let msg = payload
            .downcast_ref::<&'static str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown error".to_string());
        warn!("Error processing command {:?}: {}", line.trim(), msg);
        Response::Internal(msg)
    })
}
