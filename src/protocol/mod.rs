//! RESP Protocol Implementation
//!
//! The client half of the Redis Serialization Protocol (RESP2): encoding
//! commands and parsing the replies that come back.
//!
//! ## Modules
//!
//! - `types`: the `RespValue` reply enum and its serialization
//! - `parser`: incremental parser for replies read off a socket
//! - `command`: command encoder
//!
//! ## Example
//!
//! ```
//! use flashpool::protocol::{encode_command, parse_message, RespValue};
//! use bytes::Bytes;
//!
//! let mut request = Vec::new();
//! encode_command("GET", &[Bytes::from("name")], &mut request);
//!
//! let (reply, _) = parse_message(b"$4\r\nAriz\r\n").unwrap().unwrap();
//! assert_eq!(reply, RespValue::bulk_string(Bytes::from("Ariz")));
//! ```

pub mod command;
pub mod parser;
pub mod types;

pub use command::encode_command;
pub use parser::{parse_message, ParseError, ParseResult, RespParser};
pub use types::RespValue;
