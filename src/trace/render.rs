//! Reply Rendering for Trace Records
//!
//! Log records carry a short textual form of a reply instead of the raw
//! RESP value. Binary payloads are rendered lossily as UTF-8.

use crate::protocol::RespValue;
use bytes::Bytes;
use std::fmt;

/// Textual form of a reply, tagged by the shape it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered {
    /// Status reply such as `OK`
    Text(String),
    /// Bulk string payload
    Blob(String),
    /// Bulk/status elements of an array, in order
    List(Vec<String>),
    /// Anything else, in its generic textual form
    Other(String),
}

impl fmt::Display for Rendered {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rendered::Text(s) | Rendered::Blob(s) | Rendered::Other(s) => f.write_str(s),
            Rendered::List(items) => write!(f, "{:?}", items),
        }
    }
}

/// Renders a reply for logging.
///
/// Array elements that are neither bulk nor status strings are left out
/// of the list.
///
/// ```
/// use flashpool::protocol::RespValue;
/// use flashpool::trace::{render, Rendered};
/// use bytes::Bytes;
///
/// assert_eq!(render(&RespValue::bulk_string(Bytes::from("OK"))).to_string(), "OK");
/// assert_eq!(render(&RespValue::integer(42)), Rendered::Other("42".to_string()));
/// ```
pub fn render(reply: &RespValue) -> Rendered {
    match reply {
        RespValue::SimpleString(s) => Rendered::Text(s.clone()),
        RespValue::BulkString(data) => Rendered::Blob(lossy(data)),
        RespValue::Array(items) => Rendered::List(
            items
                .iter()
                .filter_map(|item| match item {
                    RespValue::BulkString(data) => Some(lossy(data)),
                    RespValue::SimpleString(s) => Some(s.clone()),
                    _ => None,
                })
                .collect(),
        ),
        RespValue::Integer(n) => Rendered::Other(n.to_string()),
        RespValue::Null => Rendered::Other("(nil)".to_string()),
        RespValue::Error(msg) => Rendered::Other(msg.clone()),
    }
}

/// Renders command arguments as a list of text.
pub fn render_args(args: &[Bytes]) -> Rendered {
    Rendered::List(args.iter().map(|arg| lossy(arg)).collect())
}

fn lossy(data: &[u8]) -> String {
    String::from_utf8_lossy(data).into_owned()
}
