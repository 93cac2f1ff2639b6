//! Command Encoding
//!
//! Clients always send commands as a RESP array of bulk strings, so the
//! encoder only needs one shape. Arguments are raw bytes; callers that hold
//! numbers or text convert them with `Bytes::from(...)` first.

use crate::protocol::types::{prefix, CRLF};
use bytes::Bytes;

/// Appends `name args...` to `out` as a RESP array of bulk strings.
///
/// # Example
///
/// ```
/// use flashpool::protocol::encode_command;
/// use bytes::Bytes;
///
/// let mut buf = Vec::new();
/// encode_command("GET", &[Bytes::from("name")], &mut buf);
/// assert_eq!(buf, b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n");
/// ```
pub fn encode_command(name: &str, args: &[Bytes], out: &mut Vec<u8>) {
    out.push(prefix::ARRAY);
    out.extend_from_slice((args.len() + 1).to_string().as_bytes());
    out.extend_from_slice(CRLF);
    push_bulk(out, name.as_bytes());
    for arg in args {
        push_bulk(out, arg);
    }
}

fn push_bulk(out: &mut Vec<u8>, data: &[u8]) {
    out.push(prefix::BULK_STRING);
    out.extend_from_slice(data.len().to_string().as_bytes());
    out.extend_from_slice(CRLF);
    out.extend_from_slice(data);
    out.extend_from_slice(CRLF);
}
