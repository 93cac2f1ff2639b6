//! Reply Adapters
//!
//! Helpers that turn the result of `execute`/`receive` into a concrete type:
//!
//! ```ignore
//! let hits = reply::int(conn.execute("INCR", &[Bytes::from("hits")]).await)?;
//! let name = reply::string(conn.execute("GET", &[Bytes::from("name")]).await)?;
//! ```
//!
//! Every adapter passes an upstream error through unchanged, turns a null
//! reply into [`PoolError::Nil`] and anything of the wrong shape into
//! [`PoolError::UnexpectedReply`].

use crate::error::{PoolError, PoolResult};
use crate::protocol::RespValue;
use bytes::Bytes;
use std::collections::HashMap;
use std::str::FromStr;

fn kind(value: &RespValue) -> &'static str {
    match value {
        RespValue::SimpleString(_) => "simple string",
        RespValue::Error(_) => "error",
        RespValue::Integer(_) => "integer",
        RespValue::BulkString(_) => "bulk string",
        RespValue::Null => "null",
        RespValue::Array(_) => "array",
    }
}

fn unexpected(target: &str, value: &RespValue) -> PoolError {
    PoolError::UnexpectedReply(format!("expected {}, got {}", target, kind(value)))
}

/// Strips the cases every adapter handles the same way.
fn checked(reply: PoolResult<RespValue>) -> PoolResult<RespValue> {
    let value = reply?;
    if value.is_null() {
        return Err(PoolError::Nil);
    }
    match value {
        RespValue::Error(msg) => Err(PoolError::Server(msg)),
        value => Ok(value),
    }
}

fn parse_text<T: FromStr>(data: &[u8], target: &str) -> PoolResult<T> {
    std::str::from_utf8(data)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| {
            PoolError::UnexpectedReply(format!(
                "invalid {} {:?}",
                target,
                String::from_utf8_lossy(data)
            ))
        })
}

fn parse_bool(data: &[u8]) -> PoolResult<bool> {
    match data {
        b"1" | b"t" | b"T" | b"TRUE" | b"true" | b"True" => Ok(true),
        b"0" | b"f" | b"F" | b"FALSE" | b"false" | b"False" => Ok(false),
        _ => Err(PoolError::UnexpectedReply(format!(
            "invalid boolean {:?}",
            String::from_utf8_lossy(data)
        ))),
    }
}

fn text(value: RespValue, target: &str) -> PoolResult<String> {
    match value {
        RespValue::SimpleString(s) => Ok(s),
        RespValue::BulkString(data) => String::from_utf8(data.to_vec())
            .map_err(|_| PoolError::UnexpectedReply(format!("{} is not valid UTF-8", target))),
        other => Err(unexpected(target, &other)),
    }
}

fn integer(value: &RespValue) -> PoolResult<i64> {
    match value {
        RespValue::Integer(n) => Ok(*n),
        RespValue::BulkString(data) => parse_text(data, "integer"),
        other => Err(unexpected("integer", other)),
    }
}

fn array(reply: PoolResult<RespValue>) -> PoolResult<Vec<RespValue>> {
    match checked(reply)? {
        RespValue::Array(values) => Ok(values),
        other => Err(unexpected("array", &other)),
    }
}

fn pairs<V>(
    reply: PoolResult<RespValue>,
    value: impl Fn(RespValue) -> PoolResult<V>,
) -> PoolResult<HashMap<String, V>> {
    let values = array(reply)?;
    if values.len() % 2 != 0 {
        return Err(PoolError::UnexpectedReply(
            "map reply has an odd number of elements".to_string(),
        ));
    }

    let mut map = HashMap::with_capacity(values.len() / 2);
    let mut iter = values.into_iter();
    while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
        let key = match k {
            RespValue::BulkString(_) | RespValue::SimpleString(_) => text(k, "map key")?,
            other => return Err(unexpected("bulk string key", &other)),
        };
        map.insert(key, value(v)?);
    }
    Ok(map)
}

pub fn int(reply: PoolResult<RespValue>) -> PoolResult<i64> {
    integer(&checked(reply)?)
}

pub fn uint(reply: PoolResult<RespValue>) -> PoolResult<u64> {
    match checked(reply)? {
        RespValue::Integer(n) => u64::try_from(n)
            .map_err(|_| PoolError::UnexpectedReply(format!("negative integer {}", n))),
        RespValue::BulkString(data) => parse_text(&data, "unsigned integer"),
        other => Err(unexpected("unsigned integer", &other)),
    }
}

pub fn float(reply: PoolResult<RespValue>) -> PoolResult<f64> {
    match checked(reply)? {
        RespValue::BulkString(data) => parse_text(&data, "float"),
        other => Err(unexpected("float", &other)),
    }
}

pub fn string(reply: PoolResult<RespValue>) -> PoolResult<String> {
    text(checked(reply)?, "string")
}

pub fn bytes(reply: PoolResult<RespValue>) -> PoolResult<Bytes> {
    match checked(reply)? {
        RespValue::BulkString(data) => Ok(data),
        RespValue::SimpleString(s) => Ok(Bytes::from(s)),
        other => Err(unexpected("bytes", &other)),
    }
}

/// Integers are true when non-zero; bulk strings use `1/t/true`, `0/f/false`
/// spellings.
pub fn boolean(reply: PoolResult<RespValue>) -> PoolResult<bool> {
    match checked(reply)? {
        RespValue::Integer(n) => Ok(n != 0),
        RespValue::BulkString(data) => parse_bool(&data),
        other => Err(unexpected("boolean", &other)),
    }
}

pub fn values(reply: PoolResult<RespValue>) -> PoolResult<Vec<RespValue>> {
    array(reply)
}

/// Null elements become empty strings.
pub fn strings(reply: PoolResult<RespValue>) -> PoolResult<Vec<String>> {
    array(reply)?
        .into_iter()
        .map(|value| match value {
            RespValue::Null => Ok(String::new()),
            value => text(value, "string element"),
        })
        .collect()
}

/// Null elements become empty byte strings.
pub fn byte_slices(reply: PoolResult<RespValue>) -> PoolResult<Vec<Bytes>> {
    array(reply)?
        .into_iter()
        .map(|value| match value {
            RespValue::BulkString(data) => Ok(data),
            RespValue::Null => Ok(Bytes::new()),
            other => Err(unexpected("bulk string element", &other)),
        })
        .collect()
}

/// Null elements become zero.
pub fn ints(reply: PoolResult<RespValue>) -> PoolResult<Vec<i64>> {
    array(reply)?
        .iter()
        .map(|value| match value {
            RespValue::Null => Ok(0),
            value => integer(value),
        })
        .collect()
}

/// Flat `[key, value, key, value, ...]` replies, as returned by HGETALL.
pub fn string_map(reply: PoolResult<RespValue>) -> PoolResult<HashMap<String, String>> {
    pairs(reply, |value| text(value, "string value"))
}

pub fn int_map(reply: PoolResult<RespValue>) -> PoolResult<HashMap<String, i64>> {
    pairs(reply, |value| integer(&value))
}
