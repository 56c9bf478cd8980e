//! Canonical identity hashing
//!
//! A task's identity is `sha1(handler + json([args, kwargs]))` rendered as
//! lowercase hex. The JSON text is byte-compatible with the form already
//! persisted by existing deployments: keys sorted at every level, `", "` and
//! `": "` separators, and every non-ASCII character escaped as `\uXXXX`.
//! Changing any of that changes every stored hash.

use serde::Serialize;
use serde_json::ser::Formatter;
use serde_json::{Map, Value};
use sha1::{Digest, Sha1};
use std::io;
use tracing::debug;

use crate::error::WorkerResult;

/// Length of an identity hash in hex characters
pub const IDENTITY_HASH_LEN: usize = 40;

/// Compute the identity hash of a task invocation
///
/// `args` should serialize to a JSON array and `kwargs` to a JSON object;
/// an empty or falsy value for either falls back to `[]` / `{}`. Fails with
/// [`crate::WorkerError::Serialization`] when the payload has no JSON form.
pub fn identity_hash<A, K>(handler: &str, args: &A, kwargs: &K) -> WorkerResult<String>
where
    A: Serialize + ?Sized,
    K: Serialize + ?Sized,
{
    let args = serde_json::to_value(args)?;
    let kwargs = serde_json::to_value(kwargs)?;
    identity_hash_values(handler, &args, &kwargs)
}

/// Compute the identity hash from already-parsed JSON values
pub fn identity_hash_values(handler: &str, args: &Value, kwargs: &Value) -> WorkerResult<String> {
    debug!(%handler, "identity_hash_values: called");
    let args = canonicalize(&or_default_args(args));
    let kwargs = canonicalize(&or_default_kwargs(kwargs));

    let params = canonical_json(&Value::Array(vec![args, kwargs]))?;

    let mut hasher = Sha1::new();
    hasher.update(handler.as_bytes());
    hasher.update(&params);
    Ok(format!("{:x}", hasher.finalize()))
}

/// `args`, or `[]` when it is empty or falsy (`null`, `false`, `0`, `""`, `{}`)
pub fn or_default_args(args: &Value) -> Value {
    if is_falsy(args) { Value::Array(Vec::new()) } else { args.clone() }
}

/// `kwargs`, or `{}` when it is empty or falsy (`null`, `false`, `0`, `""`, `[]`)
pub fn or_default_kwargs(kwargs: &Value) -> Value {
    if is_falsy(kwargs) { Value::Object(Map::new()) } else { kwargs.clone() }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f == 0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

/// Whether `value` has the shape of an identity hash
pub fn is_identity_hash(value: &str) -> bool {
    value.len() == IDENTITY_HASH_LEN && value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Serialize a value in canonical form
pub fn canonical_json(value: &Value) -> WorkerResult<Vec<u8>> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, CanonicalFormatter);
    canonicalize(value).serialize(&mut ser)?;
    Ok(buf)
}

/// Rebuild objects with their keys inserted in sorted order
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(entries.into_iter().map(|(k, v)| (k.clone(), canonicalize(v))).collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

struct CanonicalFormatter;

impl Formatter for CanonicalFormatter {
    fn begin_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_key<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W: ?Sized + io::Write>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()> {
        // quotes, backslashes and control characters arrive via write_char_escape
        for ch in fragment.chars() {
            if (' '..='~').contains(&ch) {
                let mut tmp = [0u8; 1];
                writer.write_all(ch.encode_utf8(&mut tmp).as_bytes())?;
            } else {
                let mut units = [0u16; 2];
                for unit in ch.encode_utf16(&mut units) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }

    fn write_number_str<W: ?Sized + io::Write>(&mut self, writer: &mut W, value: &str) -> io::Result<()> {
        // integer literals keep every digit; anything with a fraction or exponent is a float
        if value.contains(['.', 'e', 'E']) {
            let parsed: f64 = value
                .parse()
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("bad number {}: {}", value, e)))?;
            writer.write_all(float_repr(parsed).as_bytes())
        } else if value == "-0" {
            writer.write_all(b"0")
        } else {
            writer.write_all(value.as_bytes())
        }
    }

    fn write_f64<W: ?Sized + io::Write>(&mut self, writer: &mut W, value: f64) -> io::Result<()> {
        writer.write_all(float_repr(value).as_bytes())
    }

    fn write_f32<W: ?Sized + io::Write>(&mut self, writer: &mut W, value: f32) -> io::Result<()> {
        writer.write_all(float_repr(f64::from(value)).as_bytes())
    }
}

/// Shortest round-trip float text: fixed notation for decimal exponents in
/// `-4..16`, otherwise `d.ddde+XX` with at least two exponent digits.
fn float_repr(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    let sci = format!("{:e}", value);
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => return sci,
    };
    let (sign, mantissa) = match mantissa.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", mantissa),
    };
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();

    if (-4..16).contains(&exp) {
        if exp >= 0 {
            let int_len = exp as usize + 1;
            let mut padded = digits.clone();
            while padded.len() < int_len {
                padded.push('0');
            }
            let (int_part, frac_part) = padded.split_at(int_len);
            let frac_part = if frac_part.is_empty() { "0" } else { frac_part };
            format!("{}{}.{}", sign, int_part, frac_part)
        } else {
            let zeros = "0".repeat((-exp - 1) as usize);
            format!("{}0.{}{}", sign, zeros, digits)
        }
    } else {
        let (first, rest) = digits.split_at(1);
        let exp_sign = if exp < 0 { '-' } else { '+' };
        if rest.is_empty() {
            format!("{}{}e{}{:02}", sign, first, exp_sign, exp.abs())
        } else {
            format!("{}{}.{}e{}{:02}", sign, first, rest, exp_sign, exp.abs())
        }
    }
}
