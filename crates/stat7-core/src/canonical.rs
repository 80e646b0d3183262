//! Canonical serialization for STAT7 (spec §3).
//!
//! Any type that is address-hashed or journey-logged implements
//! [`ToCanonical`] and is rendered through [`CanonicalValue`]'s byte emitter:
//! object keys are ASCII-sorted, floats are rounded to 8 decimals and
//! rendered without trailing zeros, and strings are escaped the way
//! `50gramx-civilisation-os-kernel`'s `physics::canonical_json` escapes them.
//! Unlike that kernel's JCS variant, numbers are emitted as JSON numbers
//! (not numeric strings) because spec §3 describes floats directly.

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// A canonical, serialization-agnostic value tree.
#[derive(Debug, Clone, PartialEq)]
pub enum CanonicalValue {
    Null,
    Bool(bool),
    /// Integers are rendered as plain decimal literals.
    Int(i64),
    /// Floats are always passed through [`normalize_f64`] before construction.
    Float(f64),
    Str(String),
    Array(Vec<CanonicalValue>),
    /// `BTreeMap<String, _>` keeps ASCII-sorted key order for free.
    Object(BTreeMap<String, CanonicalValue>),
}

impl CanonicalValue {
    pub fn object() -> CanonicalValueBuilder {
        CanonicalValueBuilder(BTreeMap::new())
    }
}

/// Small builder so call sites read as a flat field list instead of nested
/// `BTreeMap::insert` calls.
pub struct CanonicalValueBuilder(BTreeMap<String, CanonicalValue>);

impl CanonicalValueBuilder {
    pub fn field(mut self, key: &str, value: CanonicalValue) -> Self {
        self.0.insert(key.to_string(), value);
        self
    }

    pub fn build(self) -> CanonicalValue {
        CanonicalValue::Object(self.0)
    }
}

/// Implemented by every type that participates in address derivation or
/// journey hashing.
pub trait ToCanonical {
    fn to_canonical(&self) -> CanonicalValue;
}

/// Render a [`CanonicalValue`] to its canonical byte form.
pub fn canonical_bytes<T: ToCanonical>(value: &T) -> Vec<u8> {
    let mut out = String::new();
    emit(&value.to_canonical(), &mut out);
    out.into_bytes()
}

fn emit(value: &CanonicalValue, out: &mut String) {
    match value {
        CanonicalValue::Null => out.push_str("null"),
        CanonicalValue::Bool(true) => out.push_str("true"),
        CanonicalValue::Bool(false) => out.push_str("false"),
        CanonicalValue::Int(i) => {
            let _ = write!(out, "{i}");
        }
        CanonicalValue::Float(f) => out.push_str(&render_float(*f)),
        CanonicalValue::Str(s) => emit_string(s, out),
        CanonicalValue::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                emit(item, out);
            }
            out.push(']');
        }
        CanonicalValue::Object(pairs) => {
            out.push('{');
            for (i, (key, val)) in pairs.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                emit_string(key, out);
                out.push(':');
                emit(val, out);
            }
            out.push('}');
        }
    }
}

fn emit_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

/// Round a float to 8 decimals and render it without trailing zeros beyond
/// significant digits. `-0.0` normalizes to `0.0`.
fn render_float(f: f64) -> String {
    let f = if f == 0.0 { 0.0 } else { f };
    let rounded = round_to_8_decimals(f);
    let mut s = format!("{rounded:.8}");
    while s.ends_with('0') {
        s.pop();
    }
    if s.ends_with('.') {
        s.pop();
    }
    s
}

/// Round to exactly 8 decimal places (spec §3's quantization grid).
pub fn round_to_8_decimals(f: f64) -> f64 {
    (f * 1e8).round() / 1e8
}

/// Validate and normalize a float per spec §3/§4.1: reject NaN/Inf, round
/// to the 8-decimal grid, normalize `-0.0` to `0.0`.
pub fn normalize_f64(field: &'static str, v: f64) -> Result<f64> {
    if v.is_nan() || v.is_infinite() {
        return Err(Error::NotFinite { field, value: v });
    }
    Ok(round_to_8_decimals(v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_renders_without_trailing_zeros() {
        assert_eq!(render_float(50.0), "50");
        assert_eq!(render_float(50.5), "50.5");
        assert_eq!(render_float(0.00000001), "0.00000001");
        assert_eq!(render_float(-0.0), "0");
    }

    #[test]
    fn float_quantizes_to_8_decimals() {
        assert_eq!(round_to_8_decimals(1.0 / 3.0), 0.33333333);
    }

    #[test]
    fn object_keys_are_ascii_sorted() {
        let value = CanonicalValue::object()
            .field("zeta", CanonicalValue::Int(1))
            .field("alpha", CanonicalValue::Int(2))
            .build();
        let mut out = String::new();
        emit(&value, &mut out);
        assert_eq!(out, r#"{"alpha":2,"zeta":1}"#);
    }

    #[test]
    fn string_escaping_matches_json_conventions() {
        let value = CanonicalValue::Str("line\nbreak\"quote".to_string());
        let mut out = String::new();
        emit(&value, &mut out);
        assert_eq!(out, r#""line\nbreak\"quote""#);
    }
}
