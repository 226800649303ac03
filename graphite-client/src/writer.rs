use std::collections::BTreeMap;

use thiserror::Error;

/// Errors that could occur while formatting a metric for sending.
///
/// These indicate bad input from the caller, not a transient condition, and so are surfaced
/// synchronously from [`GraphiteSender::send`](crate::GraphiteSender::send) rather than being
/// logged and swallowed like transport failures.
#[derive(Debug, Error)]
pub enum SendError {
    /// The metric path was empty or contained a reserved character.
    #[error("invalid metric path {path:?}: {reason}")]
    InvalidMetricPath {
        /// The offending path.
        path: String,

        /// Details about which constraint was violated.
        reason: &'static str,
    },

    /// A tag name or value was empty or contained a reserved character.
    #[error("invalid tag {name:?}: {reason}")]
    InvalidTag {
        /// The offending tag name.
        name: String,

        /// Details about which constraint was violated.
        reason: &'static str,
    },
}

/// A metric value.
///
/// Graphite's plaintext protocol carries a single numeric field per line. Integer values render
/// without a decimal point, floating-point values render in shortest round-trip form, which is
/// plain decimal notation (no exponent) for typical metric magnitudes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MetricValue {
    /// An integer value.
    Integer(i64),

    /// A floating-point value.
    FloatingPoint(f64),
}

macro_rules! impl_from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for MetricValue {
                fn from(value: $ty) -> Self {
                    MetricValue::Integer(i64::from(value))
                }
            }
        )*
    };
}

impl_from_integer!(i8, i16, i32, i64, u8, u16, u32);

impl From<u64> for MetricValue {
    fn from(value: u64) -> Self {
        // Values too big for the integer representation degrade to floating point rather than
        // failing: the protocol has no unsigned field width to preserve.
        i64::try_from(value)
            .map_or(MetricValue::FloatingPoint(value as f64), MetricValue::Integer)
    }
}

impl From<usize> for MetricValue {
    fn from(value: usize) -> Self {
        MetricValue::from(value as u64)
    }
}

impl From<f32> for MetricValue {
    fn from(value: f32) -> Self {
        MetricValue::FloatingPoint(f64::from(value))
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        MetricValue::FloatingPoint(value)
    }
}

struct MetricValueFormatter {
    int_writer: itoa::Buffer,
    float_writer: ryu::Buffer,
}

impl MetricValueFormatter {
    fn new() -> Self {
        Self { int_writer: itoa::Buffer::new(), float_writer: ryu::Buffer::new() }
    }

    fn format(&mut self, value: MetricValue) -> &str {
        match value {
            MetricValue::Integer(v) => self.int_writer.format(v),
            MetricValue::FloatingPoint(v) => self.float_writer.format(v),
        }
    }
}

fn invalid_path(path: &str, reason: &'static str) -> SendError {
    SendError::InvalidMetricPath { path: path.to_string(), reason }
}

fn invalid_tag(name: &str, reason: &'static str) -> SendError {
    SendError::InvalidTag { name: name.to_string(), reason }
}

pub(crate) fn validate_path(path: &str) -> Result<(), SendError> {
    if path.is_empty() {
        return Err(invalid_path(path, "must not be empty"));
    }

    if path.chars().any(char::is_whitespace) {
        return Err(invalid_path(path, "must not contain whitespace"));
    }

    if path.contains(';') {
        return Err(invalid_path(path, "must not contain ';'"));
    }

    Ok(())
}

pub(crate) fn validate_tag(name: &str, value: &str) -> Result<(), SendError> {
    if name.is_empty() {
        return Err(invalid_tag(name, "name must not be empty"));
    }

    if name.chars().any(|c| c.is_whitespace() || c == ';' || c == '=') {
        return Err(invalid_tag(name, "name must not contain whitespace, ';', or '='"));
    }

    if value.chars().any(|c| c.is_whitespace() || c == ';') {
        return Err(invalid_tag(name, "value must not contain whitespace or ';'"));
    }

    Ok(())
}

/// Formats metrics into Carbon plaintext protocol lines.
///
/// One formatter instance belongs to one sender: it owns the configured path prefix and the
/// default tag set, both fixed at construction. Formatting is a pure transform with no I/O.
pub(crate) struct MessageFormatter {
    prefix: Option<String>,
    default_tags: BTreeMap<String, String>,
}

impl MessageFormatter {
    pub fn new(prefix: Option<String>, default_tags: BTreeMap<String, String>) -> Self {
        Self { prefix, default_tags }
    }

    /// Formats a single protocol line: `<path>[;tag=value;...] <value> <timestamp>\n`.
    ///
    /// Per-call tags are merged over the default tag set (per-call wins on a name collision) and
    /// rendered sorted by tag name, so the same tag set always yields byte-identical output
    /// regardless of insertion order.
    pub fn format(
        &self,
        path: &str,
        value: MetricValue,
        timestamp: u64,
        tags: &[(&str, &str)],
    ) -> Result<Vec<u8>, SendError> {
        validate_path(path)?;
        for (name, tag_value) in tags {
            validate_tag(name, tag_value)?;
        }

        let mut merged: BTreeMap<&str, &str> = self
            .default_tags
            .iter()
            .map(|(name, tag_value)| (name.as_str(), tag_value.as_str()))
            .collect();
        merged.extend(tags.iter().copied());

        let mut value_formatter = MetricValueFormatter::new();
        let mut timestamp_writer = itoa::Buffer::new();

        let mut buf = Vec::with_capacity(64);
        if let Some(prefix) = &self.prefix {
            buf.extend_from_slice(prefix.as_bytes());
            buf.push(b'.');
        }
        buf.extend_from_slice(path.as_bytes());

        for (name, tag_value) in merged {
            buf.push(b';');
            buf.extend_from_slice(name.as_bytes());
            buf.push(b'=');
            buf.extend_from_slice(tag_value.as_bytes());
        }

        buf.push(b' ');
        buf.extend_from_slice(value_formatter.format(value).as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(timestamp_writer.format(timestamp).as_bytes());
        buf.push(b'\n');

        Ok(buf)
    }
}
