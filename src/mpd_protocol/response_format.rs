//! Responses sent from server to client, can only serialize. Note this is a
//! completely different encoding than commands sent from client to server.
//!
//! The format is one `key: value` line per struct field, with `None` fields
//! omitted, bools as `0`/`1` and floats with three decimals. Sequences are
//! concatenated, which is how a queue listing becomes repeated entry blocks.

mod ser;

use std::time::Duration;

pub use ser::{Error, to_string};

#[cfg(test)]
mod tests;

pub fn duration_seconds<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(duration.as_secs())
}

/// MPD represents "accurate" durations as a number with three places after
/// the decimal; the serializer renders all floats that way.
pub fn duration_millis_precise<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}

pub fn option_duration_millis_precise<S>(
    duration: &Option<Duration>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    if let Some(duration) = duration {
        duration_millis_precise(duration, serializer)
    } else {
        serializer.serialize_none()
    }
}

pub fn unix_time<S>(ts: &jiff::Timestamp, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_i64(ts.as_second())
}

/// `mixrampdb` keeps MPD's six decimal places.
pub fn decibels<S>(db: &f32, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&format!("{db:.6}"))
}

/// The `time: ELAPSED:LENGTH` pair of the status response, both in whole
/// seconds.
pub fn option_seconds_pair<S>(
    pair: &Option<(u64, u64)>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    if let Some((elapsed, length)) = pair {
        serializer.serialize_str(&format!("{elapsed}:{length}"))
    } else {
        serializer.serialize_none()
    }
}
