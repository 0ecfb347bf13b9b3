/*!
 * Serde utilities for durations.
 *
 * Durations are written as fractional seconds so that snapshots and
 * configuration files stay readable. Deserialization accepts a number or a
 * numeric string.
 */

use serde::{Deserialize, Deserializer, Serializer};
use std::time::Duration;

fn parse_seconds<E: serde::de::Error>(value: serde_json::Value) -> Result<Duration, E> {
    let seconds = match value {
        serde_json::Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| E::custom(format!("Invalid numeric value: {n}")))?,
        serde_json::Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| E::custom(format!("Cannot parse '{s}' as seconds")))?,
        other => {
            return Err(E::custom(format!(
                "Expected a number of seconds, found: {other}"
            )))
        }
    };

    Duration::try_from_secs_f64(seconds)
        .map_err(|_| E::custom(format!("Invalid duration in seconds: {seconds}")))
}

/// `#[serde(with = "duration_seconds")]` for `Duration`
pub mod duration_seconds {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        parse_seconds(value)
    }
}

/// `#[serde(with = "option_duration_seconds")]` for `Option<Duration>`
pub mod option_duration_seconds {
    use super::*;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&duration.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        let value: Option<serde_json::Value> = Option::deserialize(deserializer)?;
        match value {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(value) => parse_seconds(value).map(Some),
        }
    }
}
