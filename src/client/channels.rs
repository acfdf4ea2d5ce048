//! Functional channel normalization
//!
//! HomematicIP reports a device's `functionalChannels` as a JSON object keyed
//! by channel index, but older payloads and some library layers hand it over
//! as a plain list. Everything downstream works on the canonical ordered
//! `Vec<FunctionalChannel>` produced here.

use crate::error::{Result, ValveSwitchError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field carrying the degree of opening of a heating valve channel
pub const VALVE_POSITION_FIELD: &str = "valvePosition";

/// One functional channel of a device, reduced to what the valve logic reads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionalChannel {
    /// Channel index (from the record, or from its key / list position)
    pub index: Option<u32>,

    /// Valve position (0 = closed, >0 = open); `None` when absent, null or non-numeric
    pub valve_position: Option<f64>,
}

impl FunctionalChannel {
    /// Build a channel from one raw channel record.
    ///
    /// Returns `None` for records that are not JSON objects.
    pub fn from_value(value: &Value, fallback_index: Option<u32>) -> Option<Self> {
        let record = value.as_object()?;

        let index = record
            .get("index")
            .and_then(Value::as_u64)
            .and_then(|i| u32::try_from(i).ok())
            .or(fallback_index);

        let valve_position = match record.get(VALVE_POSITION_FIELD) {
            None | Some(Value::Null) => None,
            Some(Value::Number(n)) => n.as_f64(),
            Some(other) => {
                tracing::debug!(
                    "Ignoring non-numeric {} on channel {:?}: {}",
                    VALVE_POSITION_FIELD,
                    index,
                    other
                );
                None
            }
        };

        Some(Self {
            index,
            valve_position,
        })
    }
}

/// Normalize a `functionalChannels` value into canonical channel order.
///
/// Keyed mappings are ordered by numeric key, non-numeric keys last. A missing
/// field (`Value::Null`) yields no channels; scalars are an extraction error.
pub fn normalize_channels(value: &Value) -> Result<Vec<FunctionalChannel>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Object(map) => {
            let mut keyed: Vec<(Option<u32>, &String, &Value)> = map
                .iter()
                .map(|(key, channel)| (key.parse::<u32>().ok(), key, channel))
                .collect();
            keyed.sort_by(|a, b| match (a.0, b.0) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => a.1.cmp(b.1),
            });

            Ok(keyed
                .into_iter()
                .filter_map(|(index, _, channel)| FunctionalChannel::from_value(channel, index))
                .collect())
        }
        Value::Array(list) => Ok(list
            .iter()
            .enumerate()
            .filter_map(|(position, channel)| {
                FunctionalChannel::from_value(channel, u32::try_from(position).ok())
            })
            .collect()),
        other => Err(ValveSwitchError::extraction(format!(
            "functionalChannels is neither a mapping nor a list: {}",
            type_name(other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mapping_and_list_normalize_identically() {
        let keyed = json!({
            "0": {"functionalChannelType": "DEVICE_GLOBAL_PUMP_CONTROL"},
            "1": {"valvePosition": 0.0},
            "2": {"valvePosition": 0.35}
        });
        let listed = json!([
            {"functionalChannelType": "DEVICE_GLOBAL_PUMP_CONTROL"},
            {"valvePosition": 0.0},
            {"valvePosition": 0.35}
        ]);

        let from_map = normalize_channels(&keyed).unwrap();
        let from_list = normalize_channels(&listed).unwrap();
        assert_eq!(from_map, from_list);
        assert_eq!(from_map.len(), 3);
        assert_eq!(from_map[2].valve_position, Some(0.35));
    }

    #[test]
    fn test_mapping_is_ordered_numerically() {
        let keyed = json!({
            "10": {"valvePosition": 0.1},
            "2": {"valvePosition": 0.2},
            "extra": {"valvePosition": 0.3}
        });
        let channels = normalize_channels(&keyed).unwrap();
        let indices: Vec<_> = channels.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![Some(2), Some(10), None]);
    }

    #[test]
    fn test_record_index_wins_over_key() {
        let keyed = json!({"0": {"index": 7, "valvePosition": 1}});
        let channels = normalize_channels(&keyed).unwrap();
        assert_eq!(channels[0].index, Some(7));
        assert_eq!(channels[0].valve_position, Some(1.0));
    }

    #[test]
    fn test_null_and_non_numeric_positions_are_absent() {
        let listed = json!([
            {"valvePosition": null},
            {"valvePosition": "open"},
            {}
        ]);
        let channels = normalize_channels(&listed).unwrap();
        assert!(channels.iter().all(|c| c.valve_position.is_none()));
    }

    #[test]
    fn test_non_object_entries_are_skipped() {
        let listed = json!([42, {"valvePosition": 0.5}, "noise"]);
        let channels = normalize_channels(&listed).unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].index, Some(1));
    }

    #[test]
    fn test_missing_field_is_empty_and_scalar_is_error() {
        assert!(normalize_channels(&Value::Null).unwrap().is_empty());
        assert!(matches!(
            normalize_channels(&json!("channels")),
            Err(ValveSwitchError::Extraction(_))
        ));
    }
}
