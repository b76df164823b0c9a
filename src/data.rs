//! Recorded scenario data
//!
//! A time-indexed table of named channels loaded from JSON:
//!
//! ```json
//! { "time": [0.0, 0.5, 1.0], "A_degrees": [0, 45, 90], "left_is_pressed": [false, true, true] }
//! ```
//!
//! Numeric channels are linearly interpolated between samples. Booleans,
//! strings and nulls are held from the previous sample.

use crate::config::read_json;
use crate::core::Value;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::path::Path;

/// Name of the mandatory time channel
pub const TIME: &str = "time";

/// Channel table replayed in read mode
#[derive(Debug, Clone)]
pub struct RecordedData {
    time: Vec<f64>,
    channels: HashMap<String, Vec<Value>>,
}

impl RecordedData {
    /// Load a recording from disk
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let columns: HashMap<String, Vec<Value>> = read_json(path.as_ref())?;
        let data = Self::from_columns(columns)?;
        log::info!(
            "Loaded recording {}: {} samples, {} channels",
            path.as_ref().display(),
            data.time.len(),
            data.channels.len()
        );
        Ok(data)
    }

    /// Build from named columns; a numeric `time` column is required
    pub fn from_columns(mut columns: HashMap<String, Vec<Value>>) -> Result<Self> {
        let time = columns
            .remove(TIME)
            .ok_or_else(|| Error::Config("Time data not found".to_string()))?;
        let time = time
            .iter()
            .map(|v| {
                v.as_f64()
                    .ok_or_else(|| Error::Config(format!("Non numeric time value {:?}", v)))
            })
            .collect::<Result<Vec<f64>>>()?;
        if time.is_empty() {
            return Err(Error::Config("Time data is empty".to_string()));
        }
        if time.windows(2).any(|w| w[1] <= w[0]) {
            return Err(Error::Config("Time data is not strictly increasing".to_string()));
        }
        for (name, values) in &columns {
            if values.len() != time.len() {
                return Err(Error::Config(format!(
                    "Channel {} has {} samples, expected {}",
                    name,
                    values.len(),
                    time.len()
                )));
            }
        }
        Ok(Self {
            time,
            channels: columns,
        })
    }

    /// Recording duration in seconds
    pub fn end_time(&self) -> f64 {
        self.time[self.time.len() - 1]
    }

    /// Channel value at `time`
    ///
    /// Returns `Ok(None)` once `time` is past the last sample. Before the
    /// first sample the first value is held.
    pub fn extrapolate(&self, channel: &str, time: f64) -> Result<Option<Value>> {
        let values = self
            .channels
            .get(channel)
            .ok_or_else(|| Error::Config(format!("Header {} not found in data", channel)))?;

        let Some(next) = self.time.iter().position(|&t| t > time) else {
            return Ok(None);
        };
        if next == 0 {
            return Ok(Some(values[0].clone()));
        }

        let (t0, t1) = (self.time[next - 1], self.time[next]);
        let (v0, v1) = (&values[next - 1], &values[next]);
        let value = match (v0.as_f64(), v1.as_f64()) {
            (Some(a), Some(b)) => Value::Float(((t1 - time) * a + (time - t0) * b) / (t1 - t0)),
            _ => v0.clone(),
        };
        Ok(Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn recording() -> RecordedData {
        let json = r#"{
            "time": [0.0, 1.0, 2.0],
            "A_degrees": [0, 90, 180],
            "gesture": [null, "shake", "tapped"],
            "left_is_pressed": [false, true, false]
        }"#;
        let columns: HashMap<String, Vec<Value>> = serde_json::from_str(json).unwrap();
        RecordedData::from_columns(columns).unwrap()
    }

    #[test]
    fn test_numeric_interpolation() {
        let data = recording();
        let v = data.extrapolate("A_degrees", 0.5).unwrap().unwrap();
        assert_relative_eq!(v.as_f64().unwrap(), 45.0);
        let v = data.extrapolate("A_degrees", 1.25).unwrap().unwrap();
        assert_relative_eq!(v.as_f64().unwrap(), 112.5);
    }

    #[test]
    fn test_non_numeric_values_are_held() {
        let data = recording();
        assert_eq!(
            data.extrapolate("left_is_pressed", 1.9).unwrap(),
            Some(Value::Bool(true))
        );
        assert_eq!(data.extrapolate("gesture", 0.7).unwrap(), Some(Value::None));
        assert_eq!(
            data.extrapolate("gesture", 1.0).unwrap(),
            Some(Value::String("shake".to_string()))
        );
    }

    #[test]
    fn test_bounds() {
        let data = recording();
        assert_eq!(
            data.extrapolate("A_degrees", -1.0).unwrap(),
            Some(Value::Int(0))
        );
        assert_eq!(data.extrapolate("A_degrees", 2.0).unwrap(), None);
        assert_eq!(data.end_time(), 2.0);
    }

    #[test]
    fn test_missing_channel_and_time() {
        let data = recording();
        assert!(matches!(
            data.extrapolate("B_degrees", 0.0),
            Err(Error::Config(_))
        ));

        let mut columns = HashMap::new();
        columns.insert("A_degrees".to_string(), vec![Value::Int(1)]);
        let err = RecordedData::from_columns(columns).unwrap_err();
        assert!(err.to_string().contains("Time"));
    }
}
