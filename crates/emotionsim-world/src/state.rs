//! Typed world state with reserved keys and a scenario-dynamics bag.
//!
//! The reserved keys (`hazard_level`, `time_of_day`, `weather`) have known
//! semantics and typed accessors. Everything else lives in the `extra` bag
//! and may only be written through [`WorldState::apply_update`] when the
//! scenario declared bounds for the key. Writes that violate a reserved
//! key's type or range are rejected rather than coerced.

use std::collections::BTreeMap;

use serde_json::Value;

use emotionsim_types::{DynamicBound, WorldInit};

use crate::error::WorldError;

/// Reserved key: hazard level.
pub const KEY_HAZARD_LEVEL: &str = "hazard_level";
/// Reserved key: time of day.
pub const KEY_TIME_OF_DAY: &str = "time_of_day";
/// Reserved key: weather.
pub const KEY_WEATHER: &str = "weather";

/// The engine-owned mutable world state (locations excluded; the graph
/// owns those).
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WorldState {
    /// Hazard level, 0..=10.
    pub hazard_level: u8,
    /// Time-of-day label.
    pub time_of_day: String,
    /// Weather label.
    pub weather: String,
    /// Scenario-defined dynamics.
    pub extra: BTreeMap<String, Value>,
}

impl WorldState {
    /// Build the initial state from a scenario's world init block.
    pub fn from_init(init: &WorldInit) -> Self {
        Self {
            hazard_level: init.hazard_level.min(10),
            time_of_day: init.time_of_day.clone(),
            weather: init.weather.clone(),
            extra: init.extra.clone(),
        }
    }

    /// Read a key as JSON, reserved or dynamic.
    pub fn get(&self, key: &str) -> Option<Value> {
        match key {
            KEY_HAZARD_LEVEL => Some(Value::from(self.hazard_level)),
            KEY_TIME_OF_DAY => Some(Value::from(self.time_of_day.clone())),
            KEY_WEATHER => Some(Value::from(self.weather.clone())),
            other => self.extra.get(other).cloned(),
        }
    }

    /// Apply a single-key update from an `environment_update` action.
    ///
    /// Reserved keys are type- and range-checked. Dynamic keys must have
    /// scenario-declared bounds, and numeric values must fall inside them.
    ///
    /// # Errors
    ///
    /// [`WorldError::ReservedKeyViolation`], [`WorldError::UndeclaredDynamic`],
    /// or [`WorldError::DynamicOutOfBounds`].
    pub fn apply_update(
        &mut self,
        key: &str,
        value: &Value,
        dynamics: &BTreeMap<String, DynamicBound>,
    ) -> Result<(), WorldError> {
        match key {
            KEY_HAZARD_LEVEL => {
                let level = value
                    .as_u64()
                    .filter(|v| *v <= 10)
                    .ok_or_else(|| WorldError::ReservedKeyViolation {
                        key: key.to_owned(),
                        reason: "expected an integer in 0..=10".to_owned(),
                    })?;
                self.hazard_level = u8::try_from(level).unwrap_or(10);
                Ok(())
            }
            KEY_TIME_OF_DAY | KEY_WEATHER => {
                let label = value
                    .as_str()
                    .ok_or_else(|| WorldError::ReservedKeyViolation {
                        key: key.to_owned(),
                        reason: "expected a string".to_owned(),
                    })?;
                if key == KEY_TIME_OF_DAY {
                    self.time_of_day = label.to_owned();
                } else {
                    self.weather = label.to_owned();
                }
                Ok(())
            }
            "locations" => Err(WorldError::ReservedKeyViolation {
                key: key.to_owned(),
                reason: "the location graph is not writable through state updates".to_owned(),
            }),
            other => {
                let bound = dynamics
                    .get(other)
                    .ok_or_else(|| WorldError::UndeclaredDynamic(other.to_owned()))?;
                if let Some(number) = value.as_f64()
                    && (number < bound.min || number > bound.max)
                {
                    return Err(WorldError::DynamicOutOfBounds {
                        key: other.to_owned(),
                        value: number,
                        min: bound.min,
                        max: bound.max,
                    });
                }
                self.extra.insert(other.to_owned(), value.clone());
                Ok(())
            }
        }
    }

    /// Serialize the full state (reserved keys plus dynamics) into one JSON
    /// object for step snapshots.
    pub fn snapshot(&self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert(KEY_HAZARD_LEVEL.to_owned(), Value::from(self.hazard_level));
        map.insert(
            KEY_TIME_OF_DAY.to_owned(),
            Value::from(self.time_of_day.clone()),
        );
        map.insert(KEY_WEATHER.to_owned(), Value::from(self.weather.clone()));
        for (key, value) in &self.extra {
            map.insert(key.clone(), value.clone());
        }
        Value::Object(map)
    }

    /// One-line textual summary for agent context assembly.
    pub fn summary(&self) -> String {
        let mut parts = vec![format!("hazard level {}", self.hazard_level)];
        if !self.weather.is_empty() {
            parts.push(format!("weather {}", self.weather));
        }
        if !self.time_of_day.is_empty() {
            parts.push(format!("time {}", self.time_of_day));
        }
        for (key, value) in &self.extra {
            parts.push(format!("{key} {value}"));
        }
        parts.join(", ")
    }
}
