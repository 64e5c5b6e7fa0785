//! Generic water heater entity model.
//!
//! Platform-independent pieces every water heater shares: temperature units,
//! the supported-feature flags, the structured set-temperature request and the
//! base attribute set published for each heater.

use std::ops::BitOr;
use std::str::FromStr;

use serde::Serialize;
use strum::AsRefStr;
use strum::Display;
use strum::EnumString;

use super::entity::Attributes;
use super::entity::Entity;

pub const ATTR_CURRENT_TEMPERATURE: &str = "current_temperature";
pub const ATTR_TEMPERATURE: &str = "temperature";
pub const ATTR_TARGET_TEMP_HIGH: &str = "target_temp_high";
pub const ATTR_TARGET_TEMP_LOW: &str = "target_temp_low";
pub const ATTR_OPERATION_MODE: &str = "operation_mode";
pub const ATTR_OPERATION_LIST: &str = "operation_list";
pub const ATTR_MIN_TEMP: &str = "min_temp";
pub const ATTR_MAX_TEMP: &str = "max_temp";

/// Sentinel reported by devices for a switched-off mode or setpoint.
pub const STATE_OFF: &str = "off";

/// Temperature unit of a water heater.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString, AsRefStr)]
pub enum TemperatureUnit {
    #[default]
    #[serde(rename = "°C")]
    #[strum(to_string = "°C", serialize = "C")]
    Celsius,
    #[serde(rename = "°F")]
    #[strum(to_string = "°F", serialize = "F")]
    Fahrenheit,
}

impl TemperatureUnit {
    /// Map a device unit code ("C", "F") to a unit. Missing or unknown codes are Celsius.
    pub fn from_units_code(code: Option<&str>) -> Self {
        code.filter(|c| !c.is_empty())
            .and_then(|c| Self::from_str(c).ok())
            .unwrap_or_default()
    }
}

/// Feature flags a water heater advertises to the engine.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct WaterHeaterFeatures(u32);

impl WaterHeaterFeatures {
    pub const TARGET_TEMPERATURE: Self = Self(1);
    pub const OPERATION_MODE: Self = Self(2);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for WaterHeaterFeatures {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// Arguments of a set-temperature command.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct SetTemperatureRequest {
    /// New target temperature
    pub temperature: Option<f64>,
}

impl SetTemperatureRequest {
    pub fn new(temperature: f64) -> Self {
        Self {
            temperature: Some(temperature),
        }
    }
}

/// Read side of a water heater entity.
pub trait WaterHeaterEntity: Entity {
    fn temperature_unit(&self) -> TemperatureUnit;

    fn current_operation(&self) -> Option<&str>;

    fn operation_list(&self) -> &[String];

    fn current_temperature(&self) -> Option<f64>;

    fn target_temperature(&self) -> Option<f64>;

    fn target_temperature_high(&self) -> Option<f64> {
        None
    }

    fn target_temperature_low(&self) -> Option<f64> {
        None
    }

    fn min_temp(&self) -> f64;

    fn max_temp(&self) -> f64;

    fn supported_features(&self) -> WaterHeaterFeatures;
}

/// Attributes every water heater publishes. Platforms extend or prune this map.
pub fn base_attributes<W: WaterHeaterEntity + ?Sized>(heater: &W) -> Attributes {
    let mut data = Attributes::new();
    data.insert(ATTR_MIN_TEMP.into(), heater.min_temp().into());
    data.insert(ATTR_MAX_TEMP.into(), heater.max_temp().into());
    data.insert(
        ATTR_CURRENT_TEMPERATURE.into(),
        heater.current_temperature().into(),
    );
    data.insert(ATTR_TEMPERATURE.into(), heater.target_temperature().into());
    data.insert(
        ATTR_TARGET_TEMP_HIGH.into(),
        heater.target_temperature_high().into(),
    );
    data.insert(
        ATTR_TARGET_TEMP_LOW.into(),
        heater.target_temperature_low().into(),
    );

    if heater
        .supported_features()
        .contains(WaterHeaterFeatures::OPERATION_MODE)
    {
        data.insert(
            ATTR_OPERATION_MODE.into(),
            heater.current_operation().into(),
        );
        data.insert(
            ATTR_OPERATION_LIST.into(),
            heater.operation_list().to_vec().into(),
        );
    }

    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_units_code_mapping() {
        assert_eq!(
            TemperatureUnit::from_units_code(Some("C")),
            TemperatureUnit::Celsius
        );
        assert_eq!(
            TemperatureUnit::from_units_code(Some("F")),
            TemperatureUnit::Fahrenheit
        );
        assert_eq!(
            TemperatureUnit::from_units_code(None),
            TemperatureUnit::Celsius
        );
        assert_eq!(
            TemperatureUnit::from_units_code(Some("")),
            TemperatureUnit::Celsius
        );
        assert_eq!(
            TemperatureUnit::from_units_code(Some("K")),
            TemperatureUnit::Celsius
        );
    }

    #[test]
    fn test_unit_display() {
        assert_eq!(TemperatureUnit::Celsius.to_string(), "°C");
        assert_eq!(TemperatureUnit::Fahrenheit.as_ref(), "°F");
        assert_eq!(
            serde_json::to_value(TemperatureUnit::Fahrenheit).unwrap(),
            serde_json::json!("°F")
        );
    }

    #[test]
    fn test_feature_flags() {
        let all = WaterHeaterFeatures::TARGET_TEMPERATURE | WaterHeaterFeatures::OPERATION_MODE;
        assert_eq!(all.bits(), 3);
        assert!(all.contains(WaterHeaterFeatures::OPERATION_MODE));
        assert!(!WaterHeaterFeatures::OPERATION_MODE.contains(all));
        assert_eq!(serde_json::to_value(all).unwrap(), serde_json::json!(3));
    }
}
