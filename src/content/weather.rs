/// Home Assistant weather source. Readings come from a table of sensor rows so the layout
/// and the fetch stay driven by the same configuration.
use chrono::Local;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::HomeAssistantConfig;
use crate::content::{ContentSnapshot, ContentSource, FetchError};
use crate::render::plugins::sensors::SensorRow;

/// How a raw reading turns into display text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Formatter {
    /// Condition names like `partlycloudy` become `Partly cloudy`
    Condition,
    /// Number with the given count of decimals, followed by the unit
    Decimal(usize),
}

/// One row of the sensor table
#[derive(Debug, Clone, PartialEq)]
pub struct SensorSpec {
    /// Snapshot field name
    pub name: String,
    pub label: String,
    /// Entity to read; `None` reads the configured weather entity
    pub entity: Option<String>,
    /// Attribute holding the reading; `None` reads the entity state
    pub attribute: Option<String>,
    /// Attribute naming the unit, if the entity reports one
    pub unit_attribute: Option<String>,
    /// Unit used when the entity reports none
    pub unit: String,
    pub format: Formatter,
}

impl SensorSpec {
    fn new(name: &str, label: &str, attribute: Option<&str>, unit: &str, format: Formatter) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            entity: None,
            attribute: attribute.map(str::to_string),
            unit_attribute: attribute.map(|a| format!("{a}_unit")),
            unit: unit.to_string(),
            format,
        }
    }

    /// Format this row's reading from an entity state object
    pub fn read(&self, state: &EntityState) -> Option<String> {
        let raw = match &self.attribute {
            Some(attr) => state.attributes.get(attr)?.clone(),
            None => Value::String(state.state.clone()),
        };
        let unit = self
            .unit_attribute
            .as_ref()
            .and_then(|a| state.attributes.get(a))
            .and_then(Value::as_str)
            .unwrap_or(&self.unit);
        format_reading(&raw, self.format, unit)
    }
}

/// The rows shown by default: condition, temperature, humidity, wind and rain
pub fn default_table() -> Vec<SensorSpec> {
    vec![
        SensorSpec {
            unit_attribute: None,
            ..SensorSpec::new("condition", "Conditions", None, "", Formatter::Condition)
        },
        SensorSpec::new("temperature", "Temperature", Some("temperature"), "°C", Formatter::Decimal(1)),
        SensorSpec {
            unit_attribute: None,
            ..SensorSpec::new("humidity", "Humidity", Some("humidity"), "%", Formatter::Decimal(0))
        },
        SensorSpec::new("wind", "Wind", Some("wind_speed"), "km/h", Formatter::Decimal(1)),
        SensorSpec::new("rain", "Rain", Some("precipitation"), "mm", Formatter::Decimal(1)),
    ]
}

/// Layout rows matching a sensor table
pub fn sensor_rows(table: &[SensorSpec]) -> Vec<SensorRow> {
    table
        .iter()
        .map(|spec| SensorRow {
            label: spec.label.clone(),
            field: spec.name.clone(),
        })
        .collect()
}

/// Entity object returned by `GET /api/states/{entity}`
#[derive(Debug, Clone, Deserialize)]
pub struct EntityState {
    pub state: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
}

fn format_reading(raw: &Value, format: Formatter, unit: &str) -> Option<String> {
    match format {
        Formatter::Condition => {
            let text = raw.as_str()?;
            if matches!(text, "unavailable" | "unknown" | "") {
                return None;
            }
            Some(condition_text(text))
        }
        Formatter::Decimal(places) => {
            let n = match raw {
                Value::Number(n) => n.as_f64()?,
                Value::String(s) => s.trim().parse::<f64>().ok()?,
                _ => return None,
            };
            let spacer = if unit.is_empty() || unit.starts_with('°') || unit == "%" {
                ""
            } else {
                " "
            };
            Some(format!("{n:.places$}{spacer}{unit}"))
        }
    }
}

fn condition_text(state: &str) -> String {
    let words = match state {
        "clear-night" => "clear night",
        "partlycloudy" => "partly cloudy",
        "lightning-rainy" => "lightning and rain",
        "snowy-rainy" => "sleet",
        "windy-variant" => "windy",
        other => other,
    }
    .replace(['-', '_'], " ");
    let mut chars = words.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub struct WeatherSource {
    client: reqwest::Client,
    url: Option<String>,
    token: Option<String>,
    weather_entity: String,
    table: Vec<SensorSpec>,
}

impl WeatherSource {
    pub fn new(config: &HomeAssistantConfig, table: Vec<SensorSpec>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            url: config.url.clone(),
            token: config.token.clone(),
            weather_entity: config.weather_entity.clone(),
            table,
        }
    }

    fn entity_for<'a>(&'a self, spec: &'a SensorSpec) -> &'a str {
        spec.entity.as_deref().unwrap_or(&self.weather_entity)
    }

    async fn entity(&self, url: &str, token: &str, entity: &str) -> Result<EntityState, FetchError> {
        let response = self
            .client
            .get(format!("{url}/api/states/{entity}"))
            .bearer_auth(token)
            .send()
            .await?;
        if let Some(e) = FetchError::from_status(response.status()) {
            return Err(e);
        }
        Ok(response.json::<EntityState>().await?)
    }
}

impl ContentSource for WeatherSource {
    fn name(&self) -> &'static str {
        "home-assistant"
    }

    async fn authenticate(&mut self) -> Result<(), FetchError> {
        match (&self.url, &self.token) {
            (Some(_), Some(_)) => Ok(()),
            _ => Err(FetchError::NotConfigured(
                "HOME_ASSISTANT_URL and HOME_ASSISTANT_TOKEN must be set".into(),
            )),
        }
    }

    async fn fetch(&mut self) -> Result<ContentSnapshot, FetchError> {
        let (Some(url), Some(token)) = (self.url.as_deref(), self.token.as_deref()) else {
            return Err(FetchError::NotConfigured("Home Assistant is not configured".into()));
        };

        let mut states = BTreeMap::new();
        let mut last_error = None;
        for spec in &self.table {
            let entity = self.entity_for(spec);
            if states.contains_key(entity) {
                continue;
            }
            match self.entity(url, token, entity).await {
                Ok(state) => {
                    states.insert(entity.to_string(), state);
                }
                Err(e) if e.is_auth() => return Err(e),
                Err(e) => {
                    warn!("Cannot read {}: {}", entity, e);
                    last_error = Some(e);
                }
            }
        }

        let readings = collect_readings(&self.table, &self.weather_entity, &states);
        if readings.is_empty() {
            return Err(last_error.unwrap_or(FetchError::Empty));
        }
        debug!("Read {}/{} sensor rows", readings.len(), self.table.len());

        Ok(readings
            .into_iter()
            .fold(ContentSnapshot::new(Local::now().naive_local()), |snap, (name, value)| {
                snap.with_field(&name, value)
            }))
    }
}

/// Formatted value per row name; rows without a reading are left out
fn collect_readings(
    table: &[SensorSpec],
    default_entity: &str,
    states: &BTreeMap<String, EntityState>,
) -> Vec<(String, String)> {
    table
        .iter()
        .filter_map(|spec| {
            let entity = spec.entity.as_deref().unwrap_or(default_entity);
            let value = spec.read(states.get(entity)?)?;
            Some((spec.name.clone(), value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOME: &str = r#"{
        "entity_id": "weather.home",
        "state": "partlycloudy",
        "attributes": {
            "temperature": 12.34,
            "temperature_unit": "°F",
            "humidity": 81,
            "wind_speed": 14.4,
            "wind_speed_unit": "km/h",
            "friendly_name": "Home"
        }
    }"#;

    fn home() -> BTreeMap<String, EntityState> {
        let mut states = BTreeMap::new();
        states.insert("weather.home".to_string(), serde_json::from_str(HOME).unwrap());
        states
    }

    #[test]
    fn test_default_table_readings() {
        let readings = collect_readings(&default_table(), "weather.home", &home());
        let readings: BTreeMap<_, _> = readings.into_iter().collect();
        assert_eq!(readings["condition"], "Partly cloudy");
        assert_eq!(readings["temperature"], "12.3°F");
        assert_eq!(readings["humidity"], "81%");
        assert_eq!(readings["wind"], "14.4 km/h");
        // no precipitation attribute, the row stays empty and renders as --
        assert!(!readings.contains_key("rain"));
    }

    #[test]
    fn test_separate_entity_row() {
        let mut table = default_table();
        table.push(SensorSpec {
            entity: Some("sensor.garden_temperature".into()),
            attribute: None,
            unit_attribute: None,
            ..SensorSpec::new("garden", "Garden", None, "°C", Formatter::Decimal(1))
        });
        let mut states = home();
        states.insert(
            "sensor.garden_temperature".into(),
            serde_json::from_str(r#"{"state": "9.96", "attributes": {}}"#).unwrap(),
        );
        let readings: BTreeMap<_, _> = collect_readings(&table, "weather.home", &states)
            .into_iter()
            .collect();
        assert_eq!(readings["garden"], "10.0°C");
    }

    #[test]
    fn test_unavailable_states_are_missing() {
        let state: EntityState =
            serde_json::from_str(r#"{"state": "unavailable", "attributes": {}}"#).unwrap();
        let condition = &default_table()[0];
        assert_eq!(condition.read(&state), None);
        assert_eq!(
            format_reading(&Value::String("n/a".into()), Formatter::Decimal(1), "mm"),
            None
        );
    }

    #[test]
    fn test_condition_text() {
        assert_eq!(condition_text("clear-night"), "Clear night");
        assert_eq!(condition_text("rainy"), "Rainy");
        assert_eq!(condition_text("lightning-rainy"), "Lightning and rain");
    }

    #[test]
    fn test_sensor_rows_follow_table() {
        let rows = sensor_rows(&default_table());
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[1].label, "Temperature");
        assert_eq!(rows[1].field, "temperature");
    }

    #[tokio::test]
    async fn test_unconfigured_source_fails_auth() {
        let config = HomeAssistantConfig {
            url: None,
            token: Some("abc".into()),
            weather_entity: "weather.home".into(),
        };
        let mut source = WeatherSource::new(&config, default_table(), Duration::from_secs(5));
        assert!(source.authenticate().await.unwrap_err().is_auth());
    }
}
