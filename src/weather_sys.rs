use std::sync::Mutex;

use rocket::{http::Cookies, response::content::Json};
use serde_json::{json, Value as JsonValue};

use crate::alert_sys::{Alert, Severity};
use crate::api_client::{get_json, log_failure};
use crate::cache::TtlCache;
use crate::config;
use crate::geo::Coordinates;
use crate::session_sys;
use crate::util;


lazy_static! {
    static ref WEATHER_CACHE: Mutex<TtlCache<WeatherSummary>> = {
        Mutex::new(TtlCache::new())
    };
}

const CURRENT_URL: &'static str = "http://api.openweathermap.org/data/2.5/weather";
const FORECAST_URL: &'static str = "http://api.openweathermap.org/data/2.5/forecast";
const AIR_POLLUTION_URL: &'static str = "http://api.openweathermap.org/data/2.5/air_pollution";


#[derive(Debug, Clone, PartialEq)]
pub struct WeatherSummary {
    /// Celsius.
    pub temperature: f64,
    /// Percent.
    pub humidity: f64,
    pub description: String,
    /// Meters per second.
    pub wind_speed: f64,
    /// OpenWeatherMap condition code, absent for placeholder data.
    pub condition_id: Option<u32>,
}

impl WeatherSummary {
    pub fn unavailable() -> Self {
        WeatherSummary {
            temperature: 20.0,
            humidity: 65.0,
            description: "Weather data unavailable".into(),
            wind_speed: 0.0,
            condition_id: None,
        }
    }

    pub fn to_json(&self) -> JsonValue {
        json!({
            "temperature": self.temperature,
            "humidity": self.humidity,
            "description": self.description,
            "wind_speed": self.wind_speed,
        })
    }
}


#[derive(Debug, Clone, PartialEq)]
pub struct ForecastEntry {
    pub condition_id: u32,
    pub description: String,
    pub dt_txt: String,
}


fn query(coords: Coordinates, key: &str, metric: bool) -> Vec<(&'static str, String)> {
    let mut q = vec![
        ("lat", coords.lat.to_string()),
        ("lon", coords.lng.to_string()),
        ("appid", key.to_owned()),
    ];
    if metric {
        q.push(("units", "metric".to_owned()));
    }
    q
}

fn parse_current(data: &JsonValue) -> Result<WeatherSummary, String> {
    let number = |ptr: &str| {
        data.pointer(ptr)
            .and_then(|v| v.as_f64())
            .ok_or(format!("Missing {}", ptr))
    };

    Ok(WeatherSummary {
        temperature: number("/main/temp")?,
        humidity: number("/main/humidity")?,
        description: data.pointer("/weather/0/description")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_owned(),
        wind_speed: number("/wind/speed")?,
        condition_id: data.pointer("/weather/0/id")
            .and_then(|v| v.as_u64())
            .map(|id| id as u32),
    })
}

fn parse_forecast(data: &JsonValue) -> Vec<ForecastEntry> {
    data.get("list")
        .and_then(|v| v.as_array())
        .map(|list| {
            list.iter()
                .filter_map(|item| {
                    let id = item.pointer("/weather/0/id").and_then(|v| v.as_u64())?;
                    Some(ForecastEntry {
                        condition_id: id as u32,
                        description: item.pointer("/weather/0/description")
                            .and_then(|v| v.as_str())
                            .unwrap_or_default()
                            .to_owned(),
                        dt_txt: item.get("dt_txt")
                            .and_then(|v| v.as_str())
                            .unwrap_or_default()
                            .to_owned(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_weather_alerts(data: &JsonValue) -> Vec<Alert> {
    data.get("alerts")
        .and_then(|v| v.as_array())
        .map(|alerts| {
            alerts.iter()
                .filter_map(|a| {
                    let event = a.get("event").and_then(|v| v.as_str())?;
                    let message = match a.get("description").and_then(|v| v.as_str()) {
                        Some(desc) if !desc.is_empty() => format!("{}: {}", event, desc),
                        _ => event.to_owned(),
                    };
                    Some(Alert::new(&message, Severity::Medium, "weather"))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_aqi(data: &JsonValue) -> Result<u8, String> {
    data.pointer("/list/0/main/aqi")
        .and_then(|v| v.as_u64())
        .filter(|&aqi| aqi >= 1 && aqi <= 5)
        .map(|aqi| aqi as u8)
        .ok_or("Missing air quality index".into())
}


/// Raw current-weather payload.
pub fn get_current_weather(coords: Coordinates) -> Result<JsonValue, String> {
    let key = config::weather_key().ok_or("OPENWEATHER_API_KEY is not set".to_owned())?;
    get_json(CURRENT_URL, &query(coords, key, true))
}

/// Current conditions, or the placeholder when unavailable.
pub fn get_weather(coords: Coordinates) -> WeatherSummary {
    let key = util::location_key("weather", coords);

    if let Some(summary) = WEATHER_CACHE.lock().ok().and_then(|c| c.get(&key)) {
        return summary;
    }

    if config::weather_key().is_none() {
        return WeatherSummary::unavailable();
    }

    let summary = log_failure("get_weather",
        get_current_weather(coords).and_then(|data| parse_current(&data)));

    match summary {
        Some(summary) => {
            if let Ok(mut cache) = WEATHER_CACHE.lock() {
                cache.set(key, summary.clone());
            }
            summary
        },
        None => WeatherSummary::unavailable(),
    }
}

pub fn get_forecast(coords: Coordinates) -> Vec<ForecastEntry> {
    let key = match config::weather_key() {
        Some(key) => key,
        None => return Vec::new(),
    };

    log_failure("get_forecast", get_json(FORECAST_URL, &query(coords, key, true)))
        .map(|data| parse_forecast(&data))
        .unwrap_or_default()
}

pub fn get_weather_alerts(coords: Coordinates) -> Vec<Alert> {
    log_failure("get_weather_alerts", get_current_weather(coords))
        .map(|data| parse_weather_alerts(&data))
        .unwrap_or_default()
}

/// Air quality index from 1 (good) to 5 (very poor).
pub fn get_air_quality(coords: Coordinates) -> Result<u8, String> {
    let key = config::weather_key().ok_or("OPENWEATHER_API_KEY is not set".to_owned())?;
    get_json(AIR_POLLUTION_URL, &query(coords, key, false))
        .and_then(|data| parse_aqi(&data))
}


#[get("/weather")]
pub fn get_weather_route(mut cookies: Cookies) -> Json<String> {
    let location = session_sys::current_location(&mut cookies);
    Json(get_weather(location.coordinates()).to_json().to_string())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_current_conditions() {
        let data = json!({
            "main": { "temp": 31.5, "humidity": 40 },
            "wind": { "speed": 4.1 },
            "weather": [{ "id": 501, "description": "moderate rain" }],
        });

        let summary = parse_current(&data).unwrap();
        assert_eq!(summary.temperature, 31.5);
        assert_eq!(summary.humidity, 40.0);
        assert_eq!(summary.description, "moderate rain");
        assert_eq!(summary.condition_id, Some(501));
    }

    #[test]
    fn incomplete_conditions_fail() {
        assert!(parse_current(&json!({ "main": { "temp": 1.0 } })).is_err());
    }

    #[test]
    fn parses_forecast_list() {
        let data = json!({
            "list": [
                { "weather": [{ "id": 800, "description": "clear sky" }], "dt_txt": "2024-05-01 12:00:00" },
                { "weather": [] },
                { "weather": [{ "id": 500, "description": "light rain" }], "dt_txt": "2024-05-01 15:00:00" },
            ],
        });

        let forecast = parse_forecast(&data);
        assert_eq!(forecast.len(), 2);
        assert_eq!(forecast[1].condition_id, 500);
        assert_eq!(forecast[1].dt_txt, "2024-05-01 15:00:00");
        assert!(parse_forecast(&json!({})).is_empty());
    }

    #[test]
    fn parses_alerts_and_aqi() {
        let data = json!({
            "alerts": [{ "event": "Flood Watch", "description": "Rivers rising" }, { "sender": "x" }],
        });
        let alerts = parse_weather_alerts(&data);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].message, "Flood Watch: Rivers rising");

        assert_eq!(parse_aqi(&json!({ "list": [{ "main": { "aqi": 4 } }] })), Ok(4));
        assert!(parse_aqi(&json!({ "list": [{ "main": { "aqi": 9 } }] })).is_err());
    }

    #[test]
    fn placeholder_weather() {
        let w = WeatherSummary::unavailable();
        assert_eq!(w.temperature, 20.0);
        assert_eq!(w.humidity, 65.0);
        assert_eq!(w.wind_speed, 0.0);
    }
}
