use std::fmt;

use rand::{Rng, seq::SliceRandom};
use rocket::{http::Cookies, response::content::Json};
use serde_json::{json, Value as JsonValue};

use crate::api_client::log_failure;
use crate::config;
use crate::location_sys::LocationFix;
use crate::seismic_sys;
use crate::session_sys;
use crate::util;
use crate::weather_sys;


/// Radius around the user in which earthquakes are reported.
const SEISMIC_ALERT_RADIUS_KM: f64 = 300.0;


#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Overall risk uses the same three-step scale as alert severity.
pub type RiskLevel = Severity;

impl Severity {
    pub fn score(self) -> u32 {
        match self {
            Severity::Low => 1,
            Severity::Medium => 2,
            Severity::High => 3,
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            Severity::Low => "#4CAF50",
            Severity::Medium => "#ffa500",
            Severity::High => "#ff4b4b",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }

    /// Maps an average severity score back onto the scale.
    pub fn from_average(avg: f64) -> Severity {
        if avg >= 2.5 {
            Severity::High
        }
        else if avg >= 1.5 {
            Severity::Medium
        }
        else {
            Severity::Low
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}


#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub message: String,
    pub severity: Severity,
    pub kind: String,
    pub timestamp: String,
}

impl Alert {
    pub fn new(message: &str, severity: Severity, kind: &str) -> Self {
        Alert {
            message: message.to_owned(),
            severity,
            kind: kind.to_owned(),
            timestamp: util::iso_now(),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        json!({
            "message": self.message,
            "severity": self.severity.as_str(),
            "color": self.severity.color(),
            "type": self.kind,
            "timestamp": self.timestamp,
        })
    }
}


/// Average the severity scores and threshold the result.
pub fn analyze_risk_level(alerts: &[Alert]) -> RiskLevel {
    if alerts.is_empty() {
        return Severity::Low;
    }

    let total: u32 = alerts.iter().map(|a| a.severity.score()).sum();
    Severity::from_average(total as f64 / alerts.len() as f64)
}

/// The worst severity present, low when there are no alerts.
pub fn worst_severity(alerts: &[Alert]) -> RiskLevel {
    alerts.iter()
        .map(|a| a.severity)
        .max()
        .unwrap_or(Severity::Low)
}

pub fn simulated_alerts<R: Rng + ?Sized>(rng: &mut R) -> Vec<Alert> {
    let possible_alerts = [
        ("Heavy rainfall expected in your area", Severity::Medium, "weather"),
        ("High temperature warning", Severity::High, "weather"),
        ("Air quality alert", Severity::Low, "environmental"),
    ];

    let count = rng.gen_range(1..=2);
    possible_alerts.choose_multiple(rng, count)
        .map(|&(message, severity, kind)| Alert::new(message, severity, kind))
        .collect()
}

pub fn aqi_alert(aqi: u8) -> Option<Alert> {
    match aqi {
        5 => Some(Alert::new("Air quality is very poor. Avoid outdoor activities.",
            Severity::High, "air_quality")),
        4 => Some(Alert::new("Air quality is poor. Sensitive groups should stay indoors.",
            Severity::Medium, "air_quality")),
        3 => Some(Alert::new("Air quality index is moderate. Sensitive groups should take precautions.",
            Severity::Low, "air_quality")),
        _ => None,
    }
}

/// Live alerts for a place. Without a weather key the weather and air
/// quality part is simulated.
pub fn get_disaster_alerts(location: &LocationFix) -> Vec<Alert> {
    let coords = location.coordinates();
    let mut alerts = Vec::new();

    for quake in seismic_sys::quakes_near(coords, SEISMIC_ALERT_RADIUS_KM) {
        alerts.push(quake.to_alert());
    }

    if config::weather_key().is_some() {
        alerts.extend(weather_sys::get_weather_alerts(coords));

        let aqi = log_failure("get_air_quality", weather_sys::get_air_quality(coords));
        if let Some(alert) = aqi.and_then(aqi_alert) {
            alerts.push(alert);
        }
    }
    else {
        alerts.extend(simulated_alerts(&mut rand::thread_rng()));
    }

    alerts
}


#[get("/alerts")]
pub fn get_alerts(mut cookies: Cookies) -> Json<String> {
    let location = session_sys::current_location(&mut cookies);
    let alerts = get_disaster_alerts(&location);
    let risk_level = analyze_risk_level(&alerts);

    let t_alerts = alerts.clone();
    session_sys::with_session(&mut cookies, |session| session.set_alerts(t_alerts, risk_level));

    let parts = alerts.iter().map(Alert::to_json).collect::<Vec<_>>();

    Json(json!({
        "alerts": parts,
        "size": parts.len(),
        "risk_level": risk_level.as_str(),
        "color": risk_level.color(),
    }).to_string())
}


#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn alerts(severities: &[Severity]) -> Vec<Alert> {
        severities.iter()
            .map(|&s| Alert::new("test", s, "weather"))
            .collect()
    }

    #[test]
    fn empty_alerts_are_low() {
        assert_eq!(analyze_risk_level(&[]), Severity::Low);
        assert_eq!(worst_severity(&[]), Severity::Low);
    }

    #[test]
    fn average_thresholds() {
        use Severity::*;

        assert_eq!(analyze_risk_level(&alerts(&[High, High, Medium, High])), High);
        assert_eq!(analyze_risk_level(&alerts(&[High, Medium])), High);
        assert_eq!(analyze_risk_level(&alerts(&[High, Low])), Medium);
        assert_eq!(analyze_risk_level(&alerts(&[Medium, Low])), Medium);
        assert_eq!(analyze_risk_level(&alerts(&[Low, Low, Medium])), Low);
    }

    #[test]
    fn worst_wins() {
        use Severity::*;

        assert_eq!(worst_severity(&alerts(&[Low, Low, High])), High);
        assert_eq!(worst_severity(&alerts(&[Low, Medium])), Medium);
    }

    #[test]
    fn simulated_alerts_are_distinct() {
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..50 {
            let alerts = simulated_alerts(&mut rng);
            assert!(alerts.len() >= 1 && alerts.len() <= 2);

            if alerts.len() == 2 {
                assert_ne!(alerts[0].message, alerts[1].message);
            }
        }
    }

    #[test]
    fn severity_names() {
        assert_eq!(Severity::Medium.to_string(), "medium");
        assert_eq!(Severity::Low.color(), "#4CAF50");
    }

    #[test]
    fn aqi_levels() {
        assert_eq!(aqi_alert(1), None);
        assert_eq!(aqi_alert(2), None);
        assert_eq!(aqi_alert(3).map(|a| a.severity), Some(Severity::Low));
        assert_eq!(aqi_alert(5).map(|a| a.severity), Some(Severity::High));
    }
}
