use chrono::Local;
use rocket::{http::Cookies, response::content::Json};
use serde_json::{json, Value as JsonValue};

use crate::alert_sys::{self, RiskLevel, Severity};
use crate::config;
use crate::geo::haversine_distance;
use crate::location_sys::LocationFix;
use crate::session_sys;
use crate::traffic_sys::{self, TrafficIncident};
use crate::util;
use crate::weather_sys::{self, ForecastEntry, WeatherSummary};


/// Forecast entries are three hours apart, eight cover the next day.
const FORECAST_WINDOW: usize = 8;
/// Condition codes below this are thunderstorm, drizzle and rain.
const PRECIPITATION_CODE_LIMIT: u32 = 600;


#[derive(Debug, Clone, PartialEq)]
pub struct Risk {
    pub kind: String,
    pub severity: Severity,
    pub description: String,
    pub recommendations: Vec<String>,
}

impl Risk {
    fn new(kind: &str, severity: Severity, description: String, recommendations: &[&str]) -> Self {
        Risk {
            kind: kind.to_owned(),
            severity,
            description,
            recommendations: recommendations.iter().map(|&r| r.to_owned()).collect(),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        json!({
            "type": self.kind,
            "severity": self.severity.as_str(),
            "description": self.description,
            "recommendations": self.recommendations,
        })
    }
}


pub struct RiskAnalysis {
    pub overall_risk: RiskLevel,
    pub risks: Vec<Risk>,
    pub timestamp: String,
    pub location: LocationFix,
}

impl RiskAnalysis {
    pub fn to_json(&self) -> JsonValue {
        json!({
            "overall_risk": self.overall_risk.as_str(),
            "color": self.overall_risk.color(),
            "risks": self.risks.iter().map(Risk::to_json).collect::<Vec<_>>(),
            "recommendations": safety_recommendations(&self.risks),
            "timestamp": self.timestamp,
            "location": self.location.to_json(),
        })
    }
}


pub fn weather_risks(current: &WeatherSummary, forecast: &[ForecastEntry]) -> Vec<Risk> {
    let mut risks = Vec::new();

    if current.condition_id.is_some() {
        let temp = current.temperature;

        if temp > 35.0 {
            risks.push(Risk::new("Extreme Heat", Severity::High,
                format!("Temperature of {}°C poses heat stress risk", temp),
                &["Stay hydrated", "Avoid outdoor activities", "Find air-conditioned spaces"]));
        }
        else if temp < 0.0 {
            risks.push(Risk::new("Freezing Conditions", Severity::Medium,
                format!("Temperature below freezing at {}°C", temp),
                &["Wear warm clothing", "Watch for ice on roads", "Protect water pipes"]));
        }

        if current.wind_speed > 10.0 {
            risks.push(Risk::new("Strong Winds", Severity::Medium,
                format!("Wind speeds of {} m/s", current.wind_speed),
                &["Secure loose objects", "Be cautious when driving", "Stay away from trees"]));
        }

        if current.condition_id.map_or(false, |id| id < PRECIPITATION_CODE_LIMIT) {
            risks.push(Risk::new("Precipitation", Severity::Medium,
                current.description.clone(),
                &["Carry rain protection", "Watch for flooding", "Drive carefully"]));
        }
    }

    for entry in forecast.iter().take(FORECAST_WINDOW) {
        if entry.condition_id < PRECIPITATION_CODE_LIMIT {
            risks.push(Risk::new("Upcoming Weather", Severity::Low,
                format!("Expected {} in {}", entry.description, entry.dt_txt),
                &["Plan indoor activities", "Prepare rain gear", "Check weather updates"]));
        }
    }

    risks
}

pub fn traffic_risks(rush_hour: bool, location: &LocationFix, incidents: &[TrafficIncident]) -> Vec<Risk> {
    let mut risks = Vec::new();

    if rush_hour {
        risks.push(Risk::new("Heavy Traffic", Severity::Medium,
            "Rush hour congestion expected".into(),
            &["Allow extra travel time", "Consider alternative routes",
                "Use public transportation if available"]));
    }

    for incident in incidents {
        let distance = incident.location
            .map(|spot| format!(" ({:.1} km away)",
                haversine_distance(location.coordinates(), spot) / 1000.0))
            .unwrap_or_default();

        risks.push(Risk::new("Traffic Incident", Severity::Medium,
            format!("{} near {}{}", incident.name, incident.vicinity, distance),
            &["Allow extra travel time", "Consider alternative routes"]));
    }

    risks
}

/// Mean severity score over all risks, low when there are none.
pub fn overall_risk(risks: &[Risk]) -> RiskLevel {
    let total: u32 = risks.iter().map(|r| r.severity.score()).sum();
    let count = risks.len().max(1);

    Severity::from_average(total as f64 / count as f64)
}

/// All recommendations in order, without repeats.
pub fn safety_recommendations(risks: &[Risk]) -> Vec<String> {
    let mut recommendations: Vec<String> = Vec::new();

    for rec in risks.iter().flat_map(|r| r.recommendations.iter()) {
        if !recommendations.contains(rec) {
            recommendations.push(rec.clone());
        }
    }

    recommendations
}

pub fn analyze_location_risks(location: &LocationFix) -> RiskAnalysis {
    let coords = location.coordinates();

    let current = weather_sys::get_weather(coords);
    let forecast = weather_sys::get_forecast(coords);
    let incidents = traffic_sys::get_traffic_incidents(coords);
    let rush_hour = traffic_sys::is_rush_hour(Local::now().time());

    let mut risks = weather_risks(&current, &forecast);
    risks.extend(traffic_risks(rush_hour, location, &incidents));

    RiskAnalysis {
        overall_risk: overall_risk(&risks),
        risks,
        timestamp: util::iso_now(),
        location: location.clone(),
    }
}


fn simulated_risk_factors() -> Vec<Risk> {
    vec![
        Risk::new("Weather", Severity::Medium,
            "Heavy rainfall expected in the next 6 hours".into(),
            &["Avoid flood-prone areas", "Keep emergency supplies ready",
                "Monitor local weather updates"]),
        Risk::new("Traffic", Severity::High,
            "Major road construction on main routes".into(),
            &["Use alternative routes", "Allow extra travel time", "Follow traffic updates"]),
        Risk::new("Health", Severity::Low,
            "Moderate air quality conditions".into(),
            &["Sensitive groups should limit outdoor activities",
                "Keep windows closed during peak hours", "Use air purifiers if available"]),
    ]
}

const RECOMMENDED_ACTIONS: [&'static str; 4] = [
    "Stay updated with local emergency broadcasts",
    "Keep emergency contacts readily available",
    "Plan alternative routes for essential travel",
    "Ensure emergency kit is well-stocked",
];

/// Risk factors with safety tips; the level is the worst alert severity.
pub fn risk_insights(location: &LocationFix, alerts: &[alert_sys::Alert]) -> JsonValue {
    let factors = if config::weather_key().is_some() {
        analyze_location_risks(location).risks
    }
    else {
        simulated_risk_factors()
    };

    let risk_level = alert_sys::worst_severity(alerts);

    json!({
        "risk_level": risk_level.as_str(),
        "color": risk_level.color(),
        "risk_factors": factors.iter().map(|f| json!({
            "type": f.kind,
            "severity": f.severity.as_str(),
            "description": f.description,
            "safety_tips": f.recommendations,
        })).collect::<Vec<_>>(),
        "recommended_actions": RECOMMENDED_ACTIONS,
        "last_updated": util::iso_now(),
    })
}


#[get("/risk-analysis")]
pub fn get_risk_analysis(mut cookies: Cookies) -> Json<String> {
    let location = session_sys::current_location(&mut cookies);
    let analysis = analyze_location_risks(&location);

    info!("Risk analysis for ({:.4}, {:.4}): {} with {} risks",
        location.lat, location.lng, analysis.overall_risk, analysis.risks.len());

    Json(analysis.to_json().to_string())
}

#[get("/risk-insights")]
pub fn get_risk_insights(mut cookies: Cookies) -> Json<String> {
    let location = session_sys::current_location(&mut cookies);
    let alerts = alert_sys::get_disaster_alerts(&location);

    Json(risk_insights(&location, &alerts).to_string())
}
