use chrono::Utc;
use rand::{Rng, seq::SliceRandom};
use rocket::{
    http::Cookies,
    response::{
        status::BadRequest,
        content::Json,
    },
};
use serde_json::{json, Value as JsonValue};

use crate::alert_sys::Severity;
use crate::api_client::{get_json, log_failure};
use crate::config::{self, DEFAULT_ZOOM};
use crate::geo::{haversine_distance, Coordinates};
use crate::location_sys::LocationFix;
use crate::session_sys;
use crate::support_sys::SupportLocation;


type JsonResult = Result<Json<String>, BadRequest<String>>;


const DIRECTIONS_URL: &'static str = "https://maps.googleapis.com/maps/api/directions/json";
/// Speed assumed for routes estimated without a directions service.
const FALLBACK_SPEED_KMH: f64 = 40.0;
const FALLBACK_SEGMENTS: usize = 8;
const ZONE_JITTER: f64 = 0.001;
const ZONE_RADIUS: f64 = 100.0;

const RISK_ZONE_TYPES: [&'static str; 5] = [
    "Construction Zone",
    "Traffic Congestion",
    "Weather Hazard",
    "Road Closure",
    "Accident Prone Area",
];

const STEP_ICONS: [(&'static str, &'static str); 12] = [
    ("left", "↰"),
    ("right", "↱"),
    ("slight left", "↖"),
    ("slight right", "↗"),
    ("sharp left", "⬉"),
    ("sharp right", "⬈"),
    ("straight", "⬆"),
    ("merge", "↱"),
    ("roundabout", "⟳"),
    ("uturn", "⮌"),
    ("destination", "📍"),
    ("start", "🚩"),
];
const DEFAULT_STEP_ICON: &'static str = "▪";
const START_ICON: &'static str = "🚩";


#[derive(Debug, Clone, PartialEq)]
pub struct RouteStep {
    pub instruction: String,
    pub distance: String,
    pub duration: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteInfo {
    pub distance: String,
    pub duration: String,
    pub coordinates: Vec<Coordinates>,
    pub steps: Vec<RouteStep>,
}

impl RouteInfo {
    pub fn to_json(&self) -> JsonValue {
        json!({
            "distance": self.distance,
            "duration": self.duration,
            "coordinates": self.coordinates.iter().map(Coordinates::to_pair).collect::<Vec<_>>(),
            "steps": self.steps.iter().enumerate().map(|(i, step)| json!({
                "instruction": step.instruction,
                "distance": step.distance,
                "duration": step.duration,
                "formatted": format_route_step(step, i + 1),
            })).collect::<Vec<_>>(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RiskZone {
    pub lat: f64,
    pub lng: f64,
    pub risk_level: Severity,
    pub description: String,
}


fn text_at<'a>(value: &'a JsonValue, ptr: &str) -> &'a str {
    value.pointer(ptr)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
}

fn coords_at(value: &JsonValue, ptr: &str) -> Option<Coordinates> {
    let spot = value.pointer(ptr)?;
    Some(Coordinates::new(spot.get("lat")?.as_f64()?, spot.get("lng")?.as_f64()?))
}

fn parse_directions(data: &JsonValue) -> Result<RouteInfo, String> {
    let leg = data.pointer("/routes/0/legs/0")
        .ok_or("No route found".to_owned())?;
    let steps = leg.get("steps")
        .and_then(|v| v.as_array())
        .filter(|steps| !steps.is_empty())
        .ok_or("Route has no steps".to_owned())?;

    let mut coordinates = steps.iter()
        .filter_map(|step| coords_at(step, "/start_location"))
        .collect::<Vec<_>>();
    if let Some(end) = steps.last().and_then(|step| coords_at(step, "/end_location")) {
        coordinates.push(end);
    }

    Ok(RouteInfo {
        distance: text_at(leg, "/distance/text").to_owned(),
        duration: text_at(leg, "/duration/text").to_owned(),
        coordinates,
        steps: steps.iter()
            .map(|step| RouteStep {
                instruction: text_at(step, "/html_instructions").to_owned(),
                distance: text_at(step, "/distance/text").to_owned(),
                duration: text_at(step, "/duration/text").to_owned(),
            })
            .collect(),
    })
}

fn format_distance(meters: f64) -> String {
    if meters >= 1000.0 {
        format!("{:.1} km", meters / 1000.0)
    }
    else {
        format!("{:.0} m", meters)
    }
}

fn format_duration(secs: f64) -> String {
    let mins = (secs / 60.0).round().max(1.0) as u64;
    if mins >= 60 {
        format!("{} hours {} mins", mins / 60, mins % 60)
    }
    else {
        format!("{} mins", mins)
    }
}

/// Straight line route used when no directions service is configured.
pub fn estimate_route(origin: Coordinates, destination: Coordinates) -> RouteInfo {
    let meters = haversine_distance(origin, destination);
    let secs = meters / (FALLBACK_SPEED_KMH * 1000.0 / 3600.0);

    let coordinates = (0..=FALLBACK_SEGMENTS)
        .map(|i| {
            let t = i as f64 / FALLBACK_SEGMENTS as f64;
            Coordinates::new(
                origin.lat + (destination.lat - origin.lat) * t,
                origin.lng + (destination.lng - origin.lng) * t)
        })
        .collect();

    RouteInfo {
        distance: format_distance(meters),
        duration: format_duration(secs),
        coordinates,
        steps: vec![
            RouteStep {
                instruction: "Head toward <b>destination</b>".into(),
                distance: format_distance(meters),
                duration: format_duration(secs),
            },
        ],
    }
}

pub fn get_route(origin: Coordinates, destination: Coordinates) -> Option<RouteInfo> {
    let key = match config::maps_key() {
        Some(key) => key,
        None => return Some(estimate_route(origin, destination)),
    };

    let result = get_json(DIRECTIONS_URL, &[
        ("origin", format!("{},{}", origin.lat, origin.lng)),
        ("destination", format!("{},{}", destination.lat, destination.lng)),
        ("mode", "driving".to_owned()),
        ("alternatives", "true".to_owned()),
        ("departure_time", Utc::now().timestamp().to_string()),
        ("key", key.to_owned()),
    ])
    .and_then(|data| parse_directions(&data));

    log_failure("get_route", result)
}

/// Random hazards scattered along a route.
pub fn risk_zones<R: Rng + ?Sized>(coordinates: &[Coordinates], rng: &mut R) -> Vec<RiskZone> {
    if coordinates.is_empty() {
        return Vec::new();
    }

    let count = rng.gen_range(2..=5);
    let mut zones = Vec::with_capacity(count);

    for _ in 0..count {
        let (point, kind) = match (coordinates.choose(rng), RISK_ZONE_TYPES.choose(rng)) {
            (Some(point), Some(kind)) => (point, kind),
            _ => break,
        };
        let risk_level = if rng.gen_bool(0.5) { Severity::High } else { Severity::Medium };

        zones.push(RiskZone {
            lat: point.lat + rng.gen_range(-ZONE_JITTER..=ZONE_JITTER),
            lng: point.lng + rng.gen_range(-ZONE_JITTER..=ZONE_JITTER),
            risk_level,
            description: format!("{} - Exercise Caution", kind),
        });
    }

    zones
}

/// One human friendly line per route step. `index` starts at 1.
pub fn format_route_step(step: &RouteStep, index: usize) -> String {
    let instruction = step.instruction
        .replace("<b>", "")
        .replace("</b>", "")
        .replace("Destination will be", "")
        .replace("Head", "Go");

    let lower = instruction.to_lowercase();
    let icon = if index == 1 {
        START_ICON
    }
    else {
        STEP_ICONS.iter()
            .find(|(key, _)| lower.contains(key))
            .map(|&(_, icon)| icon)
            .unwrap_or(DEFAULT_STEP_ICON)
    };

    let time_info = if step.duration.is_empty() {
        String::new()
    }
    else {
        format!("({})", step.duration)
    };

    format!("{} {} - {} {}", icon, instruction, step.distance, time_info)
        .trim_end()
        .to_owned()
}

/// Layers a front-end needs to draw the route.
pub fn route_map(user: Coordinates, destination: &SupportLocation, route: Option<&RouteInfo>,
    zones: &[RiskZone]) -> JsonValue {

    let mut layers = vec![
        json!({
            "kind": "marker",
            "location": user.to_pair(),
            "popup": "Your Location",
            "color": "red",
            "icon": "info-sign",
        }),
        json!({
            "kind": "marker",
            "location": destination.coordinates().to_pair(),
            "popup": format!("Destination: {}", destination.name),
            "color": "green",
            "icon": "flag",
        }),
    ];

    if let Some(route) = route {
        layers.push(json!({
            "kind": "polyline",
            "locations": route.coordinates.iter().map(Coordinates::to_pair).collect::<Vec<_>>(),
            "weight": 3,
            "color": "blue",
            "opacity": 0.8,
        }));

        for zone in zones {
            let color = if zone.risk_level == Severity::High { "red" } else { "orange" };
            layers.push(json!({
                "kind": "circle",
                "location": [zone.lat, zone.lng],
                "radius": ZONE_RADIUS,
                "color": color,
                "fill": true,
                "popup": format!("Risk Zone: {}", zone.description),
            }));
        }
    }

    json!({
        "center": user.to_pair(),
        "zoom": DEFAULT_ZOOM,
        "layers": layers,
    })
}

fn zone_json(zone: &RiskZone) -> JsonValue {
    json!({
        "lat": zone.lat,
        "lng": zone.lng,
        "risk_level": zone.risk_level.as_str(),
        "description": zone.description,
    })
}


fn session_route(cookies: &mut Cookies) -> Result<(LocationFix, SupportLocation, Option<RouteInfo>), String> {
    let location = session_sys::current_location(cookies);
    let (destination, route) = session_sys::with_session(cookies, |s| {
        (s.selected_destination.clone(), s.route_info.clone())
    });
    let destination = destination.ok_or("No destination selected".to_owned())?;

    let route = match route {
        Some(route) => Some(route),
        None => {
            let route = get_route(location.coordinates(), destination.coordinates());
            let t_route = route.clone();
            session_sys::with_session(cookies, |s| s.route_info = t_route);
            route
        },
    };

    Ok((location, destination, route))
}

#[post("/destination?<index>")]
pub fn post_destination(index: usize, mut cookies: Cookies) -> JsonResult {
    let selected = session_sys::with_session(&mut cookies, |s| {
        let place = s.support_locations.get(index).cloned();
        if place.is_some() {
            s.selected_destination = place.clone();
            s.route_info = None;
        }
        place
    });

    match selected {
        Some(place) => Ok(Json(place.to_json().to_string())),
        None => Err(BadRequest(Some("Unknown destination".into()))),
    }
}

#[get("/route")]
pub fn get_route_info(mut cookies: Cookies) -> JsonResult {
    let (_, destination, route) = session_route(&mut cookies)
        .map_err(|err| BadRequest(Some(err)))?;

    let route = route.ok_or(BadRequest(Some("Route is unavailable".into())))?;
    let zones = risk_zones(&route.coordinates, &mut rand::thread_rng());

    Ok(Json(json!({
        "destination": destination.to_json(),
        "route": route.to_json(),
        "risk_zones": zones.iter().map(zone_json).collect::<Vec<_>>(),
    }).to_string()))
}

#[get("/route-map")]
pub fn get_route_map(mut cookies: Cookies) -> JsonResult {
    let (location, destination, route) = session_route(&mut cookies)
        .map_err(|err| BadRequest(Some(err)))?;

    let zones = route.as_ref()
        .map(|r| risk_zones(&r.coordinates, &mut rand::thread_rng()))
        .unwrap_or_default();

    Ok(Json(route_map(location.coordinates(), &destination, route.as_ref(), &zones).to_string()))
}
