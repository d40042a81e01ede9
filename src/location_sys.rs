use std::collections::VecDeque;

use rocket::{
    http::Cookies,
    request::Form,
    response::{
        status::BadRequest,
        content::Json,
    },
};
use serde_json::{json, Value as JsonValue};

use crate::api_client::{get_json, log_failure, post_json};
use crate::config::{self, DEFAULT_LAT, DEFAULT_LNG};
use crate::geo::{haversine_distance, Coordinates};
use crate::session_sys;
use crate::util;


type JsonResult = Result<Json<String>, BadRequest<String>>;


pub const HISTORY_LIMIT: usize = 100;
pub const CHANGE_THRESHOLD_METERS: f64 = 50.0;
/// A fix older than this is always considered a change.
pub const CHANGE_THRESHOLD_SECS: f64 = 300.0;
pub const DEFAULT_UPDATE_INTERVAL: u64 = 30;
pub const MIN_UPDATE_INTERVAL: u64 = 10;
pub const MAX_UPDATE_INTERVAL: u64 = 300;
const MAX_ACCURACY: f64 = 1000.0;


#[derive(Debug, Clone, PartialEq)]
pub struct LocationFix {
    pub lat: f64,
    pub lng: f64,
    pub city: String,
    pub sublocality: String,
    pub region: String,
    pub country: String,
    pub postal_code: String,
    pub accuracy: Option<f64>,
    pub formatted_address: String,
    pub timestamp: f64,
    pub source: &'static str,
}

impl LocationFix {
    pub fn new(lat: f64, lng: f64, timestamp: f64, source: &'static str) -> Self {
        LocationFix {
            lat,
            lng,
            city: "Unknown".into(),
            sublocality: String::new(),
            region: "Unknown".into(),
            country: "Unknown".into(),
            postal_code: "Unknown".into(),
            accuracy: None,
            formatted_address: String::new(),
            timestamp,
            source,
        }
    }

    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.lat, self.lng)
    }

    pub fn to_json(&self) -> JsonValue {
        json!({
            "lat": self.lat,
            "lng": self.lng,
            "city": self.city,
            "sublocality": self.sublocality,
            "region": self.region,
            "country": self.country,
            "postal_code": self.postal_code,
            "accuracy": self.accuracy,
            "formatted_address": self.formatted_address,
            "timestamp": self.timestamp,
            "source": self.source,
        })
    }
}


#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovementMetrics {
    /// Meters per second.
    pub speed: f64,
    /// Meters.
    pub distance: f64,
    /// Seconds.
    pub time_elapsed: f64,
}

impl MovementMetrics {
    pub fn to_json(&self) -> JsonValue {
        json!({
            "speed": self.speed,
            "distance": self.distance,
            "time_elapsed": self.time_elapsed,
        })
    }
}


/// Whether `current` differs enough from `previous` to be recorded.
pub fn track_location_changes(previous: Option<&LocationFix>, current: Option<&LocationFix>,
    threshold_meters: f64) -> bool {

    match (previous, current) {
        (Some(prev), Some(cur)) => {
            let distance = haversine_distance(prev.coordinates(), cur.coordinates());
            let time_diff = cur.timestamp - prev.timestamp;

            distance > threshold_meters || time_diff > CHANGE_THRESHOLD_SECS
        },
        _ => true,
    }
}

pub fn calculate_movement_metrics(previous: Option<&LocationFix>, current: Option<&LocationFix>)
    -> Option<MovementMetrics> {

    let (prev, cur) = (previous?, current?);

    let distance = haversine_distance(prev.coordinates(), cur.coordinates());
    let time_elapsed = cur.timestamp - prev.timestamp;

    if time_elapsed > 0.0 {
        Some(MovementMetrics {
            speed: distance / time_elapsed,
            distance,
            time_elapsed,
        })
    }
    else {
        None
    }
}


#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub location: LocationFix,
    pub timestamp: String,
}


/// Current fix, recent history and movement for one dashboard session.
#[derive(Debug, Clone)]
pub struct LocationTracker {
    current: Option<LocationFix>,
    history: VecDeque<HistoryEntry>,
    last_check: Option<f64>,
    update_interval: u64,
    metrics: Option<MovementMetrics>,
}

impl LocationTracker {
    pub fn new() -> Self {
        LocationTracker {
            current: None,
            history: VecDeque::with_capacity(HISTORY_LIMIT),
            last_check: None,
            update_interval: DEFAULT_UPDATE_INTERVAL,
            metrics: None,
        }
    }

    pub fn current(&self) -> Option<&LocationFix> {
        self.current.as_ref()
    }

    pub fn metrics(&self) -> Option<MovementMetrics> {
        self.metrics
    }

    pub fn history(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn update_interval(&self) -> u64 {
        self.update_interval
    }

    pub fn set_update_interval(&mut self, secs: u64) -> Result<(), String> {
        if secs < MIN_UPDATE_INTERVAL || secs > MAX_UPDATE_INTERVAL {
            return Err(format!("Update interval must be between {} and {} seconds",
                MIN_UPDATE_INTERVAL, MAX_UPDATE_INTERVAL));
        }

        self.update_interval = secs;
        Ok(())
    }

    /// True when a new fix should be fetched.
    pub fn is_due(&self, now: f64) -> bool {
        match (self.last_check, self.current.as_ref()) {
            (Some(last), Some(_)) => now - last >= self.update_interval as f64,
            _ => true,
        }
    }

    /// Takes a freshly fetched fix into account.
    pub fn record(&mut self, fix: LocationFix, now: f64) {
        if track_location_changes(self.current.as_ref(), Some(&fix), CHANGE_THRESHOLD_METERS) {
            if self.current.is_some() {
                if let Some(metrics) = calculate_movement_metrics(self.current.as_ref(), Some(&fix)) {
                    self.metrics = Some(metrics);
                }
            }

            self.history.push_back(HistoryEntry {
                location: fix.clone(),
                timestamp: util::iso_now(),
            });
            while self.history.len() > HISTORY_LIMIT {
                self.history.pop_front();
            }

            self.current = Some(fix);
        }

        self.last_check = Some(now);
    }

    /// Fetches a new fix through `provider` when the interval has passed.
    pub fn update<F>(&mut self, now: f64, provider: F) -> Option<&LocationFix> where
        F: FnOnce() -> Option<LocationFix> {

        if self.is_due(now) {
            match provider() {
                Some(fix) => self.record(fix, now),
                None => self.last_check = Some(now),
            }
        }

        self.current.as_ref()
    }

    /// Replaces the current fix with a user supplied position. Counts as a
    /// location check.
    pub fn override_location(&mut self, lat: f64, lng: f64, now: f64) -> &LocationFix {
        let mut fix = LocationFix::new(lat, lng, now, "manual");

        if let Some(cur) = self.current.as_ref() {
            fix.city = cur.city.clone();
            fix.region = cur.region.clone();
            fix.country = cur.country.clone();
        }

        self.last_check = Some(now);
        self.current.insert(fix)
    }

    pub fn to_json(&self) -> JsonValue {
        json!({
            "location": self.current.as_ref().map(LocationFix::to_json),
            "movement": self.metrics.map(|m| m.to_json()),
            "update_interval": self.update_interval,
            "history_size": self.history.len(),
        })
    }
}


pub fn default_location() -> LocationFix {
    let mut fix = LocationFix::new(DEFAULT_LAT, DEFAULT_LNG, util::unix_now(), "default");
    fix.city = "New York".into();
    fix.region = "New York".into();
    fix.country = "United States".into();
    fix.accuracy = Some(MAX_ACCURACY);
    fix.formatted_address = "New York, NY, United States".into();
    fix
}

/// Coarse IP based lookup.
pub fn ip_location() -> Result<LocationFix, String> {
    let data = get_json("https://ipapi.co/json/", &[])?;
    parse_ip_location(&data, util::unix_now())
}

fn parse_ip_location(data: &JsonValue, now: f64) -> Result<LocationFix, String> {
    let coord = |name: &str| {
        data.get(name)
            .and_then(|v| v.as_f64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
            .ok_or(format!("Missing {}", name))
    };
    let text = |name: &str| {
        data.get(name).and_then(|v| v.as_str())
            .unwrap_or("Unknown")
            .to_owned()
    };

    let mut fix = LocationFix::new(coord("latitude")?, coord("longitude")?, now, "ip_geolocation");
    fix.city = text("city");
    fix.region = text("region");
    fix.country = text("country_name");
    fix.postal_code = text("postal");
    fix.accuracy = Some(MAX_ACCURACY);
    fix.formatted_address = format!("{}, {}, {}", fix.city, fix.region, fix.country);

    Ok(fix)
}

/// Google geolocation with reverse geocoding.
pub fn google_location(key: &str) -> Result<LocationFix, String> {
    let geolocate = post_json("https://www.googleapis.com/geolocation/v1/geolocate",
        &[("key", key.to_owned())],
        &json!({ "considerIp": true }))?;

    let lat = geolocate.pointer("/location/lat").and_then(|v| v.as_f64());
    let lng = geolocate.pointer("/location/lng").and_then(|v| v.as_f64());
    let (lat, lng) = match (lat, lng) {
        (Some(lat), Some(lng)) => (lat, lng),
        _ => return Err("Geolocation response has no location".into()),
    };

    let accuracy = geolocate.get("accuracy")
        .and_then(|v| v.as_f64())
        .unwrap_or(MAX_ACCURACY)
        .min(MAX_ACCURACY);

    let geocode = get_json("https://maps.googleapis.com/maps/api/geocode/json", &[
        ("latlng", format!("{},{}", lat, lng)),
        ("key", key.to_owned()),
    ])?;

    let mut fix = parse_reverse_geocode(&geocode, lat, lng, util::unix_now())?;
    fix.accuracy = Some(accuracy);
    Ok(fix)
}

fn parse_reverse_geocode(data: &JsonValue, lat: f64, lng: f64, now: f64) -> Result<LocationFix, String> {
    let first = data.pointer("/results/0")
        .ok_or("Reverse geocoding returned no results".to_owned())?;
    let components = first.get("address_components")
        .and_then(|v| v.as_array())
        .map(|v| v.as_slice())
        .unwrap_or(&[]);

    let component = |kind: &str| {
        components.iter()
            .find(|comp| {
                comp.get("types")
                    .and_then(|t| t.as_array())
                    .map(|types| types.iter().any(|t| t.as_str() == Some(kind)))
                    .unwrap_or(false)
            })
            .and_then(|comp| comp.get("long_name"))
            .and_then(|name| name.as_str())
            .map(|name| name.to_owned())
    };

    let mut fix = LocationFix::new(lat, lng, now, "google_maps");
    fix.city = component("locality").unwrap_or_else(|| "Unknown".into());
    fix.sublocality = component("sublocality").unwrap_or_default();
    fix.region = component("administrative_area_level_1").unwrap_or_else(|| "Unknown".into());
    fix.country = component("country").unwrap_or_else(|| "Unknown".into());
    fix.postal_code = component("postal_code").unwrap_or_else(|| "Unknown".into());
    fix.formatted_address = first.get("formatted_address")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_owned();

    Ok(fix)
}

/// Best available fix: Google, then IP lookup, then the default location.
pub fn precise_location() -> LocationFix {
    if let Some(key) = config::maps_key() {
        match google_location(key) {
            Ok(fix) => return fix,
            Err(err) => warn!("Google Maps geolocation failed: {}", err),
        }
    }

    log_failure("ip_location", ip_location())
        .unwrap_or_else(default_location)
}


#[derive(FromForm)]
pub struct LocationForm {
    lat: f64,
    lng: f64,
}


#[get("/location")]
pub fn get_location(mut cookies: Cookies) -> Json<String> {
    session_sys::current_location(&mut cookies);

    let tracker = session_sys::with_session(&mut cookies, |s| s.tracker.to_json());
    Json(tracker.to_string())
}

#[post("/location/refresh")]
pub fn post_refresh_location(mut cookies: Cookies) -> Json<String> {
    let fix = precise_location();
    let now = util::unix_now();

    let tracker = session_sys::with_session(&mut cookies, |s| {
        s.tracker.record(fix, now);
        s.tracker.to_json()
    });
    Json(tracker.to_string())
}

#[post("/location", format="application/x-www-form-urlencoded", data="<form>")]
pub fn post_location(form: Option<Form<LocationForm>>, mut cookies: Cookies) -> JsonResult {
    let form = form.ok_or(BadRequest(Some("Invalid form".into())))?;

    if !Coordinates::new(form.lat, form.lng).is_valid() {
        return Err(BadRequest(Some("Invalid coordinates".into())));
    }

    let now = util::unix_now();
    let fix = session_sys::with_session(&mut cookies, |s| {
        s.tracker.override_location(form.lat, form.lng, now).to_json()
    });

    info!("Manual location override to ({}, {})", form.lat, form.lng);
    Ok(Json(fix.to_string()))
}

#[get("/location/history")]
pub fn get_location_history(mut cookies: Cookies) -> Json<String> {
    let history = session_sys::with_session(&mut cookies, |s| {
        s.tracker.history()
            .map(|entry| json!({
                "location": entry.location.to_json(),
                "timestamp": entry.timestamp,
            }))
            .collect::<Vec<_>>()
    });

    Json(json!({
        "history": history,
        "size": history.len(),
    }).to_string())
}

#[post("/location/interval?<secs>")]
pub fn post_update_interval(secs: u64, mut cookies: Cookies) -> Result<String, BadRequest<String>> {
    session_sys::with_session(&mut cookies, |s| s.tracker.set_update_interval(secs))
        .map(|()| secs.to_string())
        .map_err(|err| BadRequest(Some(err)))
}
