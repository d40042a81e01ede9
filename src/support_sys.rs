use std::sync::Mutex;

use rocket::{http::Cookies, response::content::Json};
use serde_json::{json, Value as JsonValue};

use crate::api_client::{get_json, log_failure};
use crate::cache::TtlCache;
use crate::config;
use crate::geo::Coordinates;
use crate::session_sys;
use crate::util;


lazy_static! {
    static ref PLACES_CACHE: Mutex<TtlCache<Vec<SupportLocation>>> = {
        Mutex::new(TtlCache::new())
    };
}

const NEARBY_URL: &'static str = "https://maps.googleapis.com/maps/api/place/nearbysearch/json";
const SEARCH_RADIUS: u32 = 5000;
const PLACES_PER_TYPE: usize = 3;

const PLACE_TYPES: [(&'static str, &'static str); 4] = [
    ("hospital", "Hospital"),
    ("police", "Police Station"),
    ("fire_station", "Fire Station"),
    ("local_government_office", "Emergency Shelter"),
];

const EMERGENCY_CONTACTS: [(&'static str, &'static str); 6] = [
    ("Police", "100"),
    ("Ambulance", "108"),
    ("Fire", "101"),
    ("Women Helpline", "1091"),
    ("Child Helpline", "1098"),
    ("National Emergency", "112"),
];


#[derive(Debug, Clone, PartialEq)]
pub struct SupportLocation {
    pub name: String,
    pub kind: String,
    pub label: String,
    pub lat: f64,
    pub lng: f64,
    pub address: String,
    pub rating: Option<f64>,
    pub place_id: Option<String>,
}

impl SupportLocation {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.lat, self.lng)
    }

    pub fn to_json(&self) -> JsonValue {
        json!({
            "name": self.name,
            "type": self.kind,
            "label": self.label,
            "lat": self.lat,
            "lng": self.lng,
            "address": self.address,
            "rating": self.rating,
            "place_id": self.place_id,
        })
    }
}


fn type_label(kind: &str) -> &'static str {
    PLACE_TYPES.iter()
        .find(|(k, _)| *k == kind)
        .map(|&(_, label)| label)
        .unwrap_or("Support Location")
}

pub fn simulated_support_locations(coords: Coordinates) -> Vec<SupportLocation> {
    let near = |name: &str, kind: &str, spot: Coordinates, address: &str, rating: f64| {
        SupportLocation {
            name: name.to_owned(),
            kind: kind.to_owned(),
            label: type_label(kind).to_owned(),
            lat: spot.lat,
            lng: spot.lng,
            address: address.to_owned(),
            rating: Some(rating),
            place_id: None,
        }
    };

    vec![
        near("Central Hospital", "hospital", coords.offset(0.01, 0.01), "123 Main St", 4.5),
        near("Police Station", "police", coords.offset(-0.01, -0.01), "456 Safety Ave", 4.0),
    ]
}

fn parse_places(data: &JsonValue, kind: &str) -> Vec<SupportLocation> {
    let results = match data.get("results").and_then(|v| v.as_array()) {
        Some(results) => results,
        None => return Vec::new(),
    };

    results.iter()
        .filter_map(|place| {
            Some(SupportLocation {
                name: place.get("name")?.as_str()?.to_owned(),
                kind: kind.to_owned(),
                label: type_label(kind).to_owned(),
                lat: place.pointer("/geometry/location/lat")?.as_f64()?,
                lng: place.pointer("/geometry/location/lng")?.as_f64()?,
                address: place.get("vicinity")
                    .and_then(|v| v.as_str())
                    .unwrap_or("Address not available")
                    .to_owned(),
                rating: place.get("rating").and_then(|v| v.as_f64()),
                place_id: place.get("place_id")
                    .and_then(|v| v.as_str())
                    .map(|id| id.to_owned()),
            })
        })
        .take(PLACES_PER_TYPE)
        .collect()
}

fn search_places(coords: Coordinates, key: &str) -> Result<Vec<SupportLocation>, String> {
    let mut places = Vec::new();

    for &(kind, _) in PLACE_TYPES.iter() {
        let data = get_json(NEARBY_URL, &[
            ("location", format!("{},{}", coords.lat, coords.lng)),
            ("radius", SEARCH_RADIUS.to_string()),
            ("type", kind.to_owned()),
            ("key", key.to_owned()),
        ])?;

        places.extend(parse_places(&data, kind));
    }

    Ok(places)
}

/// Hospitals, police and fire stations and shelters near `coords`.
pub fn get_nearby_support_locations(coords: Coordinates) -> Vec<SupportLocation> {
    let key = match config::maps_key() {
        Some(key) => key,
        None => return simulated_support_locations(coords),
    };

    let cache_key = util::location_key("places", coords);
    if let Some(places) = PLACES_CACHE.lock().ok().and_then(|c| c.get(&cache_key)) {
        return places;
    }

    match log_failure("get_nearby_support_locations", search_places(coords, key)) {
        Some(places) => {
            if let Ok(mut cache) = PLACES_CACHE.lock() {
                cache.set(cache_key, places.clone());
            }
            places
        },
        None => Vec::new(),
    }
}

pub fn emergency_contacts() -> JsonValue {
    let contacts = EMERGENCY_CONTACTS.iter()
        .map(|&(service, number)| json!({
            "service": service,
            "number": number,
        }))
        .collect::<Vec<_>>();

    json!({
        "contacts": contacts,
        "size": contacts.len(),
    })
}


#[get("/support-locations")]
pub fn get_support_locations(mut cookies: Cookies) -> Json<String> {
    let location = session_sys::current_location(&mut cookies);
    let places = get_nearby_support_locations(location.coordinates());

    let parts = places.iter().map(SupportLocation::to_json).collect::<Vec<_>>();
    session_sys::with_session(&mut cookies, |s| s.support_locations = places);

    Json(json!({
        "places": parts,
        "size": parts.len(),
    }).to_string())
}

#[get("/emergency-contacts")]
pub fn get_emergency_contacts() -> Json<String> {
    Json(emergency_contacts().to_string())
}
