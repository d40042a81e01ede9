use chrono::{NaiveTime, Timelike};
use serde_json::Value as JsonValue;

use crate::api_client::{get_json, log_failure};
use crate::config;
use crate::geo::Coordinates;


const PLACES_URL: &'static str = "https://maps.googleapis.com/maps/api/place/nearbysearch/json";
const SEARCH_RADIUS: u32 = 5000;

const MORNING_RUSH: (u32, u32) = (7 * 3600, 10 * 3600);
const EVENING_RUSH: (u32, u32) = (16 * 3600, 19 * 3600);


#[derive(Debug, Clone, PartialEq)]
pub struct TrafficIncident {
    pub name: String,
    pub vicinity: String,
    pub location: Option<Coordinates>,
}


pub fn is_rush_hour(time: NaiveTime) -> bool {
    let secs = time.num_seconds_from_midnight();
    let within = |(begin, end): (u32, u32)| secs >= begin && secs <= end;

    within(MORNING_RUSH) || within(EVENING_RUSH)
}

/// Incidents reported around `coords`, empty without a maps key.
pub fn get_traffic_incidents(coords: Coordinates) -> Vec<TrafficIncident> {
    let key = match config::maps_key() {
        Some(key) => key,
        None => return Vec::new(),
    };

    let query = [
        ("location", format!("{},{}", coords.lat, coords.lng)),
        ("radius", SEARCH_RADIUS.to_string()),
        ("type", "traffic".to_owned()),
        ("key", key.to_owned()),
    ];

    log_failure("get_traffic_incidents", get_json(PLACES_URL, &query))
        .map(|data| parse_incidents(&data))
        .unwrap_or_default()
}

fn parse_incidents(data: &JsonValue) -> Vec<TrafficIncident> {
    data.get("results")
        .and_then(|v| v.as_array())
        .map(|results| {
            results.iter()
                .filter_map(|r| {
                    let name = r.get("name")?.as_str()?.to_owned();
                    let lat = r.pointer("/geometry/location/lat").and_then(|v| v.as_f64());
                    let lng = r.pointer("/geometry/location/lng").and_then(|v| v.as_f64());

                    Some(TrafficIncident {
                        name,
                        vicinity: r.get("vicinity")
                            .and_then(|v| v.as_str())
                            .unwrap_or_default()
                            .to_owned(),
                        location: match (lat, lng) {
                            (Some(lat), Some(lng)) => Some(Coordinates::new(lat, lng)),
                            _ => None,
                        },
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}
