use std::{
    sync::RwLock,
    time::Duration,
};
use rocket::{
    response::content::Json,
};
use serde_json::{json, Value as JsonValue};

use crate::alert_sys::{Alert, Severity};
use crate::api_client::get_json;
use crate::geo::{haversine_distance, Coordinates};
use crate::task_scheduler::{Task, TaskSchedulerBuilder};


lazy_static! {
    static ref QUAKE_LIST: RwLock<Vec<Quake>> = {
        RwLock::new(Vec::new())
    };
    static ref SEISMIC_DATA: RwLock<String> = {
        RwLock::new(empty_map())
    };
}

const FEED_URL: &'static str = "https://earthquake.usgs.gov/earthquakes/feed/v1.0/summary/all_day.geojson";
const REFRESH_PERIOD: u64 = 60 * 5;
const RETRY_PERIOD: u64 = 60;


#[derive(Debug, Clone, PartialEq)]
pub struct Quake {
    pub magnitude: f64,
    pub place: String,
    /// Milliseconds since the unix epoch.
    pub time: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub depth: f64,
}

impl Quake {
    pub fn severity(&self) -> Severity {
        if self.magnitude >= 6.0 {
            Severity::High
        }
        else if self.magnitude >= 4.5 {
            Severity::Medium
        }
        else {
            Severity::Low
        }
    }

    pub fn to_alert(&self) -> Alert {
        let message = format!("M{:.1} earthquake - {}", self.magnitude, self.place);
        Alert::new(&message, self.severity(), "seismic")
    }

    fn to_json(&self) -> JsonValue {
        json!({
            "mag": self.magnitude,
            "place": self.place,
            "time": self.time,
            "latitude": self.latitude,
            "longitude": self.longitude,
            "depth": self.depth,
            "severity": self.severity().as_str(),
        })
    }
}


pub fn init_seismic_sys(scheduler: &mut TaskSchedulerBuilder) {
    let delay = match get_quakes() {
        Ok(quakes) => {
            update_quakes(quakes);
            Duration::from_secs(REFRESH_PERIOD)
        },
        Err(err) => {
            warn!("Fail to init seismic cache: {}", err);
            Duration::from_secs(RETRY_PERIOD)
        },
    };

    scheduler.add_task(Task::new("seismic", seismic_job, delay));
}

#[get("/seismic-map")]
pub fn get_seismic_map() -> Json<String> {
    Json(SEISMIC_DATA.read()
        .map(|data| data.clone())
        .unwrap_or_else(|_| empty_map()))
}

/// Cached quakes within `radius_km` of `coords`.
pub fn quakes_near(coords: Coordinates, radius_km: f64) -> Vec<Quake> {
    let list = match QUAKE_LIST.read() {
        Ok(list) => list,
        Err(_) => return Vec::new(),
    };

    list.iter()
        .filter(|q| {
            let epicenter = Coordinates::new(q.latitude, q.longitude);
            haversine_distance(coords, epicenter) <= radius_km * 1000.0
        })
        .cloned()
        .collect()
}


fn seismic_job() -> Duration {
    info!("Start job");

    match get_quakes() {
        Ok(quakes) => {
            update_quakes(quakes);
            Duration::from_secs(REFRESH_PERIOD)
        },
        Err(err) => {
            warn!("Fail to get seismic data: {}", err);
            Duration::from_secs(RETRY_PERIOD)
        },
    }
}

fn empty_map() -> String {
    json!({
        "quakes": [],
        "size": 0,
    }).to_string()
}

fn update_quakes(quakes: Vec<Quake>) {
    let parts = quakes.iter().map(Quake::to_json).collect::<Vec<_>>();
    let map_data = json!({
        "quakes": parts,
        "size": parts.len(),
    }).to_string();

    if let Ok(mut data) = SEISMIC_DATA.write() {
        *data = map_data;
    }
    if let Ok(mut list) = QUAKE_LIST.write() {
        *list = quakes;
    }
}

fn get_quakes() -> Result<Vec<Quake>, String> {
    get_json(FEED_URL, &[])
        .and_then(|data| parse_feed(&data))
}

fn parse_feed(data: &JsonValue) -> Result<Vec<Quake>, String> {
    let features = data.get("features")
        .and_then(|v| v.as_array())
        .ok_or("Feed has no features".to_owned())?;

    let quakes = features.iter()
        .filter_map(|f| {
            let props = f.get("properties")?;
            let coords = f.pointer("/geometry/coordinates")?.as_array()?;

            Some(Quake {
                magnitude: props.get("mag")?.as_f64()?,
                place: props.get("place")
                    .and_then(|v| v.as_str())
                    .unwrap_or("Unknown")
                    .to_owned(),
                time: props.get("time").and_then(|v| v.as_i64()).unwrap_or_default(),
                longitude: coords.get(0)?.as_f64()?,
                latitude: coords.get(1)?.as_f64()?,
                depth: coords.get(2).and_then(|v| v.as_f64()).unwrap_or_default(),
            })
        })
        .collect();

    Ok(quakes)
}
