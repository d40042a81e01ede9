use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Local, NaiveDateTime};
use rand::{
    thread_rng, Rng,
    distributions,
};

use crate::geo::Coordinates;


pub fn generate_rand_id(length: usize) -> String {
    thread_rng()
        .sample_iter(&distributions::Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Seconds since the unix epoch with sub-second precision.
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

pub fn iso_now() -> String {
    Local::now().to_rfc3339()
}

/// Renders an ISO-8601 timestamp as `%Y-%m-%d %H:%M:%S`, returning the input
/// untouched when it can't be parsed.
pub fn format_timestamp(timestamp: &str) -> String {
    if let Ok(dt) = DateTime::parse_from_rfc3339(timestamp) {
        return dt.format("%Y-%m-%d %H:%M:%S").to_string();
    }

    let naive_formats = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];
    naive_formats.iter()
        .filter_map(|fmt| NaiveDateTime::parse_from_str(timestamp, fmt).ok())
        .next()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp.to_owned())
}

/// Cache key for per-area data, about 100 m of precision.
pub fn location_key(prefix: &str, coords: Coordinates) -> String {
    format!("{}:{:.3},{:.3}", prefix, coords.lat, coords.lng)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rand_id_is_alphanumeric() {
        let id = generate_rand_id(32);
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn format_iso_timestamps() {
        assert_eq!(format_timestamp("2024-03-01T12:30:45.123456"), "2024-03-01 12:30:45");
        assert_eq!(format_timestamp("2024-03-01T12:30:45+05:30"), "2024-03-01 12:30:45");
    }

    #[test]
    fn format_keeps_garbage() {
        assert_eq!(format_timestamp("yesterday"), "yesterday");
    }

    #[test]
    fn nearby_points_share_key() {
        let a = location_key("weather", Coordinates::new(17.53731, 78.38411));
        let b = location_key("weather", Coordinates::new(17.53749, 78.38449));
        assert_eq!(a, b);
        assert_eq!(a, "weather:17.537,78.384");
    }
}
