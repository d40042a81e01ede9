use std::{env, time::Duration};


lazy_static! {
    static ref WEATHER_KEY: Option<String> = read_key("OPENWEATHER_API_KEY");
    static ref MAPS_KEY: Option<String> = read_key("GOOGLE_MAPS_API_KEY");
}

pub const API_TIMEOUT: Duration = Duration::from_secs(10);
pub const CACHE_TTL: Duration = Duration::from_secs(5 * 60);

pub const DEFAULT_LAT: f64 = 40.7128;
pub const DEFAULT_LNG: f64 = -74.0060;
pub const DEFAULT_ZOOM: u32 = 13;

pub const EMERGENCY_TYPES: [&'static str; 5] = [
    "Medical",
    "Fire",
    "Police",
    "Natural Disaster",
    "Other",
];


fn read_key(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(ref key) if !key.trim().is_empty() => Some(key.trim().to_owned()),
        _ => {
            warn!("{} is not set, related data will be simulated", name);
            None
        },
    }
}

pub fn weather_key() -> Option<&'static str> {
    WEATHER_KEY.as_ref().map(|key| key.as_str())
}

pub fn maps_key() -> Option<&'static str> {
    MAPS_KEY.as_ref().map(|key| key.as_str())
}

pub fn sentry_dsn() -> Option<String> {
    env::var("SENTRY_DSN").ok()
        .filter(|dsn| !dsn.trim().is_empty())
}

pub fn rocket_env() -> String {
    env::var("ROCKET_ENV")
        .unwrap_or_else(|_| {
            if cfg!(debug_assertions) {
                "development".into()
            }
            else {
                "production".into()
            }
        })
}

pub fn is_debug_env(rocket_env: &str) -> bool {
    let dbg_envs = ["dev", "development", "staging", "stage"];
    dbg_envs.iter().any(|&v| v == rocket_env)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_envs() {
        assert!(is_debug_env("dev"));
        assert!(is_debug_env("staging"));
        assert!(!is_debug_env("production"));
        assert!(!is_debug_env("prod"));
    }
}
