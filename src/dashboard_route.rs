use rocket::{
    http::Cookies,
    response::content::Json,
};
use serde_json::json;

use crate::alert_sys::{self, Alert};
use crate::config::{self, CACHE_TTL};
use crate::session_sys;
use crate::util;
use crate::weather_sys;


/// Everything the front page needs in one request.
#[get("/dashboard")]
pub fn get_dashboard(mut cookies: Cookies) -> Json<String> {
    let location = session_sys::current_location(&mut cookies);

    let (cached, metrics, interval) = session_sys::with_session(&mut cookies, |s| {
        (s.fresh_alerts(CACHE_TTL), s.tracker.metrics(), s.tracker.update_interval())
    });

    let (alerts, risk_level) = match cached {
        Some(cached) => cached,
        None => {
            let alerts = alert_sys::get_disaster_alerts(&location);
            let risk_level = alert_sys::analyze_risk_level(&alerts);

            let t_alerts = alerts.clone();
            session_sys::with_session(&mut cookies, |s| s.set_alerts(t_alerts, risk_level));
            (alerts, risk_level)
        },
    };

    let weather = weather_sys::get_weather(location.coordinates());

    Json(json!({
        "location": location.to_json(),
        "movement": metrics.map(|m| m.to_json()),
        "update_interval": interval,
        "weather": weather.to_json(),
        "alerts": alerts.iter().map(Alert::to_json).collect::<Vec<_>>(),
        "risk_level": risk_level.as_str(),
        "risk_color": risk_level.color(),
        "map": {
            "center": [location.lat, location.lng],
            "zoom": config::DEFAULT_ZOOM,
        },
        "emergency_types": config::EMERGENCY_TYPES,
        "active_sessions": session_sys::session_count(),
        "last_updated": util::format_timestamp(&util::iso_now()),
    }).to_string())
}
