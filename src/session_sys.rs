use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};
use rocket::http::{Cookie, Cookies};

use crate::alert_sys::{Alert, RiskLevel, Severity};
use crate::location_sys::{self, LocationFix, LocationTracker};
use crate::route_sys::RouteInfo;
use crate::support_sys::SupportLocation;
use crate::util;


lazy_static! {
    static ref SESSION_MAP: Mutex<HashMap<String, Session>> = {
        Mutex::new(HashMap::new())
    };
}

const COOKIE_NAME: &'static str = "session_id";
const MAX_MAP_SIZE: usize = 512;
const SESSION_IDLE_LIMIT: u64 = 60 * 60;


/// Transient dashboard state of one visitor.
pub struct Session {
    pub tracker: LocationTracker,
    pub support_locations: Vec<SupportLocation>,
    pub selected_destination: Option<SupportLocation>,
    pub route_info: Option<RouteInfo>,
    pub alerts: Vec<Alert>,
    pub risk_level: RiskLevel,
    pub help_request_ids: Vec<String>,
    alerts_time: Option<Instant>,
    last_access: Instant,
}

impl Session {
    fn new() -> Self {
        Session {
            tracker: LocationTracker::new(),
            support_locations: Vec::new(),
            selected_destination: None,
            route_info: None,
            alerts: Vec::new(),
            risk_level: Severity::Low,
            help_request_ids: Vec::new(),
            alerts_time: None,
            last_access: Instant::now(),
        }
    }

    fn is_idle(&self, limit: Duration) -> bool {
        self.last_access.elapsed() > limit
    }

    /// Stores freshly fetched alerts together with their risk level.
    pub fn set_alerts(&mut self, alerts: Vec<Alert>, risk_level: RiskLevel) {
        self.alerts = alerts;
        self.risk_level = risk_level;
        self.alerts_time = Some(Instant::now());
    }

    /// Stored alerts and their risk level, unless fetched longer than
    /// `ttl` ago.
    pub fn fresh_alerts(&self, ttl: Duration) -> Option<(Vec<Alert>, RiskLevel)> {
        self.alerts_time
            .filter(|time| time.elapsed() <= ttl)
            .map(|_| (self.alerts.clone(), self.risk_level))
    }
}


fn session_id(cookies: &mut Cookies) -> String {
    if let Some(cookie) = cookies.get_private(COOKIE_NAME) {
        return cookie.value().to_owned();
    }

    let id = util::generate_rand_id(32);
    cookies.add_private(Cookie::new(COOKIE_NAME, id.clone()));
    id
}

/// Runs `f` on the caller's session, creating it when needed.
/// Don't do network work inside `f`, the session map is locked meanwhile.
pub fn with_session<F, R>(cookies: &mut Cookies, f: F) -> R where
    F: FnOnce(&mut Session) -> R {

    let id = session_id(cookies);

    let mut map = match SESSION_MAP.lock() {
        Ok(map) => map,
        Err(poisoned) => {
            warn!("Session map was poisoned");
            poisoned.into_inner()
        },
    };

    if !map.contains_key(&id) && map.len() >= MAX_MAP_SIZE {
        make_room(&mut map, MAX_MAP_SIZE, Duration::from_secs(SESSION_IDLE_LIMIT));
    }

    let session = map.entry(id).or_insert_with(Session::new);
    session.last_access = Instant::now();

    f(session)
}

/// Drops idle sessions, then the least recently used one while still full.
fn make_room(map: &mut HashMap<String, Session>, max_size: usize, idle_limit: Duration) {
    map.retain(|_, s| !s.is_idle(idle_limit));

    while map.len() >= max_size {
        let oldest = map.iter()
            .min_by_key(|(_, s)| s.last_access)
            .map(|(id, _)| id.clone());

        match oldest {
            Some(id) => {
                map.remove(&id);
            },
            None => break,
        }
    }
}

/// The session's location, refreshed when its update interval has passed.
pub fn current_location(cookies: &mut Cookies) -> LocationFix {
    let now = util::unix_now();
    let cached = with_session(cookies, |s| {
        if s.tracker.is_due(now) {
            None
        }
        else {
            s.tracker.current().cloned()
        }
    });

    if let Some(fix) = cached {
        return fix;
    }

    let fix = location_sys::precise_location();

    with_session(cookies, |s| {
        s.tracker.record(fix.clone(), now);
        s.tracker.current().cloned()
    })
    .unwrap_or(fix)
}

pub fn session_count() -> usize {
    SESSION_MAP.lock()
        .map(|map| map.len())
        .unwrap_or_default()
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn sessions(ids: &[&str]) -> HashMap<String, Session> {
        ids.iter()
            .map(|&id| (id.to_owned(), Session::new()))
            .collect()
    }

    #[test]
    fn idle_sessions_are_pruned() {
        let mut map = sessions(&["a", "b", "c"]);
        thread::sleep(Duration::from_millis(30));

        if let Some(s) = map.get_mut("b") {
            s.last_access = Instant::now();
        }

        make_room(&mut map, 3, Duration::from_millis(20));
        assert_eq!(map.len(), 1);
        assert!(map.contains_key("b"));
    }

    #[test]
    fn least_recent_session_is_evicted_when_none_idle() {
        let mut map = sessions(&["oldest"]);
        thread::sleep(Duration::from_millis(5));

        let ids = (0..4).map(|i| i.to_string()).collect::<Vec<_>>();
        for id in &ids {
            map.insert(id.clone(), Session::new());
        }

        make_room(&mut map, 5, Duration::from_secs(SESSION_IDLE_LIMIT));
        assert_eq!(map.len(), 4);
        assert!(!map.contains_key("oldest"));
    }

    #[test]
    fn alerts_expire() {
        let mut session = Session::new();
        assert_eq!(session.fresh_alerts(Duration::from_secs(60)), None);

        session.set_alerts(vec![Alert::new("Flood warning", Severity::High, "weather")], Severity::High);
        assert_eq!(session.fresh_alerts(Duration::from_secs(60)).map(|(a, level)| (a.len(), level)),
            Some((1, Severity::High)));

        thread::sleep(Duration::from_millis(20));
        assert_eq!(session.fresh_alerts(Duration::from_millis(10)), None);
    }

    #[test]
    fn empty_alert_set_still_counts_as_fetched() {
        let mut session = Session::new();
        session.set_alerts(Vec::new(), Severity::Low);
        assert_eq!(session.fresh_alerts(Duration::from_secs(60)), Some((Vec::new(), Severity::Low)));
    }
}
