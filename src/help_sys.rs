use std::{
    collections::VecDeque,
    sync::RwLock,
    time::Duration,
};
use rocket::{
    http::Cookies,
    request::Form,
    response::{
        status::{BadRequest, NotFound},
        content::Json,
    },
};
use serde_json::{json, Value as JsonValue};

use crate::config::EMERGENCY_TYPES;
use crate::location_sys::LocationFix;
use crate::session_sys;
use crate::task_scheduler::{Task, TaskSchedulerBuilder};
use crate::util;


type StringResult = Result<String, BadRequest<String>>;


lazy_static! {
    static ref REQUEST_LIST: RwLock<VecDeque<HelpRequest>> = {
        RwLock::new(VecDeque::new())
    };
    static ref REQUEST_MAP_CACHE: RwLock<String> = {
        RwLock::new(String::new())
    };
}

const MAX_REQUESTS: usize = 512;
const MAP_REFRESH_PERIOD: u64 = 30;
const MAX_DESCRIPTION_LEN: usize = 65536;
const MAX_CONTACT_LEN: usize = 32;


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Active,
    Resolved,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Active => "active",
            Status::Resolved => "resolved",
        }
    }
}


#[derive(Debug, Clone)]
pub struct HelpRequest {
    pub id: String,
    pub location: LocationFix,
    pub timestamp: String,
    pub kind: String,
    pub description: String,
    pub contact: String,
    pub status: Status,
}

impl HelpRequest {
    fn summary_json(&self) -> JsonValue {
        json!({
            "id": self.id,
            "lat": self.location.lat,
            "lng": self.location.lng,
            "timestamp": self.timestamp,
            "type": self.kind,
            "status": self.status.as_str(),
        })
    }

    fn to_json(&self) -> JsonValue {
        json!({
            "id": self.id,
            "location": self.location.to_json(),
            "timestamp": self.timestamp,
            "formatted_time": util::format_timestamp(&self.timestamp),
            "type": self.kind,
            "description": self.description,
            "contact": mask_contact(&self.contact),
            "status": self.status.as_str(),
        })
    }
}


/// Hides all but the last two digits; the full number resolves the request.
fn mask_contact(contact: &str) -> String {
    let digits = contact.chars().filter(|c| c.is_ascii_digit()).count();

    let mut seen = 0;
    contact.chars()
        .map(|c| {
            if c.is_ascii_digit() {
                seen += 1;
                if seen + 2 <= digits { '*' } else { c }
            }
            else {
                c
            }
        })
        .collect()
}


#[derive(FromForm)]
pub struct HelpRequestForm {
    emergency_type: String,
    description: String,
    contact: String,
}

impl HelpRequestForm {
    fn verify_error(&self) -> Option<&'static str> {
        let contact = self.contact.trim();

        if contact.is_empty() {
            Some("Please provide a contact number")
        }
        else if contact.len() > MAX_CONTACT_LEN {
            Some("Contact number can not be longer than 32 characters")
        }
        else if !EMERGENCY_TYPES.iter().any(|&t| t == self.emergency_type) {
            Some("Invalid emergency type")
        }
        else if self.description.len() >= MAX_DESCRIPTION_LEN {
            Some("The maximum length of the description is 65536")
        }
        else {
            None
        }
    }
}


pub fn init_help_sys(scheduler: &mut TaskSchedulerBuilder) {
    update_request_map(build_request_map());

    scheduler.add_task(Task::new("help-request-map", help_map_job,
        Duration::from_secs(MAP_REFRESH_PERIOD)));
}

fn help_map_job() -> Duration {
    info!("Start job");

    update_request_map(build_request_map());
    Duration::from_secs(MAP_REFRESH_PERIOD)
}

fn build_request_map() -> String {
    let parts = REQUEST_LIST.read()
        .map(|list| {
            list.iter()
                .filter(|r| r.status == Status::Active)
                .map(HelpRequest::summary_json)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    json!({
        "requests": parts,
        "size": parts.len(),
    }).to_string()
}

fn update_request_map(data: String) {
    if let Ok(mut cache) = REQUEST_MAP_CACHE.write() {
        *cache = data;
    }
}

/// Stores `request`, dropping the oldest when over capacity.
pub fn save_help_request(request: HelpRequest) {
    warn!("Help request {} ({}) at ({:.5}, {:.5})",
        request.id, request.kind, request.location.lat, request.location.lng);

    if let Ok(mut list) = REQUEST_LIST.write() {
        push_capped(&mut list, request, MAX_REQUESTS);
    }
}

fn push_capped(list: &mut VecDeque<HelpRequest>, request: HelpRequest, cap: usize) {
    list.push_back(request);
    while list.len() > cap {
        list.pop_front();
    }
}

pub fn find_help_request(id: &str) -> Option<HelpRequest> {
    REQUEST_LIST.read().ok()?
        .iter()
        .find(|r| r.id == id)
        .cloned()
}

/// Marks the listed requests resolved. Returns how many changed.
pub fn resolve_requests<'a, I>(ids: I) -> usize where
    I: IntoIterator<Item = &'a String> {

    let mut list = match REQUEST_LIST.write() {
        Ok(list) => list,
        Err(_) => return 0,
    };

    let mut count = 0;
    for id in ids {
        if let Some(request) = list.iter_mut().find(|r| &r.id == id) {
            if request.status == Status::Active {
                request.status = Status::Resolved;
                count += 1;
            }
        }
    }

    count
}


#[post("/help-request", format="application/x-www-form-urlencoded", data="<form>")]
pub fn post_help_request(form: Option<Form<HelpRequestForm>>, mut cookies: Cookies) -> StringResult {
    let form = form.ok_or(BadRequest(Some("Invalid form".into())))?;

    if let Some(err) = form.verify_error() {
        return Err(BadRequest(Some(err.to_string())));
    }

    let location = session_sys::current_location(&mut cookies);

    let request = HelpRequest {
        id: util::generate_rand_id(24),
        location,
        timestamp: util::iso_now(),
        kind: form.emergency_type.clone(),
        description: form.description.clone(),
        contact: form.contact.trim().to_owned(),
        status: Status::Active,
    };
    let id = request.id.clone();

    save_help_request(request);
    session_sys::with_session(&mut cookies, |s| s.help_request_ids.push(id.clone()));

    Ok(id)
}

#[get("/help-request?<id>")]
pub fn get_help_request(id: String) -> Result<Json<String>, NotFound<String>> {
    find_help_request(&id)
        .map(|r| Json(r.to_json().to_string()))
        .ok_or(NotFound("Not found".into()))
}

#[get("/help-request-map")]
pub fn get_help_request_map() -> Json<String> {
    Json(REQUEST_MAP_CACHE.read()
        .map(|data| data.clone())
        .unwrap_or_default())
}

#[post("/help-request/resolve?<id>&<contact>")]
pub fn post_resolve_help_request(id: String, contact: String) -> StringResult {
    match find_help_request(&id) {
        Some(request) => {
            if request.contact == contact.trim() {
                let cnt = resolve_requests(&[id]);
                Ok(cnt.to_string())
            }
            else {
                Err(BadRequest(Some("Authentication result is incorrect".into())))
            }
        },
        None => Err(BadRequest(Some("Not found".into()))),
    }
}

#[post("/mark-safe")]
pub fn post_mark_safe(mut cookies: Cookies) -> Json<String> {
    let ids = session_sys::with_session(&mut cookies, |s| s.help_request_ids.clone());
    let resolved = resolve_requests(&ids);

    info!("User marked as safe, {} help requests resolved", resolved);

    Json(json!({
        "message": "You have been marked as safe. Your contacts will be notified.",
        "resolved": resolved,
    }).to_string())
}
