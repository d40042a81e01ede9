use std::{
    collections::VecDeque,
    sync::RwLock,
};
use rocket::{
    http::Cookies,
    request::Form,
    response::{
        status::BadRequest,
        content::Json,
    },
};
use serde_json::{json, Value as JsonValue};

use crate::geo::Coordinates;
use crate::sentiment::{analyze_community_update, UpdateAnalysis};
use crate::session_sys;
use crate::util;


type JsonResult = Result<Json<String>, BadRequest<String>>;


lazy_static! {
    static ref UPDATE_LIST: RwLock<VecDeque<CommunityUpdate>> = {
        RwLock::new(VecDeque::new())
    };
}

const MAX_UPDATES: usize = 256;
const MAX_TEXT_LEN: usize = 1000;


#[derive(Debug, Clone)]
pub struct CommunityUpdate {
    pub id: String,
    pub text: String,
    pub location: Coordinates,
    pub timestamp: String,
    pub analysis: UpdateAnalysis,
}

impl CommunityUpdate {
    fn to_json(&self) -> JsonValue {
        json!({
            "id": self.id,
            "text": self.text,
            "lat": self.location.lat,
            "lng": self.location.lng,
            "timestamp": self.timestamp,
            "sentiment": self.analysis.sentiment.to_json(),
        })
    }
}


#[derive(FromForm)]
pub struct UpdateForm {
    text: String,
}

impl UpdateForm {
    fn verify_error(&self) -> Option<&'static str> {
        let len = self.text.trim().chars().count();

        if len == 0 {
            Some("The update can not be empty")
        }
        else if len > MAX_TEXT_LEN {
            Some("The maximum length of an update is 1000")
        }
        else {
            None
        }
    }
}


/// Keeps `update` when it is credible. Returns whether it was kept.
fn store_update(update: CommunityUpdate) -> bool {
    if !update.analysis.credible {
        info!("Rejected community update (compound {})", update.analysis.sentiment.compound);
        return false;
    }

    match UPDATE_LIST.write() {
        Ok(mut list) => {
            list.push_front(update);
            list.truncate(MAX_UPDATES);
            true
        },
        Err(_) => false,
    }
}


#[post("/community-update", format="application/x-www-form-urlencoded", data="<form>")]
pub fn post_community_update(form: Option<Form<UpdateForm>>, mut cookies: Cookies) -> JsonResult {
    let form = form.ok_or(BadRequest(Some("Invalid form".into())))?;

    if let Some(err) = form.verify_error() {
        return Err(BadRequest(Some(err.to_string())));
    }

    let text = form.text.trim().to_owned();
    let analysis = analyze_community_update(&text);
    let location = session_sys::current_location(&mut cookies);

    let update = CommunityUpdate {
        id: util::generate_rand_id(16),
        text,
        location: location.coordinates(),
        timestamp: util::iso_now(),
        analysis,
    };
    let id = update.id.clone();
    let accepted = store_update(update);

    Ok(Json(json!({
        "id": id,
        "accepted": accepted,
        "credible": analysis.credible,
        "sentiment": analysis.sentiment.to_json(),
    }).to_string()))
}

#[get("/community-updates")]
pub fn get_community_updates() -> Json<String> {
    let parts = UPDATE_LIST.read()
        .map(|list| list.iter().map(CommunityUpdate::to_json).collect::<Vec<_>>())
        .unwrap_or_default();

    Json(json!({
        "updates": parts,
        "size": parts.len(),
    }).to_string())
}


#[cfg(test)]
mod tests {
    use super::*;

    fn update(text: &str) -> CommunityUpdate {
        CommunityUpdate {
            id: util::generate_rand_id(16),
            text: text.into(),
            location: Coordinates::new(0.0, 0.0),
            timestamp: util::iso_now(),
            analysis: analyze_community_update(text),
        }
    }

    #[test]
    fn keeps_only_credible_updates() {
        assert!(store_update(update("Shelter on 5th street is open and safe")));
        assert!(!store_update(update("Horrible deadly disaster, everyone will die!!!")));
    }

    #[test]
    fn form_validation() {
        assert!(UpdateForm { text: "   ".into() }.verify_error().is_some());
        assert!(UpdateForm { text: "x".repeat(MAX_TEXT_LEN + 1) }.verify_error().is_some());
        assert!(UpdateForm { text: "Power is back".into() }.verify_error().is_none());
    }
}
