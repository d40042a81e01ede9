#![feature(proc_macro_hygiene, decl_macro)]


#[macro_use] extern crate lazy_static;
extern crate rand;
#[macro_use] extern crate rocket;
#[macro_use] extern crate log;


mod util;
mod logger;
mod config;
mod geo;
mod cache;
mod api_client;
mod task_scheduler;
mod session_sys;
mod location_sys;
mod weather_sys;
mod seismic_sys;
mod traffic_sys;
mod alert_sys;
mod risk_sys;
mod support_sys;
mod route_sys;
mod heatmap_sys;
mod sentiment;
mod community_sys;
mod help_sys;
mod dashboard_route;


use std::path::{Path, PathBuf};
use rocket::response::NamedFile;
use task_scheduler::TaskSchedulerBuilder;


const STATIC_DIR: &'static str = "static/";


#[get("/")]
fn index() -> &'static str {
    "Safety Map Server"
}

#[get("/<file..>")]
fn get_static_file(file: PathBuf) -> Option<NamedFile> {
    NamedFile::open(Path::new(STATIC_DIR).join(file)).ok()
}


fn rocket() -> rocket::Rocket {
    rocket::ignite()
        .mount("/", routes![index])
        .mount(&format!("/{}", STATIC_DIR), routes![get_static_file])
        .mount("/", routes![
            dashboard_route::get_dashboard,
        ])
        .mount("/", routes![
            location_sys::get_location,
            location_sys::post_location,
            location_sys::post_refresh_location,
            location_sys::get_location_history,
            location_sys::post_update_interval,
        ])
        .mount("/", routes![
            weather_sys::get_weather_route,
            alert_sys::get_alerts,
            risk_sys::get_risk_analysis,
            risk_sys::get_risk_insights,
            seismic_sys::get_seismic_map,
        ])
        .mount("/", routes![
            support_sys::get_support_locations,
            support_sys::get_emergency_contacts,
            route_sys::post_destination,
            route_sys::get_route_info,
            route_sys::get_route_map,
        ])
        .mount("/", routes![
            heatmap_sys::get_heatmap,
            heatmap_sys::get_heatmap_image,
        ])
        .mount("/", routes![
            help_sys::post_help_request,
            help_sys::get_help_request,
            help_sys::get_help_request_map,
            help_sys::post_resolve_help_request,
            help_sys::post_mark_safe,
        ])
        .mount("/", routes![
            community_sys::post_community_update,
            community_sys::get_community_updates,
        ])
}


fn main() {
    let rocket_env = config::rocket_env();

    let log_level = if config::is_debug_env(&rocket_env) {
        log::Level::Debug
    }
    else {
        log::Level::Info
    };
    if let Err(err) = logger::init_logger(log_level) {
        eprintln!("Fail to init logger: {}", err);
    }

    let _sentry = sentry::init(sentry::ClientOptions {
        dsn: config::sentry_dsn().and_then(|dsn| dsn.parse().ok()),
        release: sentry::release_name!(),
        environment: Some(rocket_env.clone().into()),
        ..Default::default()
    });

    info!("Start in {} environment", rocket_env);

    let mut scheduler = TaskSchedulerBuilder::new()
        .n_workers(2);
    seismic_sys::init_seismic_sys(&mut scheduler);
    help_sys::init_help_sys(&mut scheduler);
    let scheduler = scheduler.build();

    let err = rocket().launch();
    error!("Launch failed: {}", err);

    scheduler.join();
}


#[cfg(test)]
mod tests {
    use super::*;
    use rocket::http::{ContentType, Status};
    use rocket::local::Client;
    use serde_json::Value as JsonValue;

    fn client() -> Client {
        Client::new(rocket()).unwrap()
    }

    fn body_json(body: Option<String>) -> JsonValue {
        serde_json::from_str(&body.unwrap()).unwrap()
    }

    #[test]
    fn index_banner() {
        let client = client();
        let mut res = client.get("/").dispatch();

        assert_eq!(res.status(), Status::Ok);
        assert_eq!(res.body_string(), Some("Safety Map Server".into()));
    }

    #[test]
    fn emergency_contacts() {
        let client = client();
        let mut res = client.get("/emergency-contacts").dispatch();

        assert_eq!(res.status(), Status::Ok);
        let data = body_json(res.body_string());
        assert_eq!(data["contacts"][0]["service"], "Police");
        assert_eq!(data["size"], 6);
    }

    #[test]
    fn help_request_needs_contact() {
        let client = client();
        let res = client.post("/help-request")
            .header(ContentType::Form)
            .body("emergency_type=Fire&description=smoke&contact=")
            .dispatch();

        assert_eq!(res.status(), Status::BadRequest);
    }

    #[test]
    fn manual_location_then_help_request() {
        let client = client();

        let mut res = client.post("/location")
            .header(ContentType::Form)
            .body("lat=17.5&lng=78.3")
            .dispatch();
        assert_eq!(res.status(), Status::Ok);
        let fix = body_json(res.body_string());
        assert_eq!(fix["source"], "manual");

        let mut res = client.post("/help-request")
            .header(ContentType::Form)
            .body("emergency_type=Medical&description=Fell%20down&contact=555-0199")
            .dispatch();
        assert_eq!(res.status(), Status::Ok);
        let id = res.body_string().unwrap();

        let mut res = client.get(format!("/help-request?id={}", id)).dispatch();
        assert_eq!(res.status(), Status::Ok);
        let request = body_json(res.body_string());
        assert_eq!(request["type"], "Medical");
        assert_eq!(request["status"], "active");
        assert_eq!(request["location"]["lat"], 17.5);
        assert_eq!(request["contact"], "***-**99");

        let mut res = client.post("/mark-safe").dispatch();
        let data = body_json(res.body_string());
        assert_eq!(data["resolved"], 1);
    }

    #[test]
    fn rejects_out_of_range_location() {
        let client = client();
        let res = client.post("/location")
            .header(ContentType::Form)
            .body("lat=91&lng=0")
            .dispatch();

        assert_eq!(res.status(), Status::BadRequest);
    }

    #[test]
    fn unknown_help_request() {
        let client = client();
        let res = client.get("/help-request?id=nothing").dispatch();
        assert_eq!(res.status(), Status::NotFound);
    }

    fn located_client(lat: f64, lng: f64) -> Client {
        let client = client();
        let res = client.post("/location")
            .header(ContentType::Form)
            .body(format!("lat={}&lng={}", lat, lng))
            .dispatch();
        assert_eq!(res.status(), Status::Ok);
        drop(res);
        client
    }

    fn submit_help_request(client: &Client, contact: &str) -> String {
        let mut res = client.post("/help-request")
            .header(ContentType::Form)
            .body(format!("emergency_type=Fire&description=Smoke&contact={}", contact))
            .dispatch();
        assert_eq!(res.status(), Status::Ok);
        res.body_string().unwrap()
    }

    #[test]
    fn resolve_needs_full_contact() {
        let client = located_client(17.5, 78.3);
        let id = submit_help_request(&client, "5550142");

        let res = client.post(format!("/help-request/resolve?id={}&contact=*****42", id)).dispatch();
        assert_eq!(res.status(), Status::BadRequest);

        let mut res = client.get(format!("/help-request?id={}", id)).dispatch();
        let body = res.body_string().unwrap();
        assert!(!body.contains("5550142"));
        assert_eq!(body_json(Some(body))["status"], "active");

        let mut res = client.post(format!("/help-request/resolve?id={}&contact=5550142", id)).dispatch();
        assert_eq!(res.status(), Status::Ok);
        assert_eq!(res.body_string(), Some("1".into()));
    }

    #[test]
    fn oversized_description_is_rejected() {
        let client = located_client(17.5, 78.3);
        let res = client.post("/help-request")
            .header(ContentType::Form)
            .body(format!("emergency_type=Fire&contact=112&description={}", "x".repeat(65536)))
            .dispatch();

        assert_eq!(res.status(), Status::BadRequest);
    }

    #[test]
    fn alerts_offline() {
        let client = located_client(40.7128, -74.0060);
        let mut res = client.get("/alerts").dispatch();

        assert_eq!(res.status(), Status::Ok);
        let data = body_json(res.body_string());
        let size = data["size"].as_u64().unwrap();
        assert!(size >= 1);
        assert!(["low", "medium", "high"].contains(&data["risk_level"].as_str().unwrap()));
    }

    #[test]
    fn dashboard_reuses_recent_alerts() {
        let client = located_client(40.7128, -74.0060);

        let mut res = client.get("/dashboard").dispatch();
        assert_eq!(res.status(), Status::Ok);
        let first = body_json(res.body_string());
        assert_eq!(first["location"]["source"], "manual");
        assert_eq!(first["map"]["zoom"], 13);
        assert_eq!(first["emergency_types"].as_array().unwrap().len(), 5);

        let mut res = client.get("/dashboard").dispatch();
        let second = body_json(res.body_string());
        assert_eq!(first["alerts"], second["alerts"]);
        assert_eq!(first["risk_level"], second["risk_level"]);
    }
}
