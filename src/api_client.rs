use reqwest::{Client, Response};
use serde_json::Value as JsonValue;

use crate::config::API_TIMEOUT;


lazy_static! {
    static ref CLIENT: Option<Client> = {
        Client::builder()
            .timeout(API_TIMEOUT)
            .build()
            .map_err(|err| error!("Fail to build HTTP client: {}", err))
            .ok()
    };
}


/// GETs `url` with the query pairs and parses the body as JSON.
/// Non-success statuses are errors.
pub fn get_json(url: &str, query: &[(&str, String)]) -> Result<JsonValue, String> {
    let res = shared_client()?
        .get(url)
        .query(query)
        .send()
        .map_err(|err| err.to_string())?;

    read_json(url, res)
}

/// POSTs `body` as JSON, otherwise like `get_json`.
pub fn post_json(url: &str, query: &[(&str, String)], body: &JsonValue) -> Result<JsonValue, String> {
    let res = shared_client()?
        .post(url)
        .query(query)
        .json(body)
        .send()
        .map_err(|err| err.to_string())?;

    read_json(url, res)
}

fn shared_client() -> Result<&'static Client, String> {
    CLIENT.as_ref()
        .ok_or("HTTP client is unavailable".to_owned())
}

fn read_json(url: &str, mut res: Response) -> Result<JsonValue, String> {
    if !res.status().is_success() {
        return Err(format!("{} responded with {}", url, res.status()));
    }

    res.json::<JsonValue>()
        .map_err(|err| err.to_string())
}

/// Logs a failed API call and turns it into `None`.
pub fn log_failure<T>(name: &str, result: Result<T, String>) -> Option<T> {
    match result {
        Ok(data) => Some(data),
        Err(err) => {
            error!("API Error in {}: {}", name, err);
            None
        },
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_becomes_none() {
        assert_eq!(log_failure::<i32>("get_weather", Err("timeout".into())), None);
        assert_eq!(log_failure("get_weather", Ok(3)), Some(3));
    }

    #[test]
    fn refused_post_is_an_error() {
        let result = post_json("http://127.0.0.1:9/geolocate", &[("key", "test".to_owned())],
            &serde_json::json!({ "considerIp": true }));
        assert!(result.is_err());
    }
}
