//! Blocking HTTP client for the Nest developer API.
//!
//! - One `GET <server>/?auth=<token>` per poll, using `ureq` (no async).
//! - Redirects and error statuses are not handled by `ureq`; every response is
//!   classified here so `307` and `429` can be told apart from other failures.
//! - No retries. The widget that asked for data owns rescheduling.

use http::StatusCode;
use log::{debug, info, warn};
use std::time::Duration;

use crate::models::nest::NestSnapshot;

pub const DEFAULT_API_SERVER: &str = "https://developer-api.nest.com";

/// Consecutive `307` responses followed before a poll gives up.
pub const MAX_REDIRECTS: usize = 5;

#[derive(Debug)]
pub enum NestClientError {
    Transport(String),
    Http { status: u16 },
    Json(serde_path_to_error::Error<serde_json::Error>),
    NoData,
    MissingLocation,
    InvalidLocation(String),
    TooManyRedirects(usize),
}

impl core::fmt::Display for NestClientError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            NestClientError::Transport(s) => write!(f, "transport error: {}", s),
            NestClientError::Http { status } => write!(f, "http {}", status),
            NestClientError::Json(e) => write!(f, "json error: {}", e),
            NestClientError::NoData => write!(
                f,
                "token works, but no data was received. Make sure you are using the master account for your Nest"
            ),
            NestClientError::MissingLocation => write!(f, "redirect response without a Location header"),
            NestClientError::InvalidLocation(l) => write!(f, "redirect to an unusable location: {}", l),
            NestClientError::TooManyRedirects(n) => write!(f, "gave up after {} redirects", n),
        }
    }
}

impl std::error::Error for NestClientError {}

impl From<serde_path_to_error::Error<serde_json::Error>> for NestClientError {
    fn from(value: serde_path_to_error::Error<serde_json::Error>) -> Self {
        NestClientError::Json(value)
    }
}

/// Classification of a single HTTP exchange.
#[derive(Debug)]
pub enum Fetched {
    Success(NestSnapshot),
    RateLimited,
    /// Server (scheme and authority) to repeat the request against.
    Redirect(String),
    Error(NestClientError),
}

/// What a poll reports back to the widget that requested it. Redirects never
/// surface here; they are chased by [`follow_redirects`].
#[derive(Debug)]
pub enum PollOutcome {
    Data(NestSnapshot),
    RateLimited,
    Error(NestClientError),
}

/// The background side of the widget: something that can turn a token into a poll outcome.
pub trait NestApi {
    fn poll(&mut self, token: &str) -> PollOutcome;
}

pub struct NestClient {
    agent: ureq::Agent,
    api_server: String,
}

impl NestClient {
    pub fn new(api_server: impl Into<String>, timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .max_redirects(0)
            .max_redirects_will_error(false)
            .timeout_global(Some(timeout))
            .build()
            .into();

        NestClient {
            agent,
            api_server: api_server.into(),
        }
    }

    pub fn api_server(&self) -> &str {
        &self.api_server
    }

    /// Issue exactly one request against `server` and classify the response.
    pub fn fetch(&self, server: &str, token: &str) -> Fetched {
        fetch_from(&self.agent, server, token)
    }

    fn url(server: &str) -> String {
        if server.ends_with('/') {
            server.to_string()
        } else {
            format!("{}/", server)
        }
    }
}

fn fetch_from(agent: &ureq::Agent, server: &str, token: &str) -> Fetched {
    let url = NestClient::url(server);
    let response = agent
        .get(&url)
        .query("auth", token)
        .header("Accept", "application/json")
        .call();

    let mut response = match response {
        Ok(r) => r,
        Err(e) => return Fetched::Error(NestClientError::Transport(e.to_string())),
    };

    let status = response.status();
    let location = response
        .headers()
        .get(http::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    // Only a 200 carries a body we care about.
    let body = if status == StatusCode::OK {
        match response.body_mut().read_to_string() {
            Ok(b) => b,
            Err(e) => return Fetched::Error(NestClientError::Transport(e.to_string())),
        }
    } else {
        String::new()
    };

    classify_response(status, location.as_deref(), &body)
}

impl NestApi for NestClient {
    fn poll(&mut self, token: &str) -> PollOutcome {
        let NestClient { agent, api_server } = self;
        follow_redirects(api_server, |server| fetch_from(agent, server, token))
    }
}

/// Run `fetch` against `server`, moving to each redirect target until a final answer
/// arrives. The last target is left in `server` for later polls.
pub fn follow_redirects(server: &mut String, mut fetch: impl FnMut(&str) -> Fetched) -> PollOutcome {
    let mut redirects = 0;
    loop {
        match fetch(server.as_str()) {
            Fetched::Success(snapshot) => {
                debug!(
                    "Poll succeeded (thermostats={}, alarms={})",
                    snapshot.thermostat_count(),
                    snapshot.alarm_count()
                );
                return PollOutcome::Data(snapshot);
            }
            Fetched::RateLimited => {
                warn!("Nest API rate limit exceeded");
                return PollOutcome::RateLimited;
            }
            Fetched::Error(e) => {
                warn!("Nest API poll failed: {}", e);
                return PollOutcome::Error(e);
            }
            Fetched::Redirect(target) => {
                redirects += 1;
                if redirects > MAX_REDIRECTS {
                    warn!("Nest API kept redirecting; last target {}", target);
                    return PollOutcome::Error(NestClientError::TooManyRedirects(MAX_REDIRECTS));
                }
                info!("Nest API redirected to {}", target);
                *server = target;
            }
        }
    }
}

/// Reduce a `Location` value to the server it points at. The target carries the
/// same `/?auth=` request, which is rebuilt against the new server.
fn redirect_server(location: &str) -> Option<String> {
    let uri = location.trim().parse::<http::Uri>().ok()?;
    let scheme = uri.scheme_str()?;
    let authority = uri.authority()?;
    Some(format!("{}://{}", scheme, authority))
}

/// Map a raw HTTP exchange onto [`Fetched`].
///
/// A `200` whose body is blank or holds neither devices nor structures is
/// reported as [`NestClientError::NoData`]: the token is valid but the account
/// exposes nothing.
pub fn classify_response(status: StatusCode, location: Option<&str>, body: &str) -> Fetched {
    match status {
        StatusCode::TOO_MANY_REQUESTS => Fetched::RateLimited,
        StatusCode::TEMPORARY_REDIRECT => match location.map(str::trim) {
            Some(l) if !l.is_empty() => match redirect_server(l) {
                Some(server) => Fetched::Redirect(server),
                None => Fetched::Error(NestClientError::InvalidLocation(l.to_string())),
            },
            _ => Fetched::Error(NestClientError::MissingLocation),
        },
        StatusCode::OK => {
            if body.trim().is_empty() {
                return Fetched::Error(NestClientError::NoData);
            }
            let de = &mut serde_json::Deserializer::from_str(body);
            match serde_path_to_error::deserialize::<_, NestSnapshot>(de) {
                Ok(snapshot) if snapshot.is_empty() => Fetched::Error(NestClientError::NoData),
                Ok(snapshot) => Fetched::Success(snapshot),
                Err(e) => Fetched::Error(e.into()),
            }
        }
        other => Fetched::Error(NestClientError::Http {
            status: other.as_u16(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> String {
        std::fs::read_to_string("tests/data/snapshot.json").expect("fixture present")
    }

    #[test]
    fn ok_with_devices_is_success() {
        match classify_response(StatusCode::OK, None, &fixture()) {
            Fetched::Success(s) => {
                assert_eq!(s.thermostat_count(), 2);
                assert_eq!(s.alarm_count(), 2);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn rate_limit_and_redirect() {
        assert!(matches!(
            classify_response(StatusCode::TOO_MANY_REQUESTS, None, ""),
            Fetched::RateLimited
        ));
        match classify_response(
            StatusCode::TEMPORARY_REDIRECT,
            Some("https://firebase-apiserver.example.com"),
            "",
        ) {
            Fetched::Redirect(l) => assert_eq!(l, "https://firebase-apiserver.example.com"),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(matches!(
            classify_response(StatusCode::TEMPORARY_REDIRECT, None, ""),
            Fetched::Error(NestClientError::MissingLocation)
        ));
    }

    #[test]
    fn other_statuses_are_http_errors() {
        match classify_response(StatusCode::UNAUTHORIZED, None, "") {
            Fetched::Error(NestClientError::Http { status }) => assert_eq!(status, 401),
            other => panic!("unexpected outcome: {:?}", other),
        }
        // a 301 is not the redirect the API documents
        assert!(matches!(
            classify_response(StatusCode::MOVED_PERMANENTLY, Some("https://x"), ""),
            Fetched::Error(NestClientError::Http { status: 301 })
        ));
    }

    #[test]
    fn empty_account_is_no_data() {
        for body in ["", "   ", "{}", r#"{"devices":{},"metadata":{"access_token":"x"}}"#] {
            assert!(
                matches!(
                    classify_response(StatusCode::OK, None, body),
                    Fetched::Error(NestClientError::NoData)
                ),
                "body {:?} should be reported as no data",
                body
            );
        }
    }

    #[test]
    fn malformed_body_names_the_path() {
        let body = r#"{"devices":{"thermostats":{"t":{"humidity":"wet"}}}}"#;
        match classify_response(StatusCode::OK, None, body) {
            Fetched::Error(NestClientError::Json(e)) => {
                assert_eq!(e.path().to_string(), "devices.thermostats.t.humidity");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn url_gets_trailing_slash() {
        assert_eq!(NestClient::url("https://developer-api.nest.com"), "https://developer-api.nest.com/");
        assert_eq!(NestClient::url("https://a.example/"), "https://a.example/");
    }

    #[test]
    fn redirect_keeps_only_the_server() {
        match classify_response(
            StatusCode::TEMPORARY_REDIRECT,
            Some("https://firebase-apiserver03-tah01-iad01.dapi.production.nest.com:9553/?auth=c.tok"),
            "",
        ) {
            Fetched::Redirect(server) => {
                assert_eq!(server, "https://firebase-apiserver03-tah01-iad01.dapi.production.nest.com:9553");
                assert_eq!(
                    NestClient::url(&server),
                    "https://firebase-apiserver03-tah01-iad01.dapi.production.nest.com:9553/"
                );
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(matches!(
            classify_response(StatusCode::TEMPORARY_REDIRECT, Some("/elsewhere"), ""),
            Fetched::Error(NestClientError::InvalidLocation(_))
        ));
    }

    fn snapshot() -> NestSnapshot {
        serde_json::from_str(&fixture()).expect("parse snapshot")
    }

    /// Replays `redirects` redirects to numbered servers, then a success.
    fn redirecting(redirects: usize, seen: &mut Vec<String>) -> impl FnMut(&str) -> Fetched + '_ {
        move |server: &str| {
            seen.push(server.to_string());
            if seen.len() <= redirects {
                Fetched::Redirect(format!("https://s{}.example", seen.len()))
            } else {
                Fetched::Success(snapshot())
            }
        }
    }

    #[test]
    fn redirect_is_followed_and_remembered() {
        let mut server = DEFAULT_API_SERVER.to_string();
        let mut seen = Vec::new();
        let outcome = follow_redirects(&mut server, redirecting(1, &mut seen));
        assert!(matches!(outcome, PollOutcome::Data(_)));
        assert_eq!(seen, vec![DEFAULT_API_SERVER, "https://s1.example"]);
        assert_eq!(server, "https://s1.example");
    }

    #[test]
    fn five_redirects_still_succeed() {
        let mut server = DEFAULT_API_SERVER.to_string();
        let mut seen = Vec::new();
        let outcome = follow_redirects(&mut server, redirecting(MAX_REDIRECTS, &mut seen));
        assert!(matches!(outcome, PollOutcome::Data(_)));
        assert_eq!(seen.len(), MAX_REDIRECTS + 1);
        assert_eq!(server, "https://s5.example");
    }

    #[test]
    fn sixth_redirect_gives_up() {
        let mut server = DEFAULT_API_SERVER.to_string();
        let mut seen = Vec::new();
        let outcome = follow_redirects(&mut server, redirecting(MAX_REDIRECTS + 1, &mut seen));
        assert!(matches!(
            outcome,
            PollOutcome::Error(NestClientError::TooManyRedirects(MAX_REDIRECTS))
        ));
        assert_eq!(seen.len(), MAX_REDIRECTS + 1);
        assert_eq!(server, "https://s5.example");
    }

    #[test]
    fn final_answers_stop_the_chase() {
        let mut server = DEFAULT_API_SERVER.to_string();
        let outcome = follow_redirects(&mut server, |_| Fetched::RateLimited);
        assert!(matches!(outcome, PollOutcome::RateLimited));
        assert_eq!(server, DEFAULT_API_SERVER);
    }
}
