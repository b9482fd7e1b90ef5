//! HTTP session client for the console that serves the socket endpoint.
//!
//! The console authenticates with a cookie-backed session. A
//! [`SessionClient`] logs in, keeps the session cookies, and derives the
//! WebSocket address a [`Connection`](crate::Connection) should open once a
//! user is signed in.

use std::time::Duration;

use log::debug;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use ureq::{Agent, AgentBuilder};
use url::Url;

use crate::connection::Endpoint;

/// Path of the socket endpoint on the console host.
pub const SOCKET_PATH: &str = "/c/ws";

const LOGIN_PATH: &str = "/auth/login";
const SESSION_PATH: &str = "/auth/session";
const LOGOUT_PATH: &str = "/auth/logout";
const MQTT_USER_PATH: &str = "/c/get-mqtt-user";

/// Errors raised by [`SessionClient`].
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid base URL {0:?}: {1}")]
    InvalidBase(String, url::ParseError),
    #[error("base URL {0:?} must use http or https")]
    UnsupportedScheme(String),
    #[error("{path} returned HTTP {status}")]
    Status { path: &'static str, status: u16 },
    #[error("request to {path} failed: {message}")]
    Transport { path: &'static str, message: String },
    #[error("invalid JSON for {path}: {source}")]
    Json {
        path: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("server rejected the request: {0}")]
    Rejected(String),
    #[error("socket address is invalid: {0}")]
    Address(#[from] url::ParseError),
}

/// Session state reported by the console.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct SessionInfo {
    /// Signed-in user, empty when nobody is logged in.
    #[serde(default)]
    pub user_id: String,
    /// Set on first start, before the console has been configured.
    #[serde(default)]
    pub guide: bool,
}

impl SessionInfo {
    pub fn is_authenticated(&self) -> bool {
        !self.user_id.is_empty()
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct ResultResponse {
    result: String,
    #[serde(default)]
    message: Option<String>,
}

impl ResultResponse {
    fn into_result(self) -> Result<(), SessionError> {
        if self.result == "ok" {
            Ok(())
        } else {
            Err(SessionError::Rejected(
                self.message.unwrap_or_else(|| self.result.clone()),
            ))
        }
    }
}

#[derive(Deserialize)]
struct MqttUserResponse {
    user: String,
}

/// Cookie-replaying client for the console's auth endpoints.
#[derive(Debug)]
pub struct SessionClient {
    agent: Agent,
    base: Url,
    cookies: Mutex<Vec<(String, String)>>,
}

impl SessionClient {
    /// Create a client for the console served at `base` (`http://` or `https://`).
    pub fn new(base: &str, timeout: Duration) -> Result<Self, SessionError> {
        let base =
            Url::parse(base).map_err(|err| SessionError::InvalidBase(base.to_owned(), err))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(SessionError::UnsupportedScheme(base.to_string()));
        }
        let agent = AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout(timeout)
            .build();
        Ok(Self {
            agent,
            base,
            cookies: Mutex::new(Vec::new()),
        })
    }

    /// Sign in and retain the session cookie.
    pub fn login(&self, username: &str, password: &str) -> Result<(), SessionError> {
        debug!("logging in {username} at {}", self.base);
        let body = serde_json::to_string(&LoginRequest { username, password }).map_err(
            |source| SessionError::Json {
                path: LOGIN_PATH,
                source,
            },
        )?;
        let request = self
            .request("POST", LOGIN_PATH)
            .set("Accept", "application/json")
            .set("Content-Type", "application/json");
        let response = self.finish(LOGIN_PATH, request.send_string(&body))?;
        decode::<ResultResponse>(LOGIN_PATH, response)?.into_result()
    }

    /// Query the current session.
    pub fn session(&self) -> Result<SessionInfo, SessionError> {
        self.get_json(SESSION_PATH)
    }

    /// End the session and forget the cookies.
    pub fn logout(&self) -> Result<(), SessionError> {
        let result = self.get_json::<ResultResponse>(LOGOUT_PATH)?.into_result();
        self.cookies.lock().clear();
        result
    }

    /// Fetch the broker user name assigned to this session.
    pub fn mqtt_user(&self) -> Result<String, SessionError> {
        Ok(self.get_json::<MqttUserResponse>(MQTT_USER_PATH)?.user)
    }

    /// Socket endpoint on the same host, `wss` when the console uses HTTPS.
    pub fn endpoint(&self) -> Endpoint {
        let host = match (self.base.host_str(), self.base.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_owned(),
            (None, _) => String::new(),
        };
        Endpoint::new(host, SOCKET_PATH, self.base.scheme() == "https")
    }

    /// Render [`endpoint`](Self::endpoint) as a connection address.
    pub fn socket_address(&self) -> Result<Url, SessionError> {
        Ok(self.endpoint().to_url()?)
    }

    fn get_json<T: DeserializeOwned>(&self, path: &'static str) -> Result<T, SessionError> {
        let request = self.request("GET", path);
        let response = self.finish(path, request.call())?;
        decode(path, response)
    }

    fn request(&self, method: &str, path: &str) -> ureq::Request {
        let mut url = self.base.clone();
        url.set_path(path);
        let request = self.agent.request_url(method, &url);
        let cookies = self.cookies.lock();
        if cookies.is_empty() {
            return request;
        }
        let header = cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");
        request.set("Cookie", &header)
    }

    fn finish(
        &self,
        path: &'static str,
        result: Result<ureq::Response, ureq::Error>,
    ) -> Result<ureq::Response, SessionError> {
        let response = match result {
            Ok(response) => response,
            Err(ureq::Error::Status(status, _)) => {
                return Err(SessionError::Status { path, status });
            }
            Err(ureq::Error::Transport(err)) => {
                return Err(SessionError::Transport {
                    path,
                    message: err.to_string(),
                });
            }
        };
        self.store_cookies(&response);
        Ok(response)
    }

    fn store_cookies(&self, response: &ureq::Response) {
        let mut cookies = self.cookies.lock();
        for raw in response.all("set-cookie") {
            let Some((name, value)) = parse_set_cookie(raw) else {
                continue;
            };
            match cookies.iter_mut().find(|(existing, _)| *existing == name) {
                Some(slot) => slot.1 = value,
                None => cookies.push((name, value)),
            }
        }
    }
}

fn parse_set_cookie(raw: &str) -> Option<(String, String)> {
    let pair = raw.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_owned(), value.trim().to_owned()))
}

fn decode<T: DeserializeOwned>(
    path: &'static str,
    response: ureq::Response,
) -> Result<T, SessionError> {
    let body = response
        .into_string()
        .map_err(|err| SessionError::Transport {
            path,
            message: err.to_string(),
        })?;
    serde_json::from_str(&body).map_err(|source| SessionError::Json { path, source })
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
