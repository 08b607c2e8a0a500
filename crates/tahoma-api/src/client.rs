// End-user API HTTP client
//
// Wraps `reqwest::Client` with endpoint URL construction and response
// handling. The endpoint groups (auth, events, setup, exec) are inherent
// methods implemented in separate files so this module stays focused on
// transport mechanics.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::models::ErrorPayload;
use crate::transport::TransportConfig;

/// Raw HTTP client for the TaHoma end-user API.
///
/// Session state lives entirely in the cookie jar of the underlying
/// `reqwest::Client`; cloning a `TahomaClient` shares that jar, so every
/// clone sees the same login.
#[derive(Debug, Clone)]
pub struct TahomaClient {
    http: reqwest::Client,
    base_url: Url,
}

impl TahomaClient {
    /// Create a new client from a `TransportConfig`.
    ///
    /// If the config doesn't already include a cookie jar, one is created
    /// automatically (the session is cookie-based). `base_url` is the API
    /// root, e.g. `https://tahomalink.com/enduser-mobile-web/enduserAPI`.
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let config = if transport.cookie_jar.is_some() {
            transport.clone()
        } else {
            transport.clone().with_cookie_jar()
        };
        let http = config.build_client()?;
        Ok(Self { http, base_url })
    }

    /// Create a client with a pre-built `reqwest::Client`.
    ///
    /// The caller is responsible for installing a cookie provider; without
    /// one, login succeeds but every later call comes back 401.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    /// The API base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    // ── URL builder ──────────────────────────────────────────────────

    /// Append path segments to the base URL.
    ///
    /// Each segment is percent-encoded on its own, so a device URL such as
    /// `io://1234-5678-9012/42` stays a single segment.
    pub(crate) fn endpoint_url(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Send a GET request and decode the JSON body.
    pub(crate) async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        debug!("GET {}", url);

        let resp = self.http.get(url).send().await.map_err(Error::Transport)?;

        Self::parse_json(resp).await
    }

    /// Send a bodiless POST request and decode the JSON response.
    pub(crate) async fn post<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        debug!("POST {}", url);

        let resp = self.http.post(url).send().await.map_err(Error::Transport)?;

        Self::parse_json(resp).await
    }

    /// Send a POST request with JSON body and decode the JSON response.
    pub(crate) async fn post_json<T: DeserializeOwned>(
        &self,
        url: Url,
        body: &impl Serialize,
    ) -> Result<T, Error> {
        debug!("POST {}", url);

        let resp = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(Error::Transport)?;

        Self::parse_json(resp).await
    }

    /// Send a bodiless POST and discard whatever the server answers.
    pub(crate) async fn post_empty(&self, url: Url) -> Result<(), Error> {
        debug!("POST {}", url);

        let resp = self.http.post(url).send().await.map_err(Error::Transport)?;

        Self::check_status(resp).await.map(drop)
    }

    /// Send a bodiless PUT and discard the response body.
    pub(crate) async fn put_empty(&self, url: Url) -> Result<(), Error> {
        debug!("PUT {}", url);

        let resp = self.http.put(url).send().await.map_err(Error::Transport)?;

        Self::check_status(resp).await.map(drop)
    }

    /// Send a DELETE and discard the response body.
    pub(crate) async fn delete(&self, url: Url) -> Result<(), Error> {
        debug!("DELETE {}", url);

        let resp = self.http.delete(url).send().await.map_err(Error::Transport)?;

        Self::check_status(resp).await.map(drop)
    }

    // ── Response handling ────────────────────────────────────────────

    /// Map 401 to `SessionExpired` and any other non-2xx to `Api`,
    /// returning the body text of a successful response.
    async fn check_status(resp: reqwest::Response) -> Result<String, Error> {
        let status = resp.status();

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::SessionExpired);
        }

        let body = resp.text().await.map_err(Error::Transport)?;

        if status.is_success() {
            Ok(body)
        } else {
            Err(api_error(status.as_u16(), &body))
        }
    }

    async fn parse_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
        let body = Self::check_status(resp).await?;
        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }
}

/// Build an `Error::Api` from a non-2xx body, tolerating bodies that are
/// empty or not the usual `{ error, errorCode }` payload.
pub(crate) fn api_error(status: u16, body: &str) -> Error {
    let payload: ErrorPayload = serde_json::from_str(body).unwrap_or_default();
    Error::Api {
        status,
        message: payload.error,
        code: payload.error_code,
    }
}
