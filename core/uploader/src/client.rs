//! The remote store boundary and its HTTP implementation.
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use carport_ipld::{CarStream, Cid};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Body, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use crate::error::ClientError;
use crate::progress::{self, TransferProgress};

/// A remote content addressed store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Uploads a CAR payload and returns the root identifier computed by the remote.
    async fn store(
        &self,
        car: CarStream,
        progress: &mut TransferProgress,
    ) -> Result<String, ClientError>;

    /// Looks up what the remote knows about `cid`, `None` when it has never seen it.
    async fn status(&self, cid: &Cid) -> Result<Option<RemoteStatus>, ClientError>;

    /// The endpoint shown to users, if any.
    fn endpoint(&self) -> Option<&Url> {
        None
    }

    /// A page where users can follow the state of `cid`.
    fn check_url(&self, _cid: &str) -> Option<String> {
        None
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PinStatus {
    Queued,
    Pinning,
    Pinned,
    Failed,
    Other(String),
}

impl From<String> for PinStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "queued" => PinStatus::Queued,
            "pinning" => PinStatus::Pinning,
            "pinned" => PinStatus::Pinned,
            "failed" => PinStatus::Failed,
            _ => PinStatus::Other(value),
        }
    }
}

impl fmt::Display for PinStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PinStatus::Queued => f.write_str("queued"),
            PinStatus::Pinning => f.write_str("pinning"),
            PinStatus::Pinned => f.write_str("pinned"),
            PinStatus::Failed => f.write_str("failed"),
            PinStatus::Other(s) => f.write_str(s),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Deal {
    pub status: String,
    #[serde(default)]
    pub deal_id: Option<u64>,
    #[serde(default)]
    pub miner: Option<String>,
}

/// What the remote store reports for a root.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(from = "RawStatus")]
pub struct RemoteStatus {
    pub cid: String,
    pub size: u64,
    pub created: Option<String>,
    pub pin_status: PinStatus,
    pub deals: Vec<Deal>,
}

#[derive(Deserialize)]
struct RawStatus {
    cid: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    created: Option<String>,
    pin: RawPin,
    #[serde(default)]
    deals: Vec<Deal>,
}

#[derive(Deserialize)]
struct RawPin {
    status: String,
}

impl From<RawStatus> for RemoteStatus {
    fn from(raw: RawStatus) -> Self {
        Self {
            cid: raw.cid,
            size: raw.size,
            created: raw.created,
            pin_status: raw.pin.status.into(),
            deals: raw.deals,
        }
    }
}

/// `{"ok": true, "value": …}` or `{"ok": false, "error": {…}}`
#[derive(Deserialize)]
struct Envelope<T> {
    ok: bool,
    value: Option<T>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ApiError {
    fn describe(self) -> String {
        match (self.name, self.message) {
            (Some(name), Some(message)) => format!("{name}: {message}"),
            (_, Some(message)) => message,
            (Some(name), None) => name,
            (None, None) => "unknown error".to_string(),
        }
    }
}

#[derive(Deserialize)]
struct Stored {
    cid: String,
}

/// [`RemoteStore`] backed by an nft.storage compatible HTTP API.
#[derive(Clone, Debug)]
pub struct HttpStore {
    client: reqwest::Client,
    endpoint: Url,
    token: String,
}

impl HttpStore {
    pub fn new(endpoint: Url, token: String, timeout: Duration) -> Result<Self, ClientError> {
        if endpoint.cannot_be_a_base() {
            return Err(ClientError::InvalidEndpoint(endpoint.to_string()));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            token,
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidEndpoint(self.endpoint.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
        let status = response.status();
        let body = response.bytes().await?;
        let envelope = serde_json::from_slice::<Envelope<T>>(&body);
        match envelope {
            Ok(Envelope {
                ok: true,
                value: Some(value),
                ..
            }) if status.is_success() => Ok(value),
            Ok(Envelope { error, .. }) => Err(ClientError::Api {
                status: status.as_u16(),
                message: error.map_or_else(|| "unexpected response".to_string(), ApiError::describe),
            }),
            Err(_) if !status.is_success() => Err(ClientError::Api {
                status: status.as_u16(),
                message: String::from_utf8_lossy(&body).into_owned(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl RemoteStore for HttpStore {
    async fn store(
        &self,
        car: CarStream,
        progress: &mut TransferProgress,
    ) -> Result<String, ClientError> {
        let (body, chunks) = progress::track(car);
        let request = self
            .client
            .post(self.url(&["upload"])?)
            .bearer_auth(&self.token)
            .header(CONTENT_TYPE, "application/car")
            .body(Body::wrap_stream(body))
            .send();
        let response = progress.drive(request, chunks).await?;
        let stored: Stored = Self::parse(response).await?;
        Ok(stored.cid)
    }

    async fn status(&self, cid: &Cid) -> Result<Option<RemoteStatus>, ClientError> {
        let cid = cid.to_string();
        let response = self.client.get(self.url(&[cid.as_str()])?).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::parse(response).await.map(Some)
    }

    fn endpoint(&self) -> Option<&Url> {
        Some(&self.endpoint)
    }

    fn check_url(&self, cid: &str) -> Option<String> {
        self.url(&["check", cid]).ok().map(String::from)
    }
}
