//! Outbound HTTP to the SHM backend.
//!
//! Attaches the session credential, slides its expiry on success and drops
//! it on a 401 from anything that is not itself an authentication call.

use reqwest::{Client, Method, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::envelope::Envelope;
use crate::session::SessionStore;
use crate::{Result, ShmError};

pub const API_PREFIX: &str = "/shm/v1";
pub const SESSION_HEADER: &str = "session-id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Regular,
    /// Login, registration and Telegram auth. A 401 here is a failed
    /// attempt, not an expired session.
    Auth,
}

/// Where the shell should go after a gateway-level decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Entry,
}

#[derive(Clone)]
pub struct Gateway {
    client: Client,
    base_url: String,
    session: SessionStore,
    navigation: broadcast::Sender<Navigation>,
}

impl Gateway {
    pub fn new(api_url: &str, session: SessionStore) -> Self {
        Self::with_client(Client::new(), api_url, session)
    }

    pub fn with_client(client: Client, api_url: &str, session: SessionStore) -> Self {
        let (navigation, _) = broadcast::channel(16);
        Self {
            client,
            base_url: format!("{}{}", api_url.trim_end_matches('/'), API_PREFIX),
            session,
            navigation,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Navigation> {
        self.navigation.subscribe()
    }

    async fn send<B>(&self, method: Method, path: &str, body: Option<&B>, kind: CallKind) -> Result<Response>
    where
        B: Serialize + ?Sized,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);

        let mut request = self.client.request(method, &url);
        if let Some(token) = self.session.get() {
            request = request.header(SESSION_HEADER, token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            self.session.touch();
            return Ok(response);
        }

        if status == StatusCode::UNAUTHORIZED {
            if kind == CallKind::Regular {
                warn!("Session rejected on {}, clearing credential", path);
                self.session.clear();
                let _ = self.navigation.send(Navigation::Entry);
            }
            return Err(ShmError::Unauthorized);
        }

        let body = response.text().await.unwrap_or_default();
        Err(ShmError::Status { status, body })
    }

    /// Raw JSON body, no envelope.
    pub async fn json<T, B>(&self, method: Method, path: &str, body: Option<&B>, kind: CallKind) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let response = self.send(method, path, body, kind).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn one<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.json::<Envelope<T>, ()>(Method::GET, path, None, CallKind::Regular)
            .await?
            .into_one()
    }

    pub async fn many<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        Ok(self
            .json::<Envelope<T>, ()>(Method::GET, path, None, CallKind::Regular)
            .await?
            .into_many())
    }

    pub async fn text(&self, path: &str) -> Result<String> {
        let response = self.send::<()>(Method::GET, path, None, CallKind::Regular).await?;
        Ok(response.text().await?)
    }

    /// Fire-and-check: the body of a 2xx response is ignored.
    pub async fn call<B>(&self, method: Method, path: &str, body: Option<&B>, kind: CallKind) -> Result<()>
    where
        B: Serialize + ?Sized,
    {
        self.send(method, path, body, kind).await?;
        Ok(())
    }
}
