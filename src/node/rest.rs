use reqwest::{header::AUTHORIZATION, Method};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;
use tracing::debug;

use crate::audio::{filters::Filters, track::RestTrack};
use crate::error::{LinkError, LinkResult};
use crate::node::protocol::NodeStats;
use crate::CLIENT_NAME;

/// Cliente HTTP sin estado para las llamadas puntuales a un nodo
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    password: String,
    calls: Arc<AtomicU64>,
}

impl RestClient {
    pub fn new(
        base_url: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
        calls: Arc<AtomicU64>,
    ) -> LinkResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(CLIENT_NAME)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            password: password.into(),
            calls,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn set_base_url(&mut self, base_url: impl Into<String>) {
        self.base_url = base_url.into();
    }

    async fn request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Value>,
    ) -> LinkResult<reqwest::Response> {
        let url = format!("{}{}", self.base_url, endpoint);
        debug!("🌐 {} {}", method, url);

        let mut request = self
            .http
            .request(method, url.as_str())
            .header(AUTHORIZATION, self.password.as_str());
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await;
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(response?)
    }

    /// Hace la petición y revisa el campo `error` de la respuesta
    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Value>,
    ) -> LinkResult<T> {
        let text = self.request(method, endpoint, body).await?.text().await?;
        let value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text)?
        };

        if let Some(error) = value.get("error") {
            let message = value
                .get("message")
                .and_then(Value::as_str)
                .or_else(|| error.as_str())
                .unwrap_or("unknown error");
            return Err(LinkError::Backend(message.to_string()));
        }

        Ok(serde_json::from_value(value)?)
    }

    /// Versión del nodo en texto plano
    pub async fn version(&self) -> LinkResult<String> {
        let text = self.request(Method::GET, "/version", None).await?.text().await?;
        Ok(text.trim().to_string())
    }

    pub async fn load_tracks(&self, identifier: &str) -> LinkResult<TrackLoadResult> {
        let endpoint = format!("/loadtracks?identifier={}", urlencoding::encode(identifier));
        self.call(Method::GET, &endpoint, None).await
    }

    pub async fn decode_track(&self, encoded: &str) -> LinkResult<RestTrack> {
        let endpoint = format!("/decodetrack?encodedTrack={}", urlencoding::encode(encoded));
        self.call(Method::GET, &endpoint, None).await
    }

    pub async fn decode_tracks(&self, encoded: &[String]) -> LinkResult<Vec<RestTrack>> {
        self.call(Method::POST, "/decodetracks", Some(json!(encoded)))
            .await
    }

    pub async fn players(&self, session_id: &str) -> LinkResult<Vec<RestPlayer>> {
        let endpoint = format!("/sessions/{}/players", session_id);
        self.call(Method::GET, &endpoint, None).await
    }

    pub async fn player(&self, session_id: &str, guild_id: &str) -> LinkResult<RestPlayer> {
        let endpoint = format!("/sessions/{}/players/{}", session_id, guild_id);
        self.call(Method::GET, &endpoint, None).await
    }

    /// Actualiza o crea el player de la guild
    pub async fn update_player(
        &self,
        session_id: &str,
        guild_id: &str,
        update: &PlayerUpdate,
        no_replace: bool,
    ) -> LinkResult<RestPlayer> {
        let endpoint = format!(
            "/sessions/{}/players/{}?noReplace={}",
            session_id, guild_id, no_replace
        );
        self.call(Method::PATCH, &endpoint, Some(serde_json::to_value(update)?))
            .await
    }

    pub async fn delete_player(&self, session_id: &str, guild_id: &str) -> LinkResult<()> {
        let endpoint = format!("/sessions/{}/players/{}", session_id, guild_id);
        self.call(Method::DELETE, &endpoint, None).await
    }

    pub async fn update_session(
        &self,
        session_id: &str,
        resuming_key: Option<&str>,
        timeout: Option<u64>,
    ) -> LinkResult<SessionInfo> {
        let endpoint = format!("/sessions/{}", session_id);
        let body = json!({ "resumingKey": resuming_key, "timeout": timeout });
        self.call(Method::PATCH, &endpoint, Some(body)).await
    }

    pub async fn info(&self) -> LinkResult<NodeInfo> {
        self.call(Method::GET, "/info", None).await
    }

    pub async fn stats(&self) -> LinkResult<NodeStats> {
        self.call(Method::GET, "/stats", None).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadType {
    TrackLoaded,
    PlaylistLoaded,
    SearchResult,
    NoMatches,
    LoadFailed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub selected_track: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadException {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub cause: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackLoadResult {
    pub load_type: LoadType,
    #[serde(default)]
    pub playlist_info: Option<PlaylistInfo>,
    #[serde(default)]
    pub tracks: Vec<RestTrack>,
    #[serde(default)]
    pub exception: Option<LoadException>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestVoiceState {
    pub token: String,
    pub endpoint: String,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ping: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestPlayer {
    pub guild_id: String,
    #[serde(default)]
    pub track: Option<RestTrack>,
    pub volume: u16,
    pub paused: bool,
    pub voice: RestVoiceState,
    #[serde(default)]
    pub filters: Filters,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoded_track: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<Filters>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<RestVoiceState>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    #[serde(default)]
    pub resuming_key: Option<String>,
    pub timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    pub version: VersionInfo,
    pub build_time: i64,
    pub git: GitInfo,
    pub jvm: String,
    pub lavaplayer: String,
    #[serde(default)]
    pub source_managers: Vec<String>,
    #[serde(default)]
    pub filters: Vec<String>,
    #[serde(default)]
    pub plugins: Vec<PluginInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub semver: String,
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    #[serde(default)]
    pub pre_release: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitInfo {
    pub branch: String,
    pub commit: String,
    pub commit_time: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
}
