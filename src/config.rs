// Application configuration.
// The default log level depends on the build profile; RUST_LOG overrides it.

use crate::error::{Error, Result};
use crate::utils::add_ice_url_scheme;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[cfg(debug_assertions)]
const DEFAULT_LOG_FILTER: &str = "peercall_lib=debug,peercall=debug";

#[cfg(not(debug_assertions))]
const DEFAULT_LOG_FILTER: &str = "peercall_lib=warn,peercall=info";

/// Public STUN server used when nothing else is configured
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

/// Signaling relay used by the CLI when no URL is given
pub const DEFAULT_SIGNALING_URL: &str = "ws://localhost:8080";

pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// `urls` is either a single string or a list, as in the browser API
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum IceUrls {
    One(String),
    Many(Vec<String>),
}

impl IceUrls {
    pub fn as_slice(&self) -> &[String] {
        match self {
            IceUrls::One(url) => std::slice::from_ref(url),
            IceUrls::Many(urls) => urls,
        }
    }
}

/// One STUN/TURN server entry
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct IceServer {
    pub urls: IceUrls,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: IceUrls::One(url.into()),
            username: None,
            credential: None,
        }
    }

    pub fn turn(
        url: impl Into<String>,
        username: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            urls: IceUrls::One(url.into()),
            username: Some(username.into()),
            credential: Some(credential.into()),
        }
    }

    fn has_credentials(&self) -> bool {
        self.username.is_some() && self.credential.is_some()
    }

    /// URLs with a `stun:`/`turn:` scheme added where it was left out
    pub fn normalized_urls(&self) -> Vec<String> {
        self.urls
            .as_slice()
            .iter()
            .map(|url| add_ice_url_scheme(url, self.has_credentials()))
            .collect()
    }
}

/// ICE servers handed to every new connection: `{"iceServers": [...]}`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IceServerConfig {
    #[serde(default)]
    pub ice_servers: Vec<IceServer>,
}

impl Default for IceServerConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![IceServer::stun(DEFAULT_STUN_SERVER)],
        }
    }
}

impl IceServerConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| Error::InvalidConfig(format!("ICE server config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    /// Check every server entry before a connection is built from it
    pub fn validate(&self) -> Result<()> {
        for server in &self.ice_servers {
            if server.urls.as_slice().is_empty() {
                return Err(Error::InvalidConfig("ICE server has no URLs".into()));
            }

            for url in server.urls.as_slice() {
                if url.trim().is_empty() {
                    return Err(Error::InvalidConfig("ICE server URL cannot be empty".into()));
                }
            }

            for url in server.normalized_urls() {
                let scheme = url.split(':').next().unwrap_or_default();
                match scheme {
                    "stun" | "stuns" => {}
                    "turn" | "turns" => {
                        if !server.has_credentials() {
                            return Err(Error::InvalidConfig(format!(
                                "TURN server {} requires username and credential",
                                url
                            )));
                        }
                    }
                    other => {
                        return Err(Error::InvalidConfig(format!(
                            "unsupported ICE URL scheme '{}' in {}",
                            other, url
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Which local capture sources the endpoint should open
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
        }
    }
}

impl MediaConstraints {
    pub fn is_empty(&self) -> bool {
        !self.audio && !self.video
    }
}

/// Settings for one signaling controller
#[derive(Debug, Clone, Default)]
pub struct ControllerConfig {
    pub ice: IceServerConfig,

    /// Send `{"type":"reject"}` back when an offer is refused.
    /// Off by default: a refused offer is dropped silently.
    pub announce_rejections: bool,
}

/// Everything the CLI needs to run one endpoint
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub signaling_url: String,
    pub controller: ControllerConfig,
    pub media: MediaConstraints,
    /// Place a call as soon as the relay is connected
    pub start_call: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            signaling_url: DEFAULT_SIGNALING_URL.to_string(),
            controller: ControllerConfig::default(),
            media: MediaConstraints::default(),
            start_call: false,
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.signaling_url.starts_with("ws://") || self.signaling_url.starts_with("wss://"))
        {
            return Err(Error::InvalidConfig(format!(
                "signaling URL must be ws:// or wss://, got {}",
                self.signaling_url
            )));
        }
        if self.media.is_empty() {
            return Err(Error::InvalidConfig(
                "at least one of audio or video must be enabled".into(),
            ));
        }
        self.controller.ice.validate()
    }
}
