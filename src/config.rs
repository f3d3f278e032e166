use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Opciones de conexión de un nodo Lavalink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeOptions {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub secure: bool,
    pub identifier: String,
    /// Reintentos tras el primer intento fallido
    pub retry_amount: u32,
    #[serde(with = "human_duration")]
    pub retry_delay: Duration,
    #[serde(with = "human_duration")]
    pub request_timeout: Duration,
}

impl NodeOptions {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }
}

impl Default for NodeOptions {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 2333,
            password: "youshallnotpass".to_string(),
            secure: false,
            identifier: "lavabridge".to_string(),
            retry_amount: 5,
            retry_delay: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerOptions {
    pub nodes: Vec<NodeOptions>,
    pub client_id: Option<String>,
}

/// Configuración del binario, cargada desde el entorno y `.env`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub nodes: Vec<NodeOptions>,
    pub client_id: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// Construye la configuración a partir de una fuente de variables
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = NodeOptions::default();
        let var = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        let password = var("LAVALINK_PASSWORD").unwrap_or(defaults.password);
        let identifier = var("LAVALINK_IDENTIFIER").unwrap_or(defaults.identifier);
        let secure = match var("LAVALINK_SECURE") {
            Some(v) => v.parse().context("LAVALINK_SECURE must be true or false")?,
            None => defaults.secure,
        };
        let retry_amount = match var("LAVALINK_RETRY_AMOUNT") {
            Some(v) => v.parse().context("LAVALINK_RETRY_AMOUNT must be a number")?,
            None => defaults.retry_amount,
        };
        let retry_delay = match var("LAVALINK_RETRY_DELAY") {
            Some(v) => humantime::parse_duration(&v).context("Invalid LAVALINK_RETRY_DELAY")?,
            None => defaults.retry_delay,
        };
        let request_timeout = match var("LAVALINK_REQUEST_TIMEOUT") {
            Some(v) => {
                humantime::parse_duration(&v).context("Invalid LAVALINK_REQUEST_TIMEOUT")?
            }
            None => defaults.request_timeout,
        };

        // "host:port,host:port" o, si no está, LAVALINK_HOST + LAVALINK_PORT
        let addresses = match var("LAVALINK_NODES") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(parse_address)
                .collect::<Result<Vec<_>>>()?,
            None => {
                let host = var("LAVALINK_HOST").unwrap_or(defaults.host);
                let port = match var("LAVALINK_PORT") {
                    Some(v) => v.parse().context("LAVALINK_PORT must be a port number")?,
                    None => defaults.port,
                };
                vec![(host, port)]
            }
        };

        let single = addresses.len() == 1;
        let nodes = addresses
            .into_iter()
            .enumerate()
            .map(|(i, (host, port))| NodeOptions {
                host,
                port,
                password: password.clone(),
                secure,
                identifier: if single {
                    identifier.clone()
                } else {
                    format!("{}-{}", identifier, i + 1)
                },
                retry_amount,
                retry_delay,
                request_timeout,
            })
            .collect();

        Ok(Self {
            nodes,
            client_id: var("CLIENT_ID"),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            anyhow::bail!("At least one Lavalink node must be configured");
        }

        for node in &self.nodes {
            if node.host.trim().is_empty() {
                anyhow::bail!("Node {} has an empty host", node.identifier);
            }
            if node.port == 0 {
                anyhow::bail!("Node {} has port 0", node.identifier);
            }
            if node.request_timeout.is_zero() {
                anyhow::bail!("Node {} request timeout must be greater than 0", node.identifier);
            }
        }

        Ok(())
    }

    /// Resumen apto para logs (sin contraseñas)
    pub fn summary(&self) -> String {
        let nodes: Vec<String> = self
            .nodes
            .iter()
            .map(|n| {
                format!(
                    "{} ({}://{}:{}, {} retries every {})",
                    n.identifier,
                    if n.secure { "https" } else { "http" },
                    n.host,
                    n.port,
                    n.retry_amount,
                    humantime::format_duration(n.retry_delay)
                )
            })
            .collect();

        format!(
            "Config Summary:\n  Nodes: {}\n  Client: {}",
            nodes.join(", "),
            self.client_id.as_deref().unwrap_or("(set on init)")
        )
    }

    pub fn manager_options(&self) -> ManagerOptions {
        ManagerOptions {
            nodes: self.nodes.clone(),
            client_id: self.client_id.clone(),
        }
    }
}

fn parse_address(entry: &str) -> Result<(String, u16)> {
    match entry.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse()
                .with_context(|| format!("Invalid port in node address '{}'", entry))?;
            Ok((host.to_string(), port))
        }
        None => Ok((entry.to_string(), NodeOptions::default().port)),
    }
}

/// Duraciones como texto legible ("5s", "1m 30s")
mod human_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}
