//! Configuration management

use anyhow::Result;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

const DEFAULT_PATH: &str = "config.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    /// Directory holding interactions.jsonl, created on startup if absent
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default)]
    pub listeners: Vec<ListenerConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_banner() -> String {
    "SSH-2.0-OpenSSH_7.4\\r\\n".to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
}

/// One decoy port. Immutable once the listener is started; exactly one
/// bound socket per entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenerConfig {
    pub port: u16,
    #[serde(default)]
    pub proto: Protocol,
    #[serde(flatten)]
    pub handler: HandlerConfig,
}

/// Handler selection plus its options, tagged by the `handler` key
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "handler", rename_all = "lowercase")]
pub enum HandlerConfig {
    Http,
    Banner {
        #[serde(default = "default_banner")]
        banner: String,
    },
    Generic {
        #[serde(default)]
        echo: bool,
        #[serde(default)]
        service: Option<String>,
    },
}

impl ListenerConfig {
    /// Label recorded in the `service` field of interaction records,
    /// resolved against the port actually bound (which differs from the
    /// configured one when port 0 picks an ephemeral port).
    pub fn service_name(&self, bound_port: u16) -> String {
        match &self.handler {
            HandlerConfig::Http => "http".to_string(),
            HandlerConfig::Banner { .. } => "banner".to_string(),
            HandlerConfig::Generic {
                service: Some(service),
                ..
            } => service.clone(),
            HandlerConfig::Generic { .. } => format!("tcp_{}", bound_port),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            log_dir: default_log_dir(),
            listeners: vec![
                ListenerConfig {
                    port: 80,
                    proto: Protocol::Tcp,
                    handler: HandlerConfig::Http,
                },
                ListenerConfig {
                    port: 2222,
                    proto: Protocol::Tcp,
                    handler: HandlerConfig::Banner {
                        banner: default_banner(),
                    },
                },
                ListenerConfig {
                    port: 502,
                    proto: Protocol::Tcp,
                    handler: HandlerConfig::Generic {
                        echo: false,
                        service: None,
                    },
                },
            ],
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_PATH)
    }

    /// Load from a TOML file with NETDECOY_* environment overrides. A
    /// missing file is not an error: the built-in default listener set
    /// applies so the decoy runs out of the box.
    pub fn load_from(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        }

        let builder = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("NETDECOY"));

        let settings = builder.build()?;
        let config: Config = settings.try_deserialize()?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            anyhow::bail!("Bind host cannot be empty");
        }
        if self.log_dir.is_empty() {
            anyhow::bail!("log_dir cannot be empty");
        }
        if self.listeners.is_empty() {
            anyhow::bail!("At least one listener must be configured");
        }

        let mut seen = HashSet::new();
        for listener in &self.listeners {
            if listener.port == 0 {
                anyhow::bail!("Invalid listener port: 0 is not allowed");
            }
            if !seen.insert(listener.port) {
                anyhow::bail!("Duplicate listener port {}", listener.port);
            }
            if let HandlerConfig::Banner { banner } = &listener.handler {
                if banner.is_empty() {
                    anyhow::bail!("Banner for port {} cannot be empty", listener.port);
                }
            }
        }

        Ok(())
    }
}

/// Decode literal escape sequences in configured banner text into actual
/// control bytes, so `"SSH-2.0-OpenSSH_7.4\r\n"` goes out ending in CR LF.
/// Unknown escapes pass through unchanged.
pub fn decode_escapes(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            push_char(&mut out, c);
            continue;
        }
        match chars.next() {
            Some('r') => out.push(b'\r'),
            Some('n') => out.push(b'\n'),
            Some('t') => out.push(b'\t'),
            Some('0') => out.push(0),
            Some('\\') => out.push(b'\\'),
            Some('x') => {
                let hex: String = chars.by_ref().take(2).collect();
                match u8::from_str_radix(&hex, 16) {
                    Ok(byte) if hex.len() == 2 => out.push(byte),
                    _ => {
                        out.extend_from_slice(b"\\x");
                        out.extend_from_slice(hex.as_bytes());
                    }
                }
            }
            Some(other) => {
                out.push(b'\\');
                push_char(&mut out, other);
            }
            // trailing backslash
            None => out.push(b'\\'),
        }
    }

    out
}

fn push_char(out: &mut Vec<u8>, c: char) {
    let mut buf = [0u8; 4];
    out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
}
