use serde::Deserialize;
use std::collections::HashMap;

/// Caller-supplied description of one external tool server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub name: String,
    pub transport: ServerTransport,
}

/// How a tool server is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerTransport {
    /// Spawn a subprocess and speak line-delimited JSON-RPC over its pipes.
    Stdio {
        command: String,
        args: Vec<String>,
        env: HashMap<String, String>,
    },
    /// POST JSON-RPC bodies to a URL.
    Http {
        url: String,
        headers: HashMap<String, String>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawServer {
    name: String,
    #[serde(rename = "type", default = "default_transport")]
    transport: String,
    command: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: HashMap<String, String>,
    url: Option<String>,
    #[serde(default)]
    headers: HashMap<String, String>,
}

fn default_transport() -> String {
    "stdio".to_string()
}

impl RawServer {
    pub(crate) fn into_config(self) -> Result<ServerConfig, String> {
        let expand = |s: &str| -> String {
            shellexpand::full(s)
                .map(|cow| cow.into_owned())
                .unwrap_or_else(|_| s.to_string())
        };

        let transport = match self.transport.as_str() {
            "stdio" => {
                let command = self
                    .command
                    .ok_or_else(|| format!("stdio server '{}' is missing a command", self.name))?;
                ServerTransport::Stdio {
                    command: expand(&command),
                    args: self.args.iter().map(|arg| expand(arg)).collect(),
                    env: self
                        .env
                        .into_iter()
                        .map(|(key, value)| (key, expand(&value)))
                        .collect(),
                }
            }
            "http" => {
                let url = self
                    .url
                    .ok_or_else(|| format!("http server '{}' is missing a url", self.name))?;
                ServerTransport::Http {
                    url,
                    headers: self.headers,
                }
            }
            other => {
                return Err(format!(
                    "server '{}' has unknown transport '{other}'",
                    self.name
                ))
            }
        };

        Ok(ServerConfig {
            name: self.name,
            transport,
        })
    }
}
