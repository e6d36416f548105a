use std::path::PathBuf;

use serde::Deserialize;
use starlark_config::DebugServerConfig;
use starlark_wire::ClientConfig;

/// Arguments of the `launch` and `attach` requests.
///
/// Unset fields fall back to the `[debug_server]` section of the config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchArguments {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub cwd: Option<PathBuf>,
    pub workspace_root: Option<PathBuf>,
    #[serde(default)]
    pub verbose: bool,
}

impl LaunchArguments {
    pub fn client_config(&self, defaults: &DebugServerConfig) -> ClientConfig {
        ClientConfig {
            host: self.host.clone().unwrap_or_else(|| defaults.host.clone()),
            port: self.port.unwrap_or(defaults.port),
            connect_attempts: defaults.connect_attempts,
            retry_delay: defaults.retry_delay(),
            ..ClientConfig::default()
        }
    }

    /// Directory relative source paths are resolved against.
    pub fn workspace_root(&self) -> Option<PathBuf> {
        self.workspace_root.clone().or_else(|| self.cwd.clone())
    }
}
