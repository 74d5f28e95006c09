use clap::Parser;
use relay_common::configs::RelayConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_FILE: &str = "code_relay.conf";

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default)]
#[clap(about = "Code availability relay: upstream Socket.IO push to subscribers", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "CODE_RELAY_PORT", help = "Port for the HTTP command/health surface.")]
    pub port: Option<u16>,

    #[clap(long, env = "CODE_RELAY_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "CODE_RELAY_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "CODE_RELAY_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "CODE_RELAY_UPSTREAM_URL", help = "Base URL of the upstream Socket.IO server.")]
    pub upstream_url: Option<String>,

    #[clap(long, env = "CODE_RELAY_EVENT_NAME", help = "Upstream event carrying new codes.")]
    pub event_name: Option<String>,

    #[clap(long, env = "CODE_RELAY_API_BASE_URL", help = "Base URL of the per-game code lookup API.")]
    pub api_base_url: Option<String>,

    #[clap(long, env = "CODE_RELAY_SUBSCRIBERS_FILE", help = "JSON file holding the subscriber list.")]
    pub subscribers_file: Option<PathBuf>,

    #[clap(long, env = "CODE_RELAY_OUTBOUND_URL", help = "Webhook receiving outbound messages; log-only when unset.")]
    pub outbound_url: Option<String>,

    #[clap(long, env = "CODE_RELAY_SITE_URL", help = "Site link included in lookup replies.")]
    pub site_url: Option<String>,

    #[clap(long, env = "CODE_RELAY_INSTANCE_ID", help = "Identifier of this relay instance.")]
    pub instance_id: Option<String>,

    /// Timing and policy knobs; only read from the config file.
    #[clap(skip)]
    #[serde(default)]
    pub relay: Option<RelayConfig>,
}

/// Fully resolved configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub log_dir: PathBuf,
    pub log_level: String,
    pub api_base_url: String,
    pub subscribers_file: PathBuf,
    pub outbound_url: Option<String>,
    pub site_url: String,
    pub instance_id: String,
    pub relay: RelayConfig,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            port: other.port.or(self.port),
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            upstream_url: other.upstream_url.or(self.upstream_url),
            event_name: other.event_name.or(self.event_name),
            api_base_url: other.api_base_url.or(self.api_base_url),
            subscribers_file: other.subscribers_file.or(self.subscribers_file),
            outbound_url: other.outbound_url.or(self.outbound_url),
            site_url: other.site_url.or(self.site_url),
            instance_id: other.instance_id.or(self.instance_id),
            relay: other.relay.or(self.relay),
        }
    }

    fn defaults() -> Config {
        Config {
            port: Some(8080),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            api_base_url: Some("http://127.0.0.1:3000/api/codes".to_string()),
            subscribers_file: Some(PathBuf::from("./data/subscribers.json")),
            site_url: Some("https://code.490816852.xyz".to_string()),
            instance_id: Some("code_relay".to_string()),
            ..Default::default()
        }
    }

    /// Fills every remaining gap from the built-in defaults. Upstream URL and
    /// event name override whatever the `relay` section says.
    pub fn resolve(self) -> Settings {
        let merged = Config::defaults().merge(self);
        let mut relay = merged.relay.unwrap_or_default();
        if let Some(url) = merged.upstream_url {
            relay.upstream.url = url;
        }
        if let Some(event_name) = merged.event_name {
            relay.upstream.event_name = event_name;
        }

        Settings {
            port: merged.port.unwrap_or(8080),
            log_dir: merged.log_dir.unwrap_or_else(|| PathBuf::from("./logs")),
            log_level: merged.log_level.unwrap_or_else(|| "info".to_string()),
            api_base_url: merged.api_base_url.unwrap_or_default(),
            subscribers_file: merged.subscribers_file.unwrap_or_default(),
            outbound_url: merged.outbound_url.filter(|url| !url.trim().is_empty()),
            site_url: merged.site_url.unwrap_or_default(),
            instance_id: merged.instance_id.unwrap_or_default(),
            relay,
        }
    }
}

fn read_config_file(path: &Path) -> Option<Config> {
    if !path.exists() {
        log::info!("Config file not found at {}. Using defaults and environment/CLI variables.", path.display());
        return None;
    }
    match fs::read_to_string(path) {
        Ok(config_str) => match serde_json::from_str::<Config>(&config_str) {
            Ok(file_config) => Some(file_config),
            Err(e) => {
                log::warn!("Failed to parse config file {}: {}. Falling back to other sources.", path.display(), e);
                None
            }
        },
        Err(e) => {
            log::warn!("Failed to read config file {}: {}. Falling back to other sources.", path.display(), e);
            None
        }
    }
}

/// defaults < config file < environment/CLI.
pub fn merge_sources(cli: Config) -> Settings {
    let config_file_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let file_config = read_config_file(&config_file_path).unwrap_or_default();
    file_config.merge(cli).resolve()
}

pub fn load_config() -> Settings {
    // clap reads both the command line and the CODE_RELAY_* environment.
    merge_sources(Config::parse())
}
