use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Proxima real-time chat server
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(name = "proxima-server", version, about = "Proxima real-time chat server")]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "PROXIMA_PORT", default_value = "8000")]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "PROXIMA_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Path to TOML config file
    #[arg(long, default_value = "./proxima.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "PROXIMA_JSON_LOGS")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Data directory for persistent state (DB, JWT key)
    #[arg(long, env = "PROXIMA_DATA_DIR", default_value = "./data")]
    pub data_dir: String,

    /// Proximity and chat limits (loaded from [proximity] section in TOML)
    #[arg(skip)]
    #[serde(
        default = "default_proximity_config",
        skip_serializing_if = "Option::is_none"
    )]
    pub proximity: Option<ProximityConfig>,
}

/// Tunables of the real-time core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProximityConfig {
    /// Radius in meters for users who never configured one (default: 1600)
    #[serde(default = "default_radius_m")]
    pub default_radius_m: f64,

    /// Messages replayed to a client joining a room (default: 50)
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Maximum message length in characters (default: 2000)
    #[serde(default = "default_max_content_length")]
    pub max_content_length: usize,
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            default_radius_m: default_radius_m(),
            history_limit: default_history_limit(),
            max_content_length: default_max_content_length(),
        }
    }
}

fn default_radius_m() -> f64 {
    1600.0
}

fn default_history_limit() -> usize {
    50
}

fn default_max_content_length() -> usize {
    2000
}

fn default_proximity_config() -> Option<ProximityConfig> {
    Some(ProximityConfig::default())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8000,
            bind_address: "0.0.0.0".to_string(),
            config: "./proxima.toml".to_string(),
            json_logs: false,
            generate_config: false,
            data_dir: "./data".to_string(),
            proximity: Some(ProximityConfig::default()),
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (PROXIMA_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        let cli = Config::parse();
        Self::figment(cli).extract()
    }

    fn figment(cli: Config) -> Figment {
        let config_path = cli.config.clone();
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("PROXIMA_").split("__"))
            .merge(Serialized::defaults(cli))
    }

    /// The `[proximity]` section, or its defaults when absent.
    pub fn proximity(&self) -> ProximityConfig {
        self.proximity.clone().unwrap_or_default()
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Proxima Server Configuration
# Place this file at ./proxima.toml or specify with --config <path>
# All settings can be overridden via environment variables (PROXIMA_PORT,
# PROXIMA_PROXIMITY__DEFAULT_RADIUS_M, etc.) or CLI flags (--port, etc.)

# Server port (default: 8000)
# port = 8000

# Bind address (default: 0.0.0.0, all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory for SQLite database and JWT signing key
# data_dir = "./data"

# ---- Proximity ----
# [proximity]

# Radius in meters used for users without their own setting
# default_radius_m = 1600.0

# Number of recent messages sent to a client joining a room
# history_limit = 50

# Maximum message length in characters
# max_content_length = 2000
"#
    .to_string()
}
