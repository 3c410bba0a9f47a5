use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::chat::router::SenderIdentity;

/// Courier direct-message relay
#[derive(Parser, Serialize, Debug, Clone)]
#[command(
    name = "courier-server",
    version,
    about = "Courier direct-message relay"
)]
pub struct Cli {
    /// Port to listen on
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Bind address
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<String>,

    /// Path to TOML config file
    #[arg(long, default_value = "./courier.toml")]
    #[serde(skip)]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    #[serde(skip)]
    pub generate_config: bool,
}

/// Resolved server configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub bind_address: String,
    #[serde(default)]
    pub json_logs: bool,
    /// Relay behaviour (loaded from [relay] section in TOML)
    #[serde(default)]
    pub relay: RelayConfig,
}

/// Settings for message relay and connection keep-alive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// "bound" rewrites `from` to the sender's registered name, "claimed" trusts the client
    #[serde(default)]
    pub sender_identity: SenderIdentity,

    /// Seconds between server pings on each connection (default: 30)
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,

    /// Seconds to wait for a pong before closing the connection (default: 10)
    #[serde(default = "default_pong_timeout")]
    pub pong_timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            sender_identity: SenderIdentity::default(),
            ping_interval_secs: default_ping_interval(),
            pong_timeout_secs: default_pong_timeout(),
        }
    }
}

fn default_ping_interval() -> u64 {
    30
}

fn default_pong_timeout() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            bind_address: "0.0.0.0".to_string(),
            json_logs: false,
            relay: RelayConfig::default(),
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (COURIER_*) < CLI args
    pub fn load(cli: &Cli) -> Result<Self, figment::Error> {
        Self::figment(cli).extract()
    }

    fn figment(cli: &Cli) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&cli.config))
            .merge(Env::prefixed("COURIER_").split("__"))
            .merge(Serialized::defaults(cli))
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Courier Relay Configuration
# Place this file at ./courier.toml or specify with --config <path>
# All settings can be overridden via environment variables (COURIER_PORT,
# COURIER_RELAY__SENDER_IDENTITY, etc.) or CLI flags (--port, etc.)

# Server port (default: 3000)
# port = 3000

# Bind address (default: 0.0.0.0, all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# ---- Relay ----
# [relay]

# How the "from" field of a sent message is treated:
#   "bound"   replaced by the sender's registered username (default)
#   "claimed" relayed exactly as the client sent it
# sender_identity = "bound"

# Keep-alive: ping every N seconds, close if no pong within M seconds
# ping_interval_secs = 30
# pong_timeout_secs = 10
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn cli(config: &str) -> Cli {
        Cli::parse_from(["courier-server", "--config", config])
    }

    #[test]
    fn test_defaults_without_file() {
        Jail::expect_with(|_jail| {
            let config = Config::load(&cli("missing.toml"))?;
            assert_eq!(config.port, 3000);
            assert_eq!(config.bind_address, "0.0.0.0");
            assert!(!config.json_logs);
            assert_eq!(config.relay.sender_identity, SenderIdentity::Bound);
            assert_eq!(config.relay.ping_interval_secs, 30);
            assert_eq!(config.relay.pong_timeout_secs, 10);
            Ok(())
        });
    }

    #[test]
    fn test_layered_precedence() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "courier.toml",
                r#"
                port = 4000
                bind_address = "127.0.0.1"

                [relay]
                sender_identity = "claimed"
                ping_interval_secs = 5
                "#,
            )?;
            jail.set_env("COURIER_PORT", "5000");
            jail.set_env("COURIER_RELAY__PONG_TIMEOUT_SECS", "3");

            let config = Config::load(&cli("courier.toml"))?;
            assert_eq!(config.port, 5000);
            assert_eq!(config.bind_address, "127.0.0.1");
            assert_eq!(config.relay.sender_identity, SenderIdentity::Claimed);
            assert_eq!(config.relay.ping_interval_secs, 5);
            assert_eq!(config.relay.pong_timeout_secs, 3);

            let overridden = Config::load(&Cli::parse_from([
                "courier-server",
                "--config",
                "courier.toml",
                "--port",
                "6000",
            ]))?;
            assert_eq!(overridden.port, 6000);
            Ok(())
        });
    }

    #[test]
    fn test_template_mentions_every_setting() {
        let template = generate_config_template();
        for key in [
            "port",
            "bind_address",
            "json_logs",
            "sender_identity",
            "ping_interval_secs",
            "pong_timeout_secs",
        ] {
            assert!(template.contains(key), "template missing {key}");
        }
    }
}
