use std::path::PathBuf;

use hnode_primitives::Network;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeConfig {
    /// Network to join.
    pub network: Network,

    /// Store directory.
    pub prefix: PathBuf,

    /// Keep the store in memory (tests and throwaway runs).
    #[serde(default)]
    pub memory: bool,

    /// Enforce checkpoint conformance.
    #[serde(default = "default_true")]
    pub checkpoints: bool,

    /// Fast-sync anchor height, resolved via the explorer on main/test.
    #[serde(default)]
    pub start_height: Option<u32>,

    /// Fast-sync anchor as raw hex headers: `[prev, start]`.  Takes
    /// precedence over `start_height`; the only option on regtest/simnet.
    #[serde(default)]
    pub start_tip: Option<[String; 2]>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncSettings {
    /// How long a peer may sit on a `getheaders` before demotion, millis.
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u32,

    /// How long orphans wait for ancestry before ejection, millis.
    #[serde(default = "default_orphan_timeout_ms")]
    pub orphan_timeout_ms: u32,

    /// Resolution rounds per orphan root.
    #[serde(default = "default_max_orphan_rounds")]
    pub max_orphan_rounds: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            response_timeout_ms: default_response_timeout_ms(),
            orphan_timeout_ms: default_orphan_timeout_ms(),
            max_orphan_rounds: default_max_orphan_rounds(),
        }
    }
}

/// Endpoint of the trusted bitcoind the binary uses as its header source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BitcoindConfig {
    pub rpc_url: String,
    pub rpc_user: String,
    pub rpc_password: String,

    /// New-tip poll cadence, millis.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcConfig {
    pub rpc_host: String,
    pub rpc_port: u16,
}

/// Explorer used for the start-height bootstrap.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ExplorerConfig {
    /// Esplora base URL override; the network default applies when unset.
    #[serde(default)]
    pub url: Option<String>,

    /// Lookup deadline, millis.
    #[serde(default = "default_lookup_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub node: NodeConfig,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub bitcoind_rpc: Option<BitcoindConfig>,

    pub rpc: RpcConfig,

    #[serde(default)]
    pub explorer: ExplorerConfig,
}

fn default_true() -> bool {
    true
}

fn default_response_timeout_ms() -> u32 {
    30_000
}

fn default_orphan_timeout_ms() -> u32 {
    60_000
}

fn default_max_orphan_rounds() -> u32 {
    3
}

fn default_poll_interval_ms() -> u32 {
    2_000
}

fn default_lookup_timeout_ms() -> u64 {
    30_000
}

#[cfg(test)]
mod test {
    use crate::config::Config;

    #[test]
    fn test_config_load() {
        let config_string = r#"
            [node]
            network = "main"
            prefix = "/path/to/data/directory"
            start_height = 200000

            [rpc]
            rpc_host = "0.0.0.0"
            rpc_port = 8337

            [bitcoind_rpc]
            rpc_url = "http://localhost:8332"
            rpc_user = "hnode"
            rpc_password = "hnode"

            [sync]
            response_timeout_ms = 15000
        "#;

        let config = toml::from_str::<Config>(config_string);
        assert!(
            config.is_ok(),
            "should be able to load TOML config but got: {:?}",
            config.err()
        );

        let config = config.unwrap();
        assert!(config.node.checkpoints);
        assert!(!config.node.memory);
        assert_eq!(config.node.start_height, Some(200000));
        assert_eq!(config.sync.response_timeout_ms, 15000);
        assert_eq!(config.sync.max_orphan_rounds, 3);
    }

    #[test]
    fn test_minimal_regtest_config() {
        let config_string = r#"
            [node]
            network = "regtest"
            prefix = "/tmp/hnode"
            memory = true
            checkpoints = false

            [rpc]
            rpc_host = "127.0.0.1"
            rpc_port = 18337
        "#;

        let config = toml::from_str::<Config>(config_string).unwrap();
        assert!(config.node.memory);
        assert!(!config.node.checkpoints);
        assert!(config.bitcoind_rpc.is_none());
        assert!(config.node.start_tip.is_none());
    }
}
