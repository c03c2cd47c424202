//! Node configuration, deserialized from TOML.

pub mod config;

pub use config::{
    BitcoindConfig, Config, ExplorerConfig, NodeConfig, RpcConfig, SyncSettings,
};
