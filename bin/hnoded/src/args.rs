use std::path::PathBuf;

use anyhow::anyhow;
use argh::FromArgs;
use hnode_config::Config;
use serde_json::{from_str, from_value, to_value, Value};

#[derive(Debug, Clone, FromArgs)]
#[argh(description = "Bitcoin header node")]
pub struct Args {
    // Config non-overriding args
    #[argh(option, short = 'c', description = "path to configuration")]
    pub config: PathBuf,

    // Config overriding args
    #[argh(
        option,
        short = 'd',
        description = "datadir path that will contain the header store"
    )]
    pub prefix: Option<PathBuf>,

    #[argh(option, description = "network to join (main, test, regtest, simnet)")]
    pub network: Option<String>,

    #[argh(option, description = "fast-sync start height")]
    pub start_height: Option<u32>,

    #[argh(option, description = "rpc host")]
    pub rpc_host: Option<String>,

    #[argh(option, description = "rpc port")]
    pub rpc_port: Option<u16>,

    #[argh(option, short = 'o', description = "generic config overrides")]
    pub overrides: Vec<String>,
}

impl Args {
    pub fn override_config(&self, config: &mut Config) -> anyhow::Result<bool> {
        let mut overridden = self.override_generic(config)?;

        if let Some(prefix) = &self.prefix {
            config.node.prefix = prefix.into();
            overridden = true
        }
        if let Some(network) = &self.network {
            config.node.network = network.parse().map_err(|e| anyhow!("{e}"))?;
            overridden = true
        }
        if let Some(start_height) = self.start_height {
            config.node.start_height = Some(start_height);
            overridden = true
        }
        if let Some(rpc_host) = &self.rpc_host {
            config.rpc.rpc_host = rpc_host.to_string();
            overridden = true
        }
        if let Some(rpc_port) = self.rpc_port {
            config.rpc.rpc_port = rpc_port;
            overridden = true
        }
        Ok(overridden)
    }

    /// Override config using the generic overrides.
    fn override_generic(&self, config: &mut Config) -> anyhow::Result<bool> {
        let original = config.clone();
        // Convert config as json
        let mut json_config = to_value(&mut *config).expect("config json serialization failed");

        for (path, val) in parse_overrides(&self.overrides)?.iter() {
            apply_override(path, val, &mut json_config)?;
        }
        *config = from_value(json_config)
            .map_err(|e| anyhow!("invalid override value: {e}"))?;
        Ok(original != *config)
    }
}

type Override = (Vec<String>, String);

/// Parse valid overrides.
fn parse_overrides(overrides: &[String]) -> anyhow::Result<Vec<Override>> {
    let mut result = Vec::new();
    for item in overrides {
        let (key, value) = item
            .split_once('=')
            .ok_or(anyhow!("invalid override: must be in 'key=value' format"))?;
        let path: Vec<_> = key.split('.').map(|x| x.to_string()).collect();
        result.push((path, value.to_string()));
    }
    Ok(result)
}

/// Apply override to config.
fn apply_override(path: &[String], str_value: &str, config: &mut Value) -> anyhow::Result<()> {
    match path {
        [key] => {
            config[key] = from_str(str_value).unwrap_or(Value::String(str_value.to_string()));
        }
        [key, other @ ..] => {
            apply_override(other, str_value, &mut config[key])?;
        }
        [] => return Err(anyhow!("invalid override path")),
    };
    Ok(())
}
