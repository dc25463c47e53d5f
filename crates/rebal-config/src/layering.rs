//! Loading and merging config layers.
//!
//! Layers are YAML mappings applied in order: mappings merge key by key,
//! anything else in a later layer replaces what came before. An empty
//! document contributes nothing. Every layer is screened for credential
//! literals before it is merged, so the error can name the layer.

use std::fs;

use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::run_config::RunConfig;
use crate::secrets::refuse_credential_literals;

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// SHA-256 hex of `canonical_json`.
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
    /// Layer labels in merge order: file paths, or `layer <n>` for strings.
    pub sources: Vec<String>,
}

impl LoadedConfig {
    pub fn run_config(&self) -> Result<RunConfig> {
        RunConfig::from_json(&self.config_json)
    }
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let layers = paths
        .iter()
        .map(|p| {
            let raw = fs::read_to_string(p).with_context(|| format!("cannot read config layer {p}"))?;
            Ok((p.to_string(), raw))
        })
        .collect::<Result<Vec<_>>>()?;
    merge_layers(layers)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let layers = yaml_docs
        .iter()
        .enumerate()
        .map(|(i, raw)| (format!("layer {i}"), raw.to_string()))
        .collect();
    merge_layers(layers)
}

fn merge_layers(layers: Vec<(String, String)>) -> Result<LoadedConfig> {
    let mut merged = Value::Object(Map::new());
    let mut sources = Vec::with_capacity(layers.len());

    for (label, raw) in layers {
        let yaml: serde_yaml::Value =
            serde_yaml::from_str(&raw).with_context(|| format!("{label} is not valid YAML"))?;
        let doc = serde_json::to_value(yaml).with_context(|| format!("{label} has no JSON form"))?;
        match doc {
            Value::Null => {}
            Value::Object(_) => {
                refuse_credential_literals(&label, &doc)?;
                overlay(&mut merged, doc);
            }
            _ => bail!("{label}: a config layer must be a mapping"),
        }
        sources.push(label);
    }

    // serde_json's default map is key-ordered, so this string is canonical.
    let canonical_json = serde_json::to_string(&merged).context("config serialization failed")?;
    Ok(LoadedConfig {
        config_hash: hex::encode(Sha256::digest(canonical_json.as_bytes())),
        canonical_json,
        config_json: merged,
        sources,
    })
}

fn overlay(base: &mut Value, layer: Value) {
    match (base, layer) {
        (Value::Object(base), Value::Object(layer)) => {
            for (key, value) in layer {
                match base.get_mut(&key) {
                    Some(slot) => overlay(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}
