//! Solver license resolution and the credential-literal guard.
//!
//! The config stores only the env var NAME (`/gateway/license_env`). The
//! value is read once here and never printed: `Debug` redacts it and errors
//! mention the name only. A config layer holding something shaped like a
//! credential is refused outright.

use anyhow::{bail, Result};
use serde_json::Value;

use crate::pointer::scalar_leaves;
use crate::run_config::DEFAULT_LICENSE_ENV;

/// Shapes of credentials that must never sit in a config file.
const CREDENTIAL_PREFIXES: &[&str] = &[
    "LIC-", // solver license strings
    "sk-",
    "sk_live",
    "sk_test",
    "AKIA",
    "-----BEGIN",
    "ghp_",
    "gho_",
    "glpat-",
    "xoxb-",
    "xoxp-",
];

/// Strings shorter than this are never treated as credentials.
const MIN_CREDENTIAL_LEN: usize = 8;

fn looks_like_credential(s: &str) -> bool {
    let t = s.trim();
    t.len() >= MIN_CREDENTIAL_LEN && CREDENTIAL_PREFIXES.iter().any(|p| t.starts_with(p))
}

/// Fails with CONFIG_SECRET_DETECTED on the first credential-shaped string.
/// The value itself is never echoed.
pub(crate) fn refuse_credential_literals(layer: &str, doc: &Value) -> Result<()> {
    let found = scalar_leaves(doc)
        .into_iter()
        .find(|(_, v)| v.as_str().is_some_and(looks_like_credential));
    if let Some((pointer, _)) = found {
        bail!("CONFIG_SECRET_DETECTED {layer} leaf={pointer} value=REDACTED");
    }
    Ok(())
}

#[derive(Clone)]
pub struct ResolvedLicense {
    /// Env var the key was read from.
    pub env_name: String,
    pub key: Option<String>,
}

impl std::fmt::Debug for ResolvedLicense {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedLicense")
            .field("env_name", &self.env_name)
            .field("key", &self.key.as_ref().map(|_| "<REDACTED>"))
            .finish()
    }
}

impl ResolvedLicense {
    /// Solving needs a license; validation does not.
    pub fn require(&self) -> Result<&str> {
        match &self.key {
            Some(k) => Ok(k),
            None => bail!(
                "SECRETS_MISSING: required env var '{}' (solver license) is not set or empty",
                self.env_name
            ),
        }
    }
}

fn read_str_at(config: &Value, pointer: &str) -> Option<String> {
    let s = config.pointer(pointer)?.as_str()?;
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

pub fn resolve_license(config_json: &Value) -> ResolvedLicense {
    let env_name =
        read_str_at(config_json, "/gateway/license_env").unwrap_or_else(|| DEFAULT_LICENSE_ENV.to_string());
    let key = resolve_env(&env_name);
    ResolvedLicense { env_name, key }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_never_shows_the_key() {
        let l = ResolvedLicense {
            env_name: "REBAL_TEST_LICENSE".into(),
            key: Some("super-secret-value".into()),
        };
        let dbg = format!("{l:?}");
        assert!(dbg.contains("<REDACTED>"));
        assert!(!dbg.contains("super-secret-value"));
        assert_eq!(l.require().unwrap(), "super-secret-value");
    }

    #[test]
    fn missing_license_names_the_variable() {
        let cfg = serde_json::json!({"gateway": {"license_env": "REBAL_TEST_LICENSE_SURELY_UNSET_9F2"}});
        let l = resolve_license(&cfg);
        assert_eq!(l.env_name, "REBAL_TEST_LICENSE_SURELY_UNSET_9F2");
        let err = l.require().unwrap_err().to_string();
        assert!(err.contains("REBAL_TEST_LICENSE_SURELY_UNSET_9F2"));
    }

    #[test]
    fn short_or_plain_strings_are_not_credentials() {
        assert!(!looks_like_credential("sk-1"));
        assert!(!looks_like_credential("REBAL_SOLVER_LICENSE"));
        assert!(looks_like_credential("  LIC-0000-1111-2222 "));
    }

    #[test]
    fn guard_names_layer_and_pointer_only() {
        let doc = serde_json::json!({"gateway": {"license_env": "LIC-8842-ACME"}});
        let err = refuse_credential_literals("desk.yaml", &doc).unwrap_err().to_string();
        assert_eq!(err, "CONFIG_SECRET_DETECTED desk.yaml leaf=/gateway/license_env value=REDACTED");
    }

    #[test]
    fn default_name_when_unconfigured() {
        assert_eq!(resolve_license(&serde_json::json!({})).env_name, DEFAULT_LICENSE_ENV);
    }
}
