//! Environment-variable credential backend.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use secrecy::SecretString;

use super::CredentialStore;

const DEFAULT_PREFIX: &str = "PORTAL_";

/// Reads `{PREFIX}{KEY}` variables, e.g. `PORTAL_USERNAME`.
///
/// Blank values count as missing.
pub struct EnvCredentialStore {
    prefix: String,
    /// Fixed variables used instead of the process environment.
    vars: Option<HashMap<String, String>>,
}

impl EnvCredentialStore {
    /// Store over the process environment with the `PORTAL_` prefix.
    pub fn new() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            vars: None,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Store over a fixed set of variables instead of the process environment.
    pub fn from_vars(vars: HashMap<String, String>) -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            vars: Some(vars),
        }
    }

    fn var_name(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key.to_uppercase())
    }

    fn lookup(&self, name: &str) -> Option<String> {
        match &self.vars {
            Some(vars) => vars.get(name).cloned(),
            None => std::env::var(name).ok(),
        }
    }
}

impl Default for EnvCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for EnvCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<SecretString>> {
        let value = self
            .lookup(&self.var_name(key))
            .filter(|v| !v.trim().is_empty());
        Ok(value.map(SecretString::from))
    }

    fn describe_key(&self, key: &str) -> String {
        self.var_name(key)
    }
}
