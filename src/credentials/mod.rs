//! Credential lookup for the portal login.
//!
//! Credentials come from a [`CredentialStore`]; the CLI uses the environment
//! (optionally seeded from a `.env` file):
//!
//! ```text
//! PORTAL_USERNAME=jdoe
//! PORTAL_PASSWORD=...
//! PORTAL_URL=https://portal.example/Security/Login   # optional
//! PORTAL_BRANCH=307 - SADO DE ORIENTE                 # optional
//! ```

mod env;

pub use env::EnvCredentialStore;

use anyhow::Result;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::config::PortalConfig;

/// Logical keys a store must answer for.
pub const USERNAME_KEY: &str = "username";
pub const PASSWORD_KEY: &str = "password";
pub const URL_KEY: &str = "url";
pub const BRANCH_KEY: &str = "branch";

/// A read-only key-value store for credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Retrieve a credential by logical key.
    ///
    /// Returns `Ok(None)` if the key doesn't exist or is blank.
    async fn get(&self, key: &str) -> Result<Option<SecretString>>;

    /// Where the store reads from, for setup messages.
    fn describe_key(&self, key: &str) -> String {
        key.to_string()
    }
}

/// Everything needed to open an authenticated portal session.
#[derive(Debug)]
pub struct PortalAccess {
    pub username: String,
    pub password: SecretString,
    pub login_url: String,
    pub branch: String,
}

impl PortalAccess {
    /// Resolve access from `store`, falling back to `portal` for the URL and branch.
    ///
    /// Returns `Ok(None)` when the username or password is missing; callers
    /// treat that as a setup problem and stop before launching a browser.
    pub async fn resolve(
        store: &dyn CredentialStore,
        portal: &PortalConfig,
    ) -> Result<Option<Self>> {
        let Some(username) = store.get(USERNAME_KEY).await? else {
            return Ok(None);
        };
        let Some(password) = store.get(PASSWORD_KEY).await? else {
            return Ok(None);
        };

        let login_url = match store.get(URL_KEY).await? {
            Some(url) => url.expose_secret().trim().to_string(),
            None => portal.login_url.clone(),
        };
        let branch = match store.get(BRANCH_KEY).await? {
            Some(branch) => branch.expose_secret().trim().to_string(),
            None => portal.branch.clone(),
        };

        Ok(Some(Self {
            username: username.expose_secret().trim().to_string(),
            password,
            login_url,
            branch,
        }))
    }
}

/// Instructions printed when credentials are missing.
pub fn setup_instructions(store: &dyn CredentialStore) -> String {
    format!(
        "Credentials are not configured.\n\
         Create a .env file (or export variables) with:\n\
         \x20 {}=your_user\n\
         \x20 {}=your_password\n\
         \x20 {}=https://host/RcnVentas/Security/Login   # optional\n\
         \x20 {}=307 - SADO DE ORIENTE                    # optional",
        store.describe_key(USERNAME_KEY),
        store.describe_key(PASSWORD_KEY),
        store.describe_key(URL_KEY),
        store.describe_key(BRANCH_KEY),
    )
}
