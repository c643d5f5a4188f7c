use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::api::{ApiError, FOLLOWS_SCOPE, HelixApi, TokenGrant};

use super::credential::Credential;

/// Static settings the broker needs besides the API client.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Account whose own user record proves a token works.
    pub username: String,
    /// Pre-issued access token, tried before any exchange.
    pub static_token: Option<String>,
}

/**
    Owns the upstream bearer credential.

    All upstream calls go through [`CredentialBroker::invoke`], which acquires
    a token when none is held and, on an auth-shaped failure, refreshes once
    and retries once. Refreshes are serialized; a request that lost the race
    reuses the credential the winner installed.
*/
pub struct CredentialBroker {
    api: Arc<dyn HelixApi>,
    config: BrokerConfig,
    credential: RwLock<Credential>,
    refresh_lock: Mutex<()>,
}

impl CredentialBroker {
    pub fn new(api: Arc<dyn HelixApi>, config: BrokerConfig) -> Self {
        Self {
            api,
            config: BrokerConfig {
                static_token: config.static_token.filter(|t| !t.is_empty()),
                ..config
            },
            credential: RwLock::new(Credential::default()),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn api(&self) -> &Arc<dyn HelixApi> {
        &self.api
    }

    pub fn username(&self) -> &str {
        &self.config.username
    }

    pub fn current(&self) -> Credential {
        self.credential
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.credential
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .has_scope(scope)
    }

    /**
        Run `action` against the upstream API with the current token.

        Returns `None` when no result could be obtained this time; the
        failure has already been logged under `name`.
    */
    pub async fn invoke<T, F, Fut>(&self, name: &str, action: F) -> Option<T>
    where
        F: Fn(Arc<dyn HelixApi>, String) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut credential = self.current();
        if credential.is_empty() {
            if !self.refresh(credential.generation).await {
                error!(action = name, "no upstream credential available");
                return None;
            }
            credential = self.current();
        }

        // First attempt, refresh allowed.
        let err = match action(Arc::clone(&self.api), credential.access_token).await {
            Ok(value) => return Some(value),
            Err(err) => err,
        };

        if !err.is_auth() {
            error!(action = name, error = %err, "upstream call failed");
            return None;
        }

        warn!(action = name, error = %err, "upstream rejected credential, refreshing");
        if !self.refresh(credential.generation).await {
            error!(action = name, "credential refresh failed, giving up");
            return None;
        }

        // Second and last attempt, no further refresh.
        let retry = self.current();
        match action(Arc::clone(&self.api), retry.access_token).await {
            Ok(value) => Some(value),
            Err(err) => {
                error!(action = name, error = %err, "upstream call failed after refresh");
                None
            }
        }
    }

    /**
        Replace the credential whose generation was `seen_generation`.

        Returns `true` when a usable credential is installed afterwards,
        either by this call or by a concurrent one that got there first.
    */
    pub async fn refresh(&self, seen_generation: u64) -> bool {
        let _guard = self.refresh_lock.lock().await;

        let current = self.current();
        if current.generation != seen_generation && !current.is_empty() {
            debug!(
                generation = current.generation,
                "credential already refreshed by another request"
            );
            return true;
        }

        match self.acquire(&current).await {
            Some(credential) => {
                self.install(credential);
                true
            }
            None => false,
        }
    }

    /**
        Install a user grant from the authorization-code flow.
    */
    pub async fn install_user_grant(&self, grant: TokenGrant) -> bool {
        let _guard = self.refresh_lock.lock().await;

        match self.verified(Credential::from_grant(grant)).await {
            Some(credential) => {
                self.install(credential);
                true
            }
            None => false,
        }
    }

    async fn acquire(&self, rejected: &Credential) -> Option<Credential> {
        if let Some(refresh_token) = rejected.refresh_token.as_deref()
            && rejected.can_refresh_user(FOLLOWS_SCOPE)
        {
            info!("refreshing user access token");
            match self.api.refresh_token(refresh_token).await {
                Ok(grant) => {
                    if let Some(credential) = self.verified(Credential::from_grant(grant)).await {
                        return Some(credential);
                    }
                }
                Err(err) => warn!(error = %err, "user token refresh failed"),
            }
        }

        if let Some(token) = self.config.static_token.as_deref()
            && token != rejected.access_token
        {
            info!("trying configured access token");
            match self.api.validate(token).await {
                Ok(info) => {
                    let credential = Credential {
                        access_token: token.to_string(),
                        scopes: info.scopes.into_iter().collect(),
                        ..Credential::default()
                    };
                    if let Some(credential) = self.verified(credential).await {
                        return Some(credential);
                    }
                }
                Err(err) => warn!(error = %err, "configured access token is not valid"),
            }
        }

        if self.api.has_client_secret() {
            info!("requesting app access token via client credentials");
            match self.api.client_credentials().await {
                Ok(grant) => {
                    if let Some(credential) = self.verified(Credential::from_grant(grant)).await {
                        return Some(credential);
                    }
                }
                Err(err) => error!(error = %err, "client credentials exchange failed"),
            }
        }

        None
    }

    /// Accept a candidate only if it can look up the configured account.
    async fn verified(&self, credential: Credential) -> Option<Credential> {
        let username = self.config.username.clone();
        match self
            .api
            .users_by_login(&credential.access_token, std::slice::from_ref(&username))
            .await
        {
            Ok(users) if !users.is_empty() => {
                info!(user = %username, "new access token verified");
                Some(credential)
            }
            Ok(_) => {
                error!(user = %username, "new access token cannot see the configured account");
                None
            }
            Err(err) => {
                error!(user = %username, error = %err, "new access token failed verification");
                None
            }
        }
    }

    fn install(&self, mut credential: Credential) {
        let mut slot = self
            .credential
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        credential.generation = slot.generation + 1;
        *slot = credential;
    }
}
