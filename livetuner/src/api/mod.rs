pub mod client;
pub mod error;
pub mod types;

use async_trait::async_trait;

pub use client::HelixClient;
pub use error::ApiError;
pub use types::{FollowPage, Game, Stream, TokenGrant, TokenInfo, User};

/// Maximum number of ids accepted by a single lookup call.
pub const MAX_IDS_PER_CALL: usize = 100;

/// Scope needed to list the channels an account follows.
pub const FOLLOWS_SCOPE: &str = "user:read:follows";

/**
    The subset of the upstream Helix API used by the tuner.

    Every data call takes the bearer token explicitly. Token ownership lives
    in [`crate::auth::CredentialBroker`], never in the client.
*/
#[async_trait]
pub trait HelixApi: Send + Sync {
    async fn users_by_login(&self, token: &str, logins: &[String]) -> Result<Vec<User>, ApiError>;

    async fn streams_by_user_id(
        &self,
        token: &str,
        user_ids: &[String],
    ) -> Result<Vec<Stream>, ApiError>;

    async fn games_by_id(&self, token: &str, game_ids: &[String]) -> Result<Vec<Game>, ApiError>;

    async fn followed_channels(
        &self,
        token: &str,
        user_id: &str,
        after: Option<&str>,
    ) -> Result<FollowPage, ApiError>;

    async fn client_credentials(&self) -> Result<TokenGrant, ApiError>;

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, ApiError>;

    async fn authorization_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenGrant, ApiError>;

    async fn validate(&self, token: &str) -> Result<TokenInfo, ApiError>;

    /// Browser URL that starts the authorization-code flow.
    fn authorize_url(&self, redirect_uri: &str, scopes: &[&str]) -> String;

    /// Whether app-level client-credential exchange is possible.
    fn has_client_secret(&self) -> bool;
}
