use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Response, Url};
use serde::de::DeserializeOwned;

use super::HelixApi;
use super::error::ApiError;
use super::types::{DataResponse, Follow, FollowPage, Game, Stream, TokenGrant, TokenInfo, User};

const API_BASE: &str = "https://api.twitch.tv/helix";
const AUTH_BASE: &str = "https://id.twitch.tv/oauth2";
const PAGE_SIZE: &str = "100";

/**
    Helix REST client backed by `reqwest`.
*/
pub struct HelixClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: Option<String>,
    api_base: String,
    auth_base: String,
}

impl HelixClient {
    pub fn new(client_id: impl Into<String>, client_secret: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self {
            http,
            client_id: client_id.into(),
            client_secret: client_secret.filter(|s| !s.is_empty()),
            api_base: API_BASE.to_string(),
            auth_base: AUTH_BASE.to_string(),
        }
    }

    async fn get_data<T: DeserializeOwned>(
        &self,
        token: &str,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<DataResponse<T>, ApiError> {
        if token.is_empty() {
            return Err(ApiError::MissingToken);
        }

        let response = self
            .http
            .get(format!("{}/{}", self.api_base, path))
            .query(query)
            .header("Client-Id", &self.client_id)
            .bearer_auth(token)
            .send()
            .await?;

        decode(response).await
    }

    async fn exchange(&self, params: &[(&str, &str)]) -> Result<TokenGrant, ApiError> {
        let response = self
            .http
            .post(format!("{}/token", self.auth_base))
            .form(params)
            .send()
            .await?;

        let grant: TokenGrant = decode(response).await?;
        if grant.access_token.is_empty() {
            return Err(ApiError::Decode("token response without access_token".into()));
        }
        Ok(grant)
    }

    fn secret(&self) -> Result<&str, ApiError> {
        self.client_secret
            .as_deref()
            .ok_or_else(|| ApiError::Unauthorized("no client secret configured".into()))
    }
}

#[async_trait]
impl HelixApi for HelixClient {
    async fn users_by_login(&self, token: &str, logins: &[String]) -> Result<Vec<User>, ApiError> {
        let query: Vec<(&str, &str)> = logins.iter().map(|l| ("login", l.as_str())).collect();
        Ok(self.get_data::<User>(token, "users", &query).await?.data)
    }

    async fn streams_by_user_id(
        &self,
        token: &str,
        user_ids: &[String],
    ) -> Result<Vec<Stream>, ApiError> {
        let mut query: Vec<(&str, &str)> =
            user_ids.iter().map(|id| ("user_id", id.as_str())).collect();
        query.push(("first", PAGE_SIZE));
        Ok(self.get_data::<Stream>(token, "streams", &query).await?.data)
    }

    async fn games_by_id(&self, token: &str, game_ids: &[String]) -> Result<Vec<Game>, ApiError> {
        let query: Vec<(&str, &str)> = game_ids.iter().map(|id| ("id", id.as_str())).collect();
        Ok(self.get_data::<Game>(token, "games", &query).await?.data)
    }

    async fn followed_channels(
        &self,
        token: &str,
        user_id: &str,
        after: Option<&str>,
    ) -> Result<FollowPage, ApiError> {
        let mut query = vec![("user_id", user_id), ("first", PAGE_SIZE)];
        if let Some(cursor) = after {
            query.push(("after", cursor));
        }

        let page: DataResponse<Follow> = self.get_data(token, "channels/followed", &query).await?;
        Ok(FollowPage {
            logins: page
                .data
                .into_iter()
                .map(|f| f.broadcaster_login)
                .collect(),
            cursor: page.pagination.and_then(|p| p.cursor),
        })
    }

    async fn client_credentials(&self) -> Result<TokenGrant, ApiError> {
        let secret = self.secret()?;
        self.exchange(&[
            ("client_id", self.client_id.as_str()),
            ("client_secret", secret),
            ("grant_type", "client_credentials"),
        ])
        .await
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, ApiError> {
        let secret = self.secret()?;
        self.exchange(&[
            ("client_id", self.client_id.as_str()),
            ("client_secret", secret),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    async fn authorization_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenGrant, ApiError> {
        let secret = self.secret()?;
        self.exchange(&[
            ("client_id", self.client_id.as_str()),
            ("client_secret", secret),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ])
        .await
    }

    async fn validate(&self, token: &str) -> Result<TokenInfo, ApiError> {
        if token.is_empty() {
            return Err(ApiError::MissingToken);
        }

        let response = self
            .http
            .get(format!("{}/validate", self.auth_base))
            .header(reqwest::header::AUTHORIZATION, format!("OAuth {token}"))
            .send()
            .await?;

        decode(response).await
    }

    fn authorize_url(&self, redirect_uri: &str, scopes: &[&str]) -> String {
        let base = format!("{}/authorize", self.auth_base);
        let scope = scopes.join(" ");
        let params = [
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("response_type", "code"),
            ("scope", scope.as_str()),
        ];

        match Url::parse_with_params(&base, &params) {
            Ok(url) => url.to_string(),
            Err(_) => base,
        }
    }

    fn has_client_secret(&self) -> bool {
        self.client_secret.is_some()
    }
}

/// Map the response status onto [`ApiError`] and decode the JSON body.
async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let status = response.status();
    if status.is_success() {
        let body = response.bytes().await?;
        return serde_json::from_slice(&body).map_err(|e| ApiError::Decode(e.to_string()));
    }

    let body = response.text().await.unwrap_or_default();
    Err(match status.as_u16() {
        401 => ApiError::Unauthorized(body),
        403 => ApiError::Forbidden(body),
        code => ApiError::Status { status: code, body },
    })
}
