//! In-memory doubles shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use crate::api::{
    ApiError, FOLLOWS_SCOPE, FollowPage, Game, HelixApi, Stream, TokenGrant, TokenInfo, User,
};
use crate::media::process::shell;
use crate::media::{PlaybackProcess, StreamTool, ToolError};

pub const ACCOUNT: &str = "viewer";

#[derive(Default)]
struct FakeState {
    users: Vec<User>,
    streams: HashMap<String, Stream>,
    games: Vec<Game>,
    follow_pages: Vec<Vec<String>>,
    valid_tokens: HashSet<String>,
    token_scopes: HashMap<String, Vec<String>>,
    calls: HashMap<&'static str, usize>,
    fail_streams: bool,
}

/**
    Fake upstream API. Tokens are only accepted while they are in the valid
    set, so tests can expire credentials and watch the broker recover.
*/
pub struct FakeHelix {
    state: Mutex<FakeState>,
    issued: AtomicUsize,
    secret: bool,
}

impl FakeHelix {
    pub fn new() -> Self {
        let fake = Self {
            state: Mutex::new(FakeState::default()),
            issued: AtomicUsize::new(0),
            secret: true,
        };
        fake.add_user("1", ACCOUNT, "Viewer");
        fake
    }

    pub fn without_secret() -> Self {
        Self {
            secret: false,
            ..Self::new()
        }
    }

    pub fn add_user(&self, id: &str, login: &str, display_name: &str) {
        self.state.lock().unwrap().users.push(User {
            id: id.into(),
            login: login.into(),
            display_name: display_name.into(),
            profile_image_url: format!("https://cdn.example/{login}.png"),
        });
    }

    pub fn add_game(&self, id: &str, name: &str) {
        self.state.lock().unwrap().games.push(Game {
            id: id.into(),
            name: name.into(),
            box_art_url: format!("https://cdn.example/boxart/{id}-{{width}}x{{height}}.jpg"),
        });
    }

    pub fn set_live(&self, user_id: &str, broadcast_id: &str, game_id: &str) {
        let mut state = self.state.lock().unwrap();
        let login = state
            .users
            .iter()
            .find(|u| u.id == user_id)
            .map(|u| u.login.clone())
            .unwrap_or_default();
        let game_name = state
            .games
            .iter()
            .find(|g| g.id == game_id)
            .map(|g| g.name.clone())
            .unwrap_or_default();
        state.streams.insert(
            user_id.into(),
            Stream {
                id: broadcast_id.into(),
                user_id: user_id.into(),
                user_login: login,
                game_id: game_id.into(),
                game_name,
                title: format!("broadcast {broadcast_id}"),
                started_at: Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap(),
            },
        );
    }

    pub fn set_offline(&self, user_id: &str) {
        self.state.lock().unwrap().streams.remove(user_id);
    }

    pub fn set_follow_pages(&self, pages: Vec<Vec<&str>>) {
        self.state.lock().unwrap().follow_pages = pages
            .into_iter()
            .map(|p| p.into_iter().map(String::from).collect())
            .collect();
    }

    pub fn set_fail_streams(&self, fail: bool) {
        self.state.lock().unwrap().fail_streams = fail;
    }

    /// Make a token acceptable, e.g. a statically configured one.
    pub fn accept_token(&self, token: &str, scopes: &[&str]) {
        let mut state = self.state.lock().unwrap();
        state.valid_tokens.insert(token.into());
        state
            .token_scopes
            .insert(token.into(), scopes.iter().map(|s| s.to_string()).collect());
    }

    /// Reject every token issued so far.
    pub fn expire_tokens(&self) {
        self.state.lock().unwrap().valid_tokens.clear();
    }

    pub fn calls(&self, name: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    fn record(&self, name: &'static str) {
        *self.state.lock().unwrap().calls.entry(name).or_default() += 1;
    }

    fn check(&self, token: &str) -> Result<(), ApiError> {
        if token.is_empty() {
            return Err(ApiError::MissingToken);
        }
        if self.state.lock().unwrap().valid_tokens.contains(token) {
            Ok(())
        } else {
            Err(ApiError::Unauthorized("Invalid OAuth token".into()))
        }
    }

    fn issue(&self, prefix: &str, scopes: &[&str]) -> TokenGrant {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let token = format!("{prefix}-token-{n}");
        self.accept_token(&token, scopes);
        TokenGrant {
            access_token: token,
            refresh_token: (!scopes.is_empty()).then(|| format!("{prefix}-refresh-{n}")),
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[async_trait]
impl HelixApi for FakeHelix {
    async fn users_by_login(&self, token: &str, logins: &[String]) -> Result<Vec<User>, ApiError> {
        self.record("users_by_login");
        self.check(token)?;
        let state = self.state.lock().unwrap();
        Ok(state
            .users
            .iter()
            .filter(|u| logins.iter().any(|l| l.eq_ignore_ascii_case(&u.login)))
            .cloned()
            .collect())
    }

    async fn streams_by_user_id(
        &self,
        token: &str,
        user_ids: &[String],
    ) -> Result<Vec<Stream>, ApiError> {
        self.record("streams_by_user_id");
        self.check(token)?;
        let state = self.state.lock().unwrap();
        if state.fail_streams {
            return Err(ApiError::Status {
                status: 503,
                body: "upstream unavailable".into(),
            });
        }
        Ok(user_ids
            .iter()
            .filter_map(|id| state.streams.get(id).cloned())
            .collect())
    }

    async fn games_by_id(&self, token: &str, game_ids: &[String]) -> Result<Vec<Game>, ApiError> {
        self.record("games_by_id");
        self.check(token)?;
        let state = self.state.lock().unwrap();
        Ok(state
            .games
            .iter()
            .filter(|g| game_ids.contains(&g.id))
            .cloned()
            .collect())
    }

    async fn followed_channels(
        &self,
        token: &str,
        _user_id: &str,
        after: Option<&str>,
    ) -> Result<FollowPage, ApiError> {
        self.record("followed_channels");
        self.check(token)?;
        let state = self.state.lock().unwrap();
        if !state
            .token_scopes
            .get(token)
            .is_some_and(|s| s.iter().any(|s| s == FOLLOWS_SCOPE))
        {
            return Err(ApiError::Unauthorized(format!("Missing scope: {FOLLOWS_SCOPE}")));
        }

        let index = after
            .and_then(|c| c.strip_prefix("page-"))
            .and_then(|n| n.parse::<usize>().ok())
            .unwrap_or(0);
        let logins = state.follow_pages.get(index).cloned().unwrap_or_default();
        let cursor = if index + 1 < state.follow_pages.len() {
            Some(format!("page-{}", index + 1))
        } else {
            None
        };
        Ok(FollowPage { logins, cursor })
    }

    async fn client_credentials(&self) -> Result<TokenGrant, ApiError> {
        self.record("client_credentials");
        if !self.secret {
            return Err(ApiError::Unauthorized("no client secret configured".into()));
        }
        Ok(self.issue("app", &[]))
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, ApiError> {
        self.record("refresh_token");
        if !refresh_token.starts_with("user-refresh-") {
            return Err(ApiError::Status {
                status: 400,
                body: "Invalid refresh token".into(),
            });
        }
        Ok(self.issue("user", &[FOLLOWS_SCOPE]))
    }

    async fn authorization_code(
        &self,
        code: &str,
        _redirect_uri: &str,
    ) -> Result<TokenGrant, ApiError> {
        self.record("authorization_code");
        if code != "good-code" {
            return Err(ApiError::Status {
                status: 400,
                body: "Invalid authorization code".into(),
            });
        }
        Ok(self.issue("user", &[FOLLOWS_SCOPE]))
    }

    async fn validate(&self, token: &str) -> Result<TokenInfo, ApiError> {
        self.record("validate");
        self.check(token)?;
        let state = self.state.lock().unwrap();
        Ok(TokenInfo {
            scopes: state.token_scopes.get(token).cloned().unwrap_or_default(),
        })
    }

    fn authorize_url(&self, redirect_uri: &str, _scopes: &[&str]) -> String {
        format!("https://auth.example/authorize?redirect_uri={redirect_uri}")
    }

    fn has_client_secret(&self) -> bool {
        self.secret
    }
}

/**
    Stream tool whose resolutions are counted and whose playback runs a
    shell script. Resolution sleeps briefly so concurrent callers overlap.
*/
pub struct ScriptedTool {
    script: String,
    resolutions: AtomicUsize,
    playbacks: AtomicUsize,
    fail_resolve: bool,
}

impl ScriptedTool {
    pub fn new(script: &str) -> Self {
        Self {
            script: script.into(),
            resolutions: AtomicUsize::new(0),
            playbacks: AtomicUsize::new(0),
            fail_resolve: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_resolve: true,
            ..Self::new("true")
        }
    }

    pub fn resolutions(&self) -> usize {
        self.resolutions.load(Ordering::SeqCst)
    }

    pub fn playbacks(&self) -> usize {
        self.playbacks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamTool for ScriptedTool {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn resolve_url(&self, address: &str) -> Result<String, ToolError> {
        let n = self.resolutions.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(Duration::from_millis(20)).await;
        if self.fail_resolve {
            return Err(ToolError::NoUrl(self.name().into()));
        }
        Ok(format!("https://video.example/{address}/{n}.m3u8"))
    }

    fn start_playback(&self, _url: &str) -> Result<PlaybackProcess, ToolError> {
        self.playbacks.fetch_add(1, Ordering::SeqCst);
        PlaybackProcess::spawn(shell(&self.script), self.name()).map_err(|source| ToolError::Spawn {
            program: "sh".into(),
            source,
        })
    }
}
