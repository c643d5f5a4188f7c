use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Envelope used by every Helix data endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct DataResponse<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Pagination {
    #[serde(default)]
    pub cursor: Option<String>,
}

/// An upstream user account.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct User {
    pub id: String,
    pub login: String,
    pub display_name: String,
    #[serde(default)]
    pub profile_image_url: String,
}

/// A live stream as reported by the streams endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Stream {
    pub id: String,
    pub user_id: String,
    pub user_login: String,
    #[serde(default)]
    pub game_id: String,
    #[serde(default)]
    pub game_name: String,
    #[serde(default)]
    pub title: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Game {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub box_art_url: String,
}

impl Game {
    /// Box art with the size placeholders filled in.
    pub fn box_art(&self, width: u32, height: u32) -> Option<String> {
        if self.box_art_url.is_empty() {
            return None;
        }
        Some(
            self.box_art_url
                .replace("{width}", &width.to_string())
                .replace("{height}", &height.to_string()),
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Follow {
    pub broadcaster_login: String,
}

/// One page of the followed-channels listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FollowPage {
    pub logins: Vec<String>,
    /// Cursor for the next page; `None` or empty when this was the last one.
    pub cursor: Option<String>,
}

impl FollowPage {
    pub fn next_cursor(&self) -> Option<&str> {
        self.cursor.as_deref().filter(|c| !c.is_empty())
    }
}

/// Result of an OAuth token exchange.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default, rename = "scope")]
    pub scopes: Vec<String>,
}

/// Result of token introspection.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TokenInfo {
    #[serde(default)]
    pub scopes: Vec<String>,
}
