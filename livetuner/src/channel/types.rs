use chrono::{DateTime, Utc};

use crate::api::{Stream, User};

/// Box art shown whenever a channel has no live game art.
pub const OFFLINE_ART_URL: &str = "https://static-cdn.jtvnw.net/ttv-static/404_boxart-272x380.jpg";

/// Game id of the upstream "Just Chatting" category.
pub const JUST_CHATTING_GAME_ID: &str = "509658";

pub const BOX_ART_WIDTH: u32 = 272;
pub const BOX_ART_HEIGHT: u32 = 380;

/// A live session of a channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Broadcast {
    /// Upstream broadcast id; changes every time the channel goes live.
    pub id: String,
    /// Login the channel is broadcasting under right now.
    pub login: String,
    pub game_id: String,
    pub game_name: String,
    pub title: String,
    pub started_at: DateTime<Utc>,
    pub game_art_url: Option<String>,
}

impl Broadcast {
    pub fn from_stream(stream: Stream, game_art_url: Option<String>) -> Self {
        Self {
            id: stream.id,
            login: stream.user_login,
            game_id: stream.game_id,
            game_name: stream.game_name,
            title: stream.title,
            started_at: stream.started_at,
            game_art_url,
        }
    }
}

/**
    A followed channel, presented to the client as a tuner channel.

    Live-only data lives in `broadcast`, so an offline channel cannot carry
    a stale broadcast id, title or start time.
*/
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    /// Upstream user id, doubling as the channel number.
    pub id: String,
    pub display_name: String,
    pub login: String,
    pub profile_image_url: String,
    pub broadcast: Option<Broadcast>,
}

impl Channel {
    pub fn from_user(user: User) -> Self {
        Self {
            id: user.id,
            display_name: user.display_name,
            login: user.login,
            profile_image_url: user.profile_image_url,
            broadcast: None,
        }
    }

    pub fn is_live(&self) -> bool {
        self.broadcast.is_some()
    }

    pub fn broadcast_id(&self) -> Option<&str> {
        self.broadcast.as_ref().map(|b| b.id.as_str())
    }

    pub fn game_art_url(&self) -> &str {
        self.broadcast
            .as_ref()
            .and_then(|b| b.game_art_url.as_deref())
            .unwrap_or(OFFLINE_ART_URL)
    }

    pub fn is_just_chatting(&self) -> bool {
        self.broadcast
            .as_ref()
            .is_some_and(|b| b.game_id == JUST_CHATTING_GAME_ID)
    }

    /// Public address handed to the resolver tool.
    pub fn address(&self) -> String {
        let login = self
            .broadcast
            .as_ref()
            .map(|b| b.login.as_str())
            .filter(|l| !l.is_empty())
            .unwrap_or(&self.login);
        format!("twitch.tv/{login}")
    }
}

/**
    Which parts of the catalog an update touches. Combine with `|`.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateMode(u8);

impl UpdateMode {
    /// Return the catalog as is.
    pub const NONE: Self = Self(0);
    /// Replace the channel list with the current follow list.
    pub const RETRIEVE: Self = Self(1);
    /// Refresh live state of every channel.
    pub const STATUS: Self = Self(1 << 1);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }
}

impl std::ops::BitOr for UpdateMode {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Outcome of a single-channel live check.
#[derive(Debug, Clone)]
pub enum LiveCheck {
    /// Fresh state straight from upstream.
    Checked(Channel),
    /// The channel is not in the catalog.
    Unknown,
    /// Upstream could not be asked; the catalog is unchanged.
    Unavailable(Channel),
}
