use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use futures::future::join_all;
use tracing::{debug, error, info, warn};

use crate::api::{FOLLOWS_SCOPE, Game, MAX_IDS_PER_CALL, User};
use crate::auth::CredentialBroker;
use crate::media::ResolutionCache;

use super::types::{BOX_ART_HEIGHT, BOX_ART_WIDTH, Broadcast, Channel, LiveCheck, UpdateMode};

/**
    In-memory catalog of followed channels and their live state.

    Upstream lookups run without holding the lock; results are applied
    under a single write, so readers see either the old or the new state
    of a refresh and never a half-replaced list.
*/
pub struct ChannelCatalog {
    broker: Arc<CredentialBroker>,
    cache: Arc<ResolutionCache>,
    channels_followed: Vec<String>,
    channels: RwLock<Vec<Channel>>,
}

impl ChannelCatalog {
    pub fn new(
        broker: Arc<CredentialBroker>,
        cache: Arc<ResolutionCache>,
        channels_followed: Vec<String>,
    ) -> Self {
        Self {
            broker,
            cache,
            channels_followed: channels_followed
                .into_iter()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
            channels: RwLock::new(Vec::new()),
        }
    }

    pub fn snapshot(&self) -> Vec<Channel> {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn get(&self, id: &str) -> Option<Channel> {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }

    /**
        Run the requested refresh steps and return the resulting catalog.
    */
    pub async fn update(&self, mode: UpdateMode) -> Vec<Channel> {
        if mode.contains(UpdateMode::RETRIEVE) {
            self.retrieve().await;
        }

        if mode.contains(UpdateMode::STATUS) {
            self.refresh_status().await;
        }

        self.snapshot()
    }

    /**
        Replace the channel list with the current follow list.

        Returns `false` and leaves the catalog untouched when the list could
        not be resolved.
    */
    pub async fn retrieve(&self) -> bool {
        let logins = if self.channels_followed.is_empty() {
            match self.followed_logins().await {
                Some(logins) => logins,
                None => return false,
            }
        } else {
            info!(
                channels = %self.channels_followed.join(", "),
                "using followed channels from configuration"
            );
            self.channels_followed.clone()
        };

        let Some(users) = self.lookup_users(&logins).await else {
            error!("failed to translate follows into users, keeping previous catalog");
            return false;
        };

        info!(
            follows = logins.len(),
            channels = users.len(),
            "translated follows into channels"
        );

        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        let mut previous: HashMap<String, Option<Broadcast>> = channels
            .drain(..)
            .map(|c| (c.id, c.broadcast))
            .collect();
        *channels = users
            .into_iter()
            .map(|user| {
                let mut channel = Channel::from_user(user);
                channel.broadcast = previous.remove(&channel.id).flatten();
                channel
            })
            .collect();

        true
    }

    /**
        Refresh the live state of every channel without changing membership.

        Returns `false` if any batch could not be checked; those channels keep
        their previous state.
    */
    pub async fn refresh_status(&self) -> bool {
        let snapshot = self.snapshot();
        let ids: Vec<String> = snapshot.iter().map(|c| c.id.clone()).collect();
        let seen: HashMap<&str, Option<&str>> = snapshot
            .iter()
            .map(|c| (c.id.as_str(), c.broadcast_id()))
            .collect();
        if ids.is_empty() {
            warn!("asked to update channel statuses, but the catalog is empty");
            return true;
        }

        let batches = join_all(ids.chunks(MAX_IDS_PER_CALL).map(|batch| async move {
            self.fetch_broadcasts(batch)
                .await
                .map(|live| (batch.to_vec(), live))
        }))
        .await;

        let mut checked = HashMap::new();
        let mut live = HashMap::new();
        let mut complete = true;
        for batch in batches {
            match batch {
                Some((ids, broadcasts)) => {
                    checked.extend(ids.into_iter().map(|id| {
                        let broadcast_id = seen.get(id.as_str()).copied().flatten().map(String::from);
                        (id, broadcast_id)
                    }));
                    live.extend(broadcasts);
                }
                None => complete = false,
            }
        }

        debug!(
            checked = checked.len(),
            live = live.len(),
            "channel statuses fetched"
        );
        self.apply(&checked, live);
        complete
    }

    /**
        Refresh the live state of a single channel.

        Used right before serving a stream, when guide data may be hours old.
    */
    pub async fn update_live_status(&self, id: &str) -> LiveCheck {
        let Some(mut channel) = self.get(id) else {
            return LiveCheck::Unknown;
        };

        let Some(live) = self.fetch_broadcasts(std::slice::from_ref(&channel.id)).await else {
            return LiveCheck::Unavailable(channel);
        };

        let checked = HashMap::from([(
            channel.id.clone(),
            channel.broadcast_id().map(String::from),
        )]);
        channel.broadcast = live.get(&channel.id).cloned();
        self.apply(&checked, live);

        LiveCheck::Checked(channel)
    }

    /// Store fetched live state. `checked` maps each fetched channel to the
    /// broadcast it had when the fetch started; channels changed since then
    /// already hold newer data and are left alone.
    fn apply(&self, checked: &HashMap<String, Option<String>>, mut live: HashMap<String, Broadcast>) {
        let mut ended = Vec::new();
        {
            let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
            for channel in channels.iter_mut() {
                let Some(seen) = checked.get(&channel.id) else {
                    continue;
                };
                if channel.broadcast_id() != seen.as_deref() {
                    debug!(
                        channel = %channel.display_name,
                        "live state changed during fetch, keeping newer state"
                    );
                    continue;
                }
                let next = live.remove(&channel.id);
                if let Some(previous) = &channel.broadcast
                    && next.as_ref().map(|b| &b.id) != Some(&previous.id)
                {
                    ended.push((channel.display_name.clone(), previous.id.clone()));
                }
                channel.broadcast = next;
            }
        }

        for (name, broadcast_id) in ended {
            info!(channel = %name, broadcast = %broadcast_id, "broadcast ended");
            self.cache.remove(&broadcast_id);
        }
    }

    /// Live broadcasts for up to [`MAX_IDS_PER_CALL`] user ids, keyed by user id.
    async fn fetch_broadcasts(&self, user_ids: &[String]) -> Option<HashMap<String, Broadcast>> {
        let streams = self
            .broker
            .invoke("streams_by_user_id", |api, token| {
                let user_ids = user_ids.to_vec();
                async move { api.streams_by_user_id(&token, &user_ids).await }
            })
            .await?;

        let mut game_ids: Vec<String> = streams
            .iter()
            .map(|s| s.game_id.clone())
            .filter(|id| !id.is_empty())
            .collect();
        game_ids.sort();
        game_ids.dedup();

        let art = if game_ids.is_empty() {
            HashMap::new()
        } else {
            self.fetch_box_art(&game_ids).await
        };

        Some(
            streams
                .into_iter()
                .map(|stream| {
                    let game_art_url = art.get(&stream.game_id).cloned();
                    (stream.user_id.clone(), Broadcast::from_stream(stream, game_art_url))
                })
                .collect(),
        )
    }

    /// Box art per game id. Missing art only costs the placeholder.
    async fn fetch_box_art(&self, game_ids: &[String]) -> HashMap<String, String> {
        let games: Vec<Game> = self
            .broker
            .invoke("games_by_id", |api, token| {
                let game_ids = game_ids.to_vec();
                async move { api.games_by_id(&token, &game_ids).await }
            })
            .await
            .unwrap_or_default();

        games
            .into_iter()
            .filter_map(|game| {
                let url = game.box_art(BOX_ART_WIDTH, BOX_ART_HEIGHT)?;
                Some((game.id, url))
            })
            .collect()
    }

    async fn followed_logins(&self) -> Option<Vec<String>> {
        let username = self.broker.username().to_string();
        let account = self
            .broker
            .invoke("users_by_login", |api, token| {
                let logins = vec![username.clone()];
                async move { api.users_by_login(&token, &logins).await }
            })
            .await
            .and_then(|users| users.into_iter().next());

        let Some(account) = account else {
            error!(user = %username, "unable to find upstream account");
            return None;
        };

        if !self.broker.has_scope(FOLLOWS_SCOPE) {
            warn!(
                scope = FOLLOWS_SCOPE,
                "listing followed channels needs a user token; visit /authorize or set CHANNELS_FOLLOWED"
            );
            return None;
        }

        let mut logins = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let after = cursor.take();
            let page = self
                .broker
                .invoke("followed_channels", |api, token| {
                    let user_id = account.id.clone();
                    let after = after.clone();
                    async move {
                        api.followed_channels(&token, &user_id, after.as_deref())
                            .await
                    }
                })
                .await?;

            logins.extend(page.logins.iter().cloned());
            match page.next_cursor() {
                Some(next) => cursor = Some(next.to_string()),
                None => break,
            }
        }

        info!(
            user = %account.display_name,
            count = logins.len(),
            "found followed channels"
        );
        Some(logins)
    }

    async fn lookup_users(&self, logins: &[String]) -> Option<Vec<User>> {
        let batches = join_all(logins.chunks(MAX_IDS_PER_CALL).map(|batch| {
            self.broker.invoke("users_by_login", move |api, token| {
                let batch = batch.to_vec();
                async move { api.users_by_login(&token, &batch).await }
            })
        }))
        .await;

        let batches: Option<Vec<Vec<User>>> = batches.into_iter().collect();
        Some(batches?.into_iter().flatten().collect())
    }
}
