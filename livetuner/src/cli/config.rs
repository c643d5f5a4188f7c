use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::{ArgAction, Args};
use clap::builder::BoolishValueParser;
use tokio::sync::watch;

use crate::api::HelixClient;
use crate::auth::{BrokerConfig, CredentialBroker};
use crate::channel::ChannelCatalog;
use crate::media::{CommandTool, DEFAULT_EXIT_GRACE, ResolutionCache, StreamProxy, ToolKind};
use crate::server::GuideOptions;

/// Upstream credentials, channel selection and external tools.
#[derive(Args, Debug, Clone)]
pub struct TunerConfig {
    /// Application client id
    #[arg(long, env = "CLIENT_ID")]
    pub client_id: String,

    /// Application client secret
    #[arg(long, env = "CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Pre-issued user access token
    #[arg(long, env = "ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// Account whose follows make up the lineup
    #[arg(long, env = "TWITCH_USERNAME")]
    pub username: String,

    /// Explicit channel logins, bypassing the follow list
    #[arg(long, env = "CHANNELS_FOLLOWED", value_delimiter = ',')]
    pub channels_followed: Vec<String>,

    /// Tool used to resolve stream URLs
    #[arg(long, env = "STREAM_UTILITY", value_enum, ignore_case = true, default_value = "streamlink")]
    pub stream_utility: ToolKind,

    /// Tool used to play resolved streams
    #[arg(long, env = "PLAYER_UTILITY", value_enum, ignore_case = true, default_value = "youtube-dl")]
    pub player_utility: ToolKind,

    /// Use the profile image as the guide icon for "Just Chatting" broadcasts.
    /// Accepts true/false, yes/no, on/off and 1/0 in any case.
    #[arg(
        long,
        env = "USE_PROFILE_AS_JUST_CHATTING",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new(),
        num_args = 0..=1,
        require_equals = true,
        default_value = "false",
        default_missing_value = "true"
    )]
    pub use_profile_as_just_chatting: bool,

    /// Public base URL for the OAuth redirect, e.g. https://tuner.example.com
    #[arg(long, env = "CUSTOM_DOMAIN")]
    pub custom_domain: Option<String>,

    #[arg(long, env = "YOUTUBE_DL_BIN", default_value = "youtube-dl")]
    pub youtube_dl_bin: String,

    #[arg(long, env = "STREAMLINK_BIN", default_value = "streamlink")]
    pub streamlink_bin: String,

    /// Seconds a player gets to exit after its stream ends
    #[arg(long, env = "EXIT_GRACE_SECS", default_value_t = DEFAULT_EXIT_GRACE.as_secs())]
    pub exit_grace_secs: u64,
}

/// The wired-up core components.
pub struct Tuner {
    pub broker: Arc<CredentialBroker>,
    pub catalog: Arc<ChannelCatalog>,
    pub proxy: Arc<StreamProxy>,
}

impl TunerConfig {
    pub fn validate(&self) -> Result<()> {
        let has_secret = self.client_secret.as_deref().is_some_and(|s| !s.is_empty());
        let has_token = self.access_token.as_deref().is_some_and(|t| !t.is_empty());
        if !has_secret && !has_token {
            bail!("either CLIENT_SECRET or ACCESS_TOKEN must be set");
        }
        Ok(())
    }

    pub fn guide_options(&self) -> GuideOptions {
        GuideOptions {
            profile_as_just_chatting: self.use_profile_as_just_chatting,
        }
    }

    fn tool(&self, kind: ToolKind) -> CommandTool {
        let program = match kind {
            ToolKind::YoutubeDl => &self.youtube_dl_bin,
            ToolKind::Streamlink => &self.streamlink_bin,
        };
        CommandTool::new(kind, program)
    }

    /// Wire the components. Open streams stop once `shutdown` turns true.
    pub fn build(&self, shutdown: watch::Receiver<bool>) -> Result<Tuner> {
        self.validate()?;

        let api = Arc::new(HelixClient::new(
            self.client_id.clone(),
            self.client_secret.clone(),
        ));
        let broker = Arc::new(CredentialBroker::new(
            api,
            BrokerConfig {
                username: self.username.clone(),
                static_token: self.access_token.clone(),
            },
        ));
        let cache = Arc::new(ResolutionCache::new());
        let catalog = Arc::new(ChannelCatalog::new(
            Arc::clone(&broker),
            Arc::clone(&cache),
            self.channels_followed.clone(),
        ));
        let proxy = Arc::new(StreamProxy::new(
            Arc::clone(&catalog),
            cache,
            Arc::new(self.tool(self.stream_utility)),
            Arc::new(self.tool(self.player_utility)),
            Duration::from_secs(self.exit_grace_secs),
            shutdown,
        ));

        Ok(Tuner {
            broker,
            catalog,
            proxy,
        })
    }
}
