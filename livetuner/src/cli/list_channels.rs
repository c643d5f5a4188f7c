use anyhow::Result;
use clap::Parser;
use tokio::sync::watch;

use crate::channel::UpdateMode;

use super::TunerConfig;

#[derive(Parser, Debug)]
pub struct ListChannelsCommand {
    #[command(flatten)]
    pub config: TunerConfig,
}

impl ListChannelsCommand {
    pub async fn run(self) -> Result<()> {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let tuner = self.config.build(shutdown_rx)?;
        let channels = tuner
            .catalog
            .update(UpdateMode::RETRIEVE | UpdateMode::STATUS)
            .await;

        println!("{} channels:", channels.len());
        for channel in &channels {
            match &channel.broadcast {
                Some(b) => println!(
                    "  {:>12}  {} (live: {}, {})",
                    channel.id, channel.display_name, b.game_name, b.title
                ),
                None => println!("  {:>12}  {} (offline)", channel.id, channel.display_name),
            }
        }
        Ok(())
    }
}
