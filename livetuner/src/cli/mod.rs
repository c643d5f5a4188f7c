use anyhow::Result;
use clap::{Parser, Subcommand};

mod config;
mod list_channels;
mod serve;

pub use config::TunerConfig;
pub use list_channels::ListChannelsCommand;
pub use serve::ServeCommand;

#[derive(Parser, Debug)]
#[command(name = "livetuner")]
#[command(about = "Network tuner that serves followed live channels to DVR clients")]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the tuner HTTP server (default)
    Serve(ServeCommand),
    /// Refresh the catalog once, print it and exit
    ListChannels(ListChannelsCommand),
}

impl Args {
    pub async fn run(self) -> Result<()> {
        let command = match self.command {
            Some(command) => command,
            // No subcommand: serve with options taken from the environment.
            None => Command::Serve(ServeCommand::try_parse_from(["serve"]).unwrap_or_else(|e| e.exit())),
        };

        match command {
            Command::Serve(cmd) => cmd.run().await,
            Command::ListChannels(cmd) => cmd.run().await,
        }
    }
}
