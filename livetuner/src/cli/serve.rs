use std::net::SocketAddr;

use anyhow::Result;
use clap::Parser;
use tokio::{signal, sync::watch};
use tracing::{error, info};

use crate::channel::UpdateMode;
use crate::server::AppState;

use super::TunerConfig;

#[derive(Parser, Debug)]
pub struct ServeCommand {
    /// HTTP server port
    #[arg(short, long, env = "PORT", default_value = "22708")]
    pub port: u16,

    #[command(flatten)]
    pub config: TunerConfig,
}

impl ServeCommand {
    pub async fn run(self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let tuner = self.config.build(shutdown_rx.clone())?;
        let state = AppState {
            catalog: tuner.catalog.clone(),
            proxy: tuner.proxy,
            broker: tuner.broker,
            guide: self.config.guide_options(),
            custom_domain: self.config.custom_domain.clone(),
        };

        // Start HTTP server before the first catalog refresh completes.
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let server_handle = tokio::spawn(async move {
            if let Err(e) = crate::server::run_server(addr, state, shutdown_rx).await {
                error!(error = %e, "server failed");
            }
        });

        {
            let catalog = tuner.catalog.clone();
            tokio::spawn(async move {
                let channels = catalog
                    .update(UpdateMode::RETRIEVE | UpdateMode::STATUS)
                    .await;
                let live = channels.iter().filter(|c| c.is_live()).count();
                info!(channels = channels.len(), live, "initial catalog loaded");
            });
        }

        signal::ctrl_c().await?;
        info!("shutting down");
        let _ = shutdown_tx.send(true);
        let _ = server_handle.await;

        Ok(())
    }
}
