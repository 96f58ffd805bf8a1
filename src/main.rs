//! Crashcast - Main Entry Point

use clap::Parser;
use crashcast::cli::{cmd_serve, cmd_train, Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crashcast=info,tower_http=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Train { data, epochs, kfolds, output, policy, model_id, models_dir }) => {
            tokio::task::spawn_blocking(move || {
                cmd_train(&data, epochs, kfolds, &output, policy, model_id.as_deref(), &models_dir)
            })
            .await??;
        }
        Some(Commands::Serve { port, host }) => {
            cmd_serve(host, port).await?;
        }
        None => {
            cmd_serve(None, None).await?;
        }
    }

    Ok(())
}
