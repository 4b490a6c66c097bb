//! CLI entry point for imgfetch.

use anyhow::Result;
use clap::Parser;
use imgfetch::classify::{self, LinkKind, Source};
use imgfetch::diff::UpdateMode;
use imgfetch::run::{RunConfig, Runner};
use tracing::{debug, info};

mod cli;

use cli::{Args, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    match args.command {
        Command::Img {
            url,
            update,
            update_all,
            concurrency,
        } => {
            // Mode validation happens before any network activity.
            let mode = UpdateMode::from_flags(update, update_all)?;

            let mut config = RunConfig::from_home()?;
            config.width = usize::from(concurrency);
            config.mode = mode;

            let runner = Runner::new(config);

            if classify::item_source(&url).is_some() {
                runner.run_single(&url).await?;
            } else if classify::is_valid(&url, Source::Yande, LinkKind::Artist) {
                runner.run_artist(&url).await?;
            } else {
                anyhow::bail!("unsupported url: {url}");
            }

            info!("run complete");
        }
    }

    Ok(())
}
