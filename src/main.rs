use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use spamfence::config::Config;
use spamfence::init::setup_logging;
use spamfence::{HttpSource, SpamFilter};

#[derive(Parser, Debug)]
#[command(name = "spamfence")]
#[command(author, version, about = "Regex-blacklist spam filter with remote blacklist sync")]
struct Args {
    /// Path to config file
    #[arg(short, long, value_name = "FILE", default_value = "spamfence.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check text against the blacklists (reads stdin when omitted)
    Check { text: Option<String> },

    /// Check a URL against the blacklists
    CheckUrl { url: String },

    /// Print the local blacklist version
    Version,

    /// Sync blacklists from the remote source
    Update {
        /// Refetch even when local and remote versions match
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = if args.config.exists() {
        Config::load(&args.config).await?
    } else {
        Config::default()
    };

    setup_logging(&config);
    if !args.config.exists() {
        info!("Config file not found, using defaults.");
    }

    let source = Arc::new(
        HttpSource::new(&config.update.source_url, &config.update.user_agent)
            .context("Failed to create update source")?,
    );
    let filter = SpamFilter::new(&config, source);

    match args.command {
        Command::Check { text } => {
            filter.reload().context("Failed to load blacklists")?;
            let text = match text {
                Some(t) => t,
                None => {
                    let mut buf = String::new();
                    std::io::stdin()
                        .read_to_string(&mut buf)
                        .context("Failed to read stdin")?;
                    buf
                }
            };
            report(filter.check_text(&text));
        }
        Command::CheckUrl { url } => {
            filter.reload().context("Failed to load blacklists")?;
            report(filter.check_url(&url));
        }
        Command::Version => match filter.current_version() {
            Some(v) => println!("{v}"),
            None => println!("(unversioned)"),
        },
        Command::Update { force } => {
            let version = filter.update(force).await?;
            println!("{version}");
        }
    }

    Ok(())
}

fn report(result: spamfence::MatchResult) {
    match result.matched() {
        Some(hit) => {
            println!("spam: {hit}");
            std::process::exit(1);
        }
        None => println!("clean"),
    }
}
