use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use momo_sync::RunRequest;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "momo")]
#[command(about = "Channel video statistics collector")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Harvest from the start year through the current year.
    Collect {
        #[arg(long)]
        start_year: Option<i32>,
    },
    /// Dump the top-level comments of one video.
    Comments { video_id: String },
    /// Run collection on the configured cron schedule until Ctrl-C.
    Schedule,
    /// Serve the HTTP invocation endpoint.
    Serve,
}

fn check_start_year(start_year: Option<i32>) -> Result<()> {
    RunRequest { start_year }.validate()
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Collect { start_year: None }) {
        Commands::Collect { start_year } => {
            check_start_year(start_year)?;
            let response = momo_sync::run_collect_once_from_env(start_year).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
            if !response.is_success() {
                std::process::exit(1);
            }
        }
        Commands::Comments { video_id } => {
            let collected = momo_sync::collect_comments_from_env(&video_id).await?;
            info!(
                video_id = %collected.video_id,
                comments = collected.comments,
                "comment collection finished"
            );
            if collected.json.is_none() && collected.csv.is_none() {
                bail!("no comment files were written for {video_id}");
            }
        }
        Commands::Schedule => momo_sync::run_scheduler_from_env().await?,
        Commands::Serve => momo_web::serve_from_env().await?,
    }

    Ok(())
}
