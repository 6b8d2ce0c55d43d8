use std::io::Write;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use dotenvy::dotenv;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

mod config;
mod credentials;
mod download;
mod handlers;
mod intake;
mod llm;
mod prompt;
mod state;
mod training;
mod utils;
mod wizard;

use config::CONFIG;
use credentials::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
use handlers::app::{App, AppSettings, Flow, TrainingOutcome};
use handlers::render::render_progress;
use llm::GeminiImageClient;
use utils::logging::init_logging;
use wizard::Wizard;

#[derive(Debug, Default, PartialEq, Eq)]
struct CliArgs {
    ephemeral_key: bool,
    help: bool,
}

fn usage() -> &'static str {
    "Usage: nanatwin [--ephemeral-key]\n\n  --ephemeral-key   Keep the API key in memory only; nothing is written to disk\n  -h, --help        Show this message"
}

fn parse_args(args: &[String]) -> Result<CliArgs> {
    let mut parsed = CliArgs::default();
    for arg in args.iter().skip(1) {
        match arg.as_str() {
            "--ephemeral-key" => parsed.ephemeral_key = true,
            "--help" | "-h" => parsed.help = true,
            other => return Err(anyhow!("Unknown argument: {other}\n{}", usage())),
        }
    }
    Ok(parsed)
}

fn print_block(text: &str) {
    if !text.is_empty() {
        println!("{text}");
    }
}

fn print_prompt(label: &str) {
    print!("{label}");
    let _ = std::io::stdout().flush();
}

async fn run_training(app: &mut App) -> Result<()> {
    let cancel = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", err);
            std::future::pending::<()>().await;
        }
    };
    let outcome = app
        .run_training(cancel, |progress| {
            print!("\r{}", render_progress(progress));
            let _ = std::io::stdout().flush();
        })
        .await?;
    println!();
    match outcome {
        TrainingOutcome::Completed => println!("Training complete.\n"),
        TrainingOutcome::Cancelled => println!("Training cancelled. Starting over.\n"),
    }
    print_block(&app.screen());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    let cli = parse_args(&args)?;
    if cli.help {
        println!("{}", usage());
        return Ok(());
    }

    let _guards = init_logging(&CONFIG);
    info!("Starting NanaTwin");

    let credentials: Arc<dyn CredentialStore> = if cli.ephemeral_key {
        info!("Using in-memory credential storage");
        Arc::new(MemoryCredentialStore::default())
    } else {
        let store = FileCredentialStore::new(&CONFIG.storage_dir);
        info!("Using credential file {}", store.path().display());
        Arc::new(store)
    };
    let generator = Arc::new(GeminiImageClient::from_config(&CONFIG));
    info!("Image model: {}", generator.model());

    let wizard = Wizard::new(credentials, generator)?;
    let mut app = App::new(wizard, AppSettings::from_config(&CONFIG));

    print_block(&app.screen());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        if app.needs_training() {
            run_training(&mut app).await?;
            continue;
        }

        print_prompt(app.prompt_label());
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };

        let reply = app.handle_line(&line).await;
        print_block(&reply.text);
        if reply.flow == Flow::Quit {
            break;
        }
    }

    info!("NanaTwin stopped on {}", app.wizard().step());
    Ok(())
}
