//! Gardener CLI.
//!
//! Runs one pass of the PR gardener for a CI event: opens improvement pull
//! requests through a coding agent, iterates on review feedback and hands
//! pull requests to a human once they reach the iteration ceiling.

use std::path::PathBuf;
use std::process;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};

use gardener::core::event::{CategoryChoice, Event};
use gardener::exit_codes;
use gardener::io::agent::CliAgent;
use gardener::io::ci::CiEnv;
use gardener::io::config::{DEFAULT_CONFIG_FILE, load_config, render_config, write_config};
use gardener::io::git::Git;
use gardener::io::github::GhHosting;
use gardener::logging;
use gardener::open_pr::open_pull_request;
use gardener::orchestrator::Orchestrator;
use gardener::select::TaskSelector;

#[derive(Parser)]
#[command(
    name = "gardener",
    version,
    about = "Automated code-improvement pull requests with bounded review cycles"
)]
struct Cli {
    /// Config file, relative to the checkout root.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Checkout root (defaults to `GITHUB_WORKSPACE`, then the current directory).
    #[arg(long, global = true)]
    workdir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Handle one CI event (`workflow_dispatch`, `pull_request_review`, `push`).
    Run {
        #[arg(default_value = "workflow_dispatch")]
        event: String,

        /// Category for manual triggers, or `auto`.
        #[arg(long, default_value = "auto")]
        category: String,
    },
    /// Select the next task and write it as step outputs without running an agent.
    Select {
        #[arg(long, default_value = "auto")]
        category: String,
    },
    /// Commit the checkout's changes and open a pull request for them.
    OpenPr {
        #[arg(long)]
        category: String,
    },
    /// Print the effective configuration as TOML.
    Config {
        /// Write it to the config file instead (creates one with defaults).
        #[arg(long)]
        write: bool,
    },
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            process::exit(exit_codes::INVALID);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let ci = CiEnv::from_process();
    let workdir = ci.workdir(cli.workdir.as_deref());
    let config_path = workdir.join(&cli.config);
    let config = load_config(&config_path);

    match cli.command {
        Command::Config { write: true } => {
            write_config(&config_path, &config)?;
            println!("Wrote {}", config_path.display());
            Ok(exit_codes::OK)
        }
        Command::Config { write: false } => {
            print!("{}", render_config(&config)?);
            Ok(exit_codes::OK)
        }
        Command::Run { event, category } => {
            let payload = ci.load_payload()?;
            let event = Event::from_payload(&event, &payload, CategoryChoice::parse(&category))?;
            let hosting = GhHosting::new(ci.repository.clone());
            let agent = CliAgent::new(Git::new(&workdir), &config.agent);
            let outcome = Orchestrator::new(&config, &hosting, &agent).run(&event)?;
            println!("{}", outcome.status_line());
            ci.output_sink().write(&outcome.outputs(&config.labels.base))?;
            Ok(outcome.exit_code())
        }
        Command::Select { category } => {
            let hosting = GhHosting::new(ci.repository.clone());
            let outcome =
                TaskSelector::new(&config, &hosting).run(&CategoryChoice::parse(&category))?;
            println!("{}", outcome.status_line());
            ci.output_sink().write(&outcome.outputs(&config.labels.base))?;
            Ok(exit_codes::OK)
        }
        Command::OpenPr { category } => {
            let hosting = GhHosting::new(ci.repository.clone());
            let outcome =
                open_pull_request(&config, &hosting, &Git::new(&workdir), &category, Utc::now())?;
            println!("{}", outcome.status_line());
            ci.output_sink().write(&outcome.outputs())?;
            Ok(exit_codes::OK)
        }
    }
}
