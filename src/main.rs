use std::{path::PathBuf, sync::Arc};

use chrono::{Datelike, Utc};
use clap::{Args as ClapArgs, Parser, Subcommand};
use log::info;
use pitwall::{
    Clock, FileScheduleSource, FixedClock, PitwallConfig, PitwallError, SystemClock,
    TimelineDisplay, TimelineState, WeekendView, schedule::parse_utc_timestamp,
};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(ClapArgs, Debug, Clone)]
struct WeekendArgs {
    /// Saved weekend schedule payload (JSON)
    #[arg(short, long)]
    schedule: Option<PathBuf>,

    /// Saved next session payload (JSON)
    #[arg(short = 'n', long)]
    hint: Option<PathBuf>,

    /// IANA timezone used for dates and times
    #[arg(short, long)]
    timezone: Option<String>,

    #[arg(long)]
    season: Option<i32>,

    #[arg(short, long, default_value_t = 1)]
    round: u32,

    /// Config file, defaults to the user's config directory
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the weekend timeline every tick until interrupted
    Watch {
        #[command(flatten)]
        weekend: WeekendArgs,
    },
    /// Print the weekend timeline once
    Status {
        #[command(flatten)]
        weekend: WeekendArgs,

        /// Evaluate at this ISO-8601 instant instead of now
        #[arg(long)]
        at: Option<String>,

        /// Print the state and display snapshot as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write the default config file
    InitConfig {
        /// Where to write it, defaults to the user's config directory
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct StatusSnapshot {
    state: TimelineState,
    display: TimelineDisplay,
}

fn load_config(args: &WeekendArgs) -> Result<PitwallConfig, PitwallError> {
    match &args.config {
        Some(path) => PitwallConfig::from_path(path),
        None => Ok(PitwallConfig::from_local_file()?.unwrap_or_default()),
    }
}

fn build_view(args: &WeekendArgs, clock: Arc<dyn Clock>) -> Result<WeekendView, PitwallError> {
    let config = load_config(args)?;
    let source = FileScheduleSource::new(
        args.schedule.clone(),
        args.hint.clone(),
        args.timezone.clone(),
    );
    let season = args.season.unwrap_or_else(|| Utc::now().year());
    Ok(WeekendView::new(
        Arc::new(source),
        clock,
        config,
        season,
        args.round,
    ))
}

async fn watch(args: &WeekendArgs) -> Result<(), PitwallError> {
    let mut view = build_view(args, Arc::new(SystemClock))?;
    let mut states = view.activate().await?;
    println!("{}", view.display());
    while states.changed().await.is_ok() {
        println!("{}", view.display());
    }
    info!("Timeline stream closed");
    Ok(())
}

async fn status(args: &WeekendArgs, at: Option<&str>, json: bool) -> Result<(), PitwallError> {
    let clock: Arc<dyn Clock> = match at {
        Some(raw) => Arc::new(FixedClock::new(parse_utc_timestamp(raw)?)),
        None => Arc::new(SystemClock),
    };
    let mut view = build_view(args, clock)?;
    view.activate().await?;
    if json {
        let snapshot = StatusSnapshot {
            state: view.state(),
            display: view.display(),
        };
        let body = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| PitwallError::SnapshotSerializeError { source: e })?;
        println!("{}", body);
    } else {
        println!("{}", view.display());
    }
    view.teardown();
    Ok(())
}

fn init_config(path: Option<&PathBuf>) -> Result<(), PitwallError> {
    let config = PitwallConfig::default();
    match path {
        Some(path) => config.save_to(path)?,
        None => config.save()?,
    }
    info!("Default config written");
    Ok(())
}

fn main() {
    colog::init();

    let cli = Args::parse();
    ctrlc::set_handler(move || {
        println!("Exiting...");
        std::process::exit(0);
    })
    .expect("Could not set Ctrl-C handler");

    // the timeline is driven from a single thread
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(|e| PitwallError::RuntimeError { source: e });

    let result = runtime.and_then(|runtime| {
        runtime.block_on(async {
            match &cli.command {
                Commands::Watch { weekend } => watch(weekend).await,
                Commands::Status { weekend, at, json } => {
                    status(weekend, at.as_deref(), *json).await
                }
                Commands::InitConfig { config } => init_config(config.as_ref()),
            }
        })
    });

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
