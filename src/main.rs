use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

mod admin;
mod config;
mod content;
mod core;
mod panel;
mod render;

use crate::admin::AdminContext;
use crate::config::{ContentMode, FrameConfig, LaunchOptions, OutputMode};
use crate::content::photos::{self, PhotoSource};
use crate::content::weather::{self, SensorSpec, WeatherSource};
use crate::core::scheduler::{RefreshScheduler, SystemClock};
use crate::core::signals::{self, ReloadFlag, Shutdown};
use crate::core::supervisor::Supervisor;
use crate::panel::png::PngPanel;
use crate::panel::raw::RawPanel;
use crate::panel::{PanelDriver, Throttled};
use crate::render::plugins::text::TextRenderer;
use crate::render::{Layout, Renderer};

#[derive(Parser, Debug)]
#[command(name = "inkframe", about = "E-ink photo and weather frame")]
struct Args {
    /// Content to show: photo or weather
    #[arg(long, default_value = "photo")]
    mode: ContentMode,

    /// Settings file, re-read on every reload
    #[arg(long, default_value = ".env")]
    env_file: PathBuf,

    /// Panel width in pixels
    #[arg(long, default_value_t = 800)]
    width: u32,

    /// Panel height in pixels
    #[arg(long, default_value_t = 480)]
    height: u32,

    /// Output mode: png, raw
    #[arg(long, default_value = "png")]
    output: OutputMode,

    /// Output file (png) or device node (raw)
    #[arg(long, default_value = "frame.png")]
    output_path: PathBuf,

    /// TrueType font; the system DejaVu font or the built-in font otherwise
    #[arg(long)]
    font: Option<PathBuf>,

    /// HTTP port for the album picker page, 0 to disable
    #[arg(long, default_value_t = 5000)]
    admin_port: u16,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

/// One-shot Google Photos checks; without one the frame runs
#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Print the albums visible to the token file
    ListAlbums,
    /// Load the token file and list albums once, exit non-zero on failure
    TestAuth,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        "inkframe v{} starting ({}x{}, {:?} mode, {:?} output)",
        env!("CARGO_PKG_VERSION"),
        args.width,
        args.height,
        args.mode,
        args.output
    );

    let launch = LaunchOptions {
        mode: args.mode,
        env_file: args.env_file,
        width: args.width,
        height: args.height,
        output: args.output,
        output_path: args.output_path,
        font: args.font,
        admin_port: args.admin_port,
    };
    let config = FrameConfig::load(&launch).context("Invalid configuration")?;

    if let Some(command) = args.command {
        return run_command(command, &config).await;
    }

    let reload = ReloadFlag::new();
    let (shutdown_tx, shutdown) = Shutdown::channel();
    signals::listen_for_shutdown(shutdown_tx);

    // Album picker page in background
    let admin_handle = (launch.admin_port != 0).then(|| {
        let ctx = Arc::new(AdminContext {
            env_file: launch.env_file.clone(),
            credentials_file: config.photos.credentials_file.clone(),
            reload: reload.clone(),
        });
        let port = launch.admin_port;
        tokio::spawn(async move {
            if let Err(e) = admin::server::run(port, ctx).await {
                error!("Admin page error: {:#}", e);
            }
        })
    });

    let table = weather::default_table();
    let layout = match launch.mode {
        ContentMode::Photo => Layout::Photo,
        ContentMode::Weather => Layout::Sensors(weather::sensor_rows(&table)),
    };
    let text = TextRenderer::load(launch.font.as_deref());
    let renderer = Renderer::new(launch.width, launch.height, layout, text);

    let result = match launch.output {
        OutputMode::Png => {
            let panel = PngPanel::new(launch.output_path.clone(), launch.width, launch.height);
            run_frame(panel, renderer, config, table, reload, shutdown).await
        }
        OutputMode::Raw => {
            let panel = RawPanel::new(launch.output_path.clone(), launch.width, launch.height);
            run_frame(panel, renderer, config, table, reload, shutdown).await
        }
    };

    if let Some(handle) = admin_handle {
        handle.abort();
    }
    if let Err(e) = &result {
        error!("Fatal: {:#}", e);
    }
    info!("inkframe shutdown");
    result
}

async fn run_command(command: Command, config: &FrameConfig) -> Result<()> {
    let mut source = PhotoSource::new(
        &config.photos,
        (config.launch.width, config.launch.height),
        config.scheduler.fetch_timeout,
    );
    source
        .load_access_token()
        .await
        .context("Authentication failed")?;

    match command {
        Command::TestAuth => {
            println!("Authentication successful!");
            let albums = source.list_albums().await.context("Album listing failed")?;
            println!("Found {} albums", albums.len());
        }
        Command::ListAlbums => {
            let albums = source.list_albums().await.context("Album listing failed")?;
            if albums.is_empty() {
                println!("No albums found.");
            } else {
                println!("Available Google Photos albums:");
                print!("{}", photos::describe_albums(&albums));
            }
        }
    }
    Ok(())
}

async fn run_frame<P: PanelDriver>(
    panel: P,
    renderer: Renderer,
    config: FrameConfig,
    table: Vec<SensorSpec>,
    reload: ReloadFlag,
    shutdown: Shutdown,
) -> Result<()> {
    let (width, height) = renderer.size();
    let photo_size = renderer.photo_size().unwrap_or((width, height));

    let panel = Throttled::new(panel, config.scheduler.panel_min_refresh);
    let scheduler = RefreshScheduler::new(config.scheduler.clone(), panel, renderer, SystemClock);

    let launch = config.launch.clone();
    let mode = launch.mode;
    let supervisor = Supervisor::new(
        scheduler,
        config,
        move || FrameConfig::load(&launch),
        reload,
        shutdown,
    );

    match mode {
        ContentMode::Photo => {
            supervisor
                .run(|cfg| PhotoSource::new(&cfg.photos, photo_size, cfg.scheduler.fetch_timeout))
                .await
        }
        ContentMode::Weather => {
            supervisor
                .run(|cfg| {
                    WeatherSource::new(&cfg.home_assistant, table.clone(), cfg.scheduler.fetch_timeout)
                })
                .await
        }
    }
}
