//! Command-line front end for the wedding gallery.

mod config;

use api_client::{ApiClient, MediaStore, TransformOptions};
use clap::{Parser, Subcommand};
use crate::config::{AppConfig, AppConfigOverrides};
use std::path::PathBuf;
use std::rc::Rc;
use tokio::task::LocalSet;
use tracing_appender::rolling;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;
use ui::{GalleryApp, Notification, SelectedFile, Severity};

#[derive(Parser)]
#[command(
    name = "wedding-gallery",
    author,
    version,
    about = "Shared wedding photo gallery"
)]
struct Cli {
    /// Override log level (e.g. info, debug)
    #[arg(long)]
    log_level: Option<String>,
    /// Path to config file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Media store cloud name
    #[arg(long)]
    cloud_name: Option<String>,
    /// Unsigned upload preset
    #[arg(long)]
    upload_preset: Option<String>,
    /// Enable tokio console for debugging
    #[arg(long)]
    debug_console: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and print the gallery
    List,
    /// Load the gallery, then fetch it again
    Refresh,
    /// Upload photos to the gallery
    Upload {
        /// Name shown next to the photos
        #[arg(long)]
        name: String,
        /// Title for every photo in the batch
        #[arg(long)]
        title: Option<String>,
        /// Image files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Print the display URL of a photo without contacting the store
    Url {
        /// Remote id of the photo
        remote_id: String,
        /// Full-size URL instead of the thumbnail
        #[arg(long)]
        full: bool,
    },
    /// Show details of one photo
    Show {
        /// Remote id of the photo
        remote_id: String,
    },
    /// Write the effective configuration to the config file
    SaveConfig,
}

fn init_logging(
    cfg: &AppConfig,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>, Box<dyn std::error::Error>> {
    if cfg.debug_console {
        #[cfg(feature = "tokio-console")]
        {
            console_subscriber::init();
            return Ok(None);
        }
        #[cfg(not(feature = "tokio-console"))]
        eprintln!("Debug console requested but the tokio-console feature is disabled");
    }

    std::fs::create_dir_all(&cfg.log_path)?;
    let file_appender = rolling::daily(&cfg.log_path, "wedding-gallery.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(cfg.log_level.clone()))
        .with_writer(std::io::stderr.and(file_writer))
        .init();
    Ok(Some(guard))
}

fn print_notifications(entries: &[Notification]) {
    for n in entries {
        let line = match &n.detail {
            Some(detail) => format!("[{}] {}: {}", n.severity, n.title, detail),
            None => format!("[{}] {}", n.severity, n.title),
        };
        match n.severity {
            Severity::Error => eprintln!("{}", line),
            _ => println!("{}", line),
        }
    }
}

fn print_gallery<S: MediaStore>(app: &GalleryApp<S>) {
    if let Some(banner) = app.load_error() {
        eprintln!("{}", banner);
    }
    println!("{}", app.caption());
    for card in app.cards() {
        let pending = if card.pending { " (pending)" } else { "" };
        println!(
            "{} by {} on {}{}",
            card.title, card.uploader_name, card.date, pending
        );
        if let Some(url) = card.thumbnail_url {
            println!("    {}", url);
        }
    }
}

async fn run(cli: Cli, cfg: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    if let Commands::SaveConfig = cli.command {
        cfg.save_to(cli.config.clone())?;
        println!("Config saved");
        return Ok(());
    }

    let settings = cfg
        .store_settings()
        .ok_or("No cloud name configured. Pass --cloud-name or set WEDDING_GALLERY_CLOUD_NAME.")?;
    let client = ApiClient::new(settings);

    if let Commands::Url { remote_id, full } = &cli.command {
        let options = if *full {
            TransformOptions::full_size()
        } else {
            TransformOptions::thumbnail()
        };
        println!("{}", client.resolve_display_url(remote_id, &options));
        return Ok(());
    }

    let app = GalleryApp::new(Rc::new(client), cfg.gallery_config());
    app.start().await;

    match cli.command {
        Commands::List => print_gallery(&app),
        Commands::Refresh => {
            if app.refresh().await {
                println!("Gallery refreshed");
            }
            print_notifications(&app.notifications().entries());
            print_gallery(&app);
        }
        Commands::Upload { name, title, files } => {
            let mut selected = Vec::with_capacity(files.len());
            for path in &files {
                selected.push(SelectedFile::from_path(path).await?);
            }
            let accepted = app.uploads().select_files(selected);
            if accepted < files.len() {
                println!("Skipped {} file(s) that are not images", files.len() - accepted);
            }
            app.uploads().set_uploader_name(name);
            app.uploads().set_title(title);
            let result = app.submit_upload().await;
            print_notifications(&app.notifications().entries());
            result?;
            print_gallery(&app);
        }
        Commands::Show { remote_id } => {
            if let Some(banner) = app.load_error() {
                return Err(banner.into());
            }
            if !app.focus_photo(&remote_id) {
                println!("Photo not found: {}", remote_id);
                return Ok(());
            }
            if let Some(details) = app.focused_details() {
                let value = serde_json::json!({
                    "title": details.title,
                    "uploader": details.uploader_name,
                    "uploaded": details.date,
                    "url": details.url,
                    "dimensions": details.dimensions,
                    "format": details.format,
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            }
        }
        Commands::Url { .. } | Commands::SaveConfig => {}
    }
    app.shutdown();
    Ok(())
}

#[cfg_attr(feature = "trace-spans", tracing::instrument)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let overrides = AppConfigOverrides {
        log_level: cli.log_level.clone(),
        cloud_name: cli.cloud_name.clone(),
        upload_preset: cli.upload_preset.clone(),
        debug_console: cli.debug_console,
    };
    let cfg = AppConfig::load_from(cli.config.clone()).apply_overrides(&overrides);
    let _guard = init_logging(&cfg)?;

    let local = LocalSet::new();
    local.run_until(run(cli, cfg)).await
}
