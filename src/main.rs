mod api;
mod app;
mod config;
mod editor;
mod error;
mod geometry;
mod model;
mod session;
mod worker;

use eframe::egui;
use std::path::PathBuf;

use app::{AnnotatorApp, APP_TITLE};
use config::AnnotatorConfig;

const USAGE: &str = "Usage: ui-annotator [IMAGE] [--server URL] [--config FILE]";

// ── Arguments ───────────────────────────────────────────────────────────────

#[derive(Debug, Default, PartialEq)]
struct Args {
    image: Option<PathBuf>,
    server: Option<String>,
    config: Option<PathBuf>,
    help: bool,
}

fn parse_args<I>(args: I) -> Result<Args, String>
where
    I: IntoIterator<Item = String>,
{
    let mut parsed = Args::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => parsed.help = true,
            "--server" => {
                let url = args.next().ok_or("--server needs a URL")?;
                parsed.server = Some(url);
            }
            "--config" => {
                let path = args.next().ok_or("--config needs a file")?;
                parsed.config = Some(PathBuf::from(path));
            }
            flag if flag.starts_with("--") => return Err(format!("Unknown option {flag}")),
            path => {
                if parsed.image.is_some() {
                    return Err(format!("Unexpected argument {path}"));
                }
                parsed.image = Some(PathBuf::from(path));
            }
        }
    }
    Ok(parsed)
}

// ── Main ────────────────────────────────────────────────────────────────────

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("{msg}\n{USAGE}");
            std::process::exit(2);
        }
    };
    if args.help {
        println!("{USAGE}");
        return;
    }

    let mut config = match &args.config {
        Some(path) => match AnnotatorConfig::load(path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("{}: {err}", path.display());
                std::process::exit(1);
            }
        },
        None => AnnotatorConfig::default(),
    };
    config.apply_env();
    if let Some(url) = args.server {
        config.server_url = url;
    }

    if let Some(path) = &args.image {
        if !path.exists() {
            eprintln!("File not found: {}", path.display());
            std::process::exit(1);
        }
    }

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1400.0, 900.0])
            .with_title(APP_TITLE),
        ..Default::default()
    };

    let startup_image = args.image;
    let result = eframe::run_native(
        APP_TITLE,
        options,
        Box::new(
            move |cc| -> Result<Box<dyn eframe::App>, Box<dyn std::error::Error + Send + Sync>> {
                let app = AnnotatorApp::new(cc, config, startup_image)?;
                Ok(Box::new(app))
            },
        ),
    );
    if let Err(err) = result {
        log::error!("{err}");
        eprintln!("Failed to run {APP_TITLE}: {err}");
        std::process::exit(1);
    }
}
