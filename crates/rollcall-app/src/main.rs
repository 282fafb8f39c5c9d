use anyhow::Result;
use clap::{Parser, Subcommand};
use rollcall_hw::Camera;
use rollcall_store::{NewStudent, RosterStore};
use std::path::PathBuf;
use tokio::io::AsyncBufReadExt;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod config;
mod engine;
mod loader;

use config::Config;

#[derive(Parser)]
#[command(name = "rollcall", about = "Student attendance tracking via face recognition")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the recognition loop
    Run {
        /// Start with recognition enabled instead of waiting for `toggle`
        #[arg(long)]
        recognize: bool,
    },
    /// Register a new student
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        course: String,
        #[arg(long)]
        cohort: String,
        /// Photo file to register
        #[arg(long, conflicts_with = "capture")]
        photo: Option<String>,
        /// Capture the photo from the camera instead
        #[arg(long)]
        capture: bool,
    },
    /// List registered students
    Roster,
    /// Capture a single photo from the camera
    Capture {
        /// Output file (default: a fresh name under the photo directory)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// List camera devices
    Devices,
    /// Show configuration and roster status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Commands::Run { recognize } => run(&config, recognize).await,
        Commands::Register {
            name,
            course,
            cohort,
            photo,
            capture,
        } => register(&config, name, course, cohort, photo, capture),
        Commands::Roster => roster(&config),
        Commands::Capture { output } => {
            let path = capture_photo(&config, output)?;
            println!("{}", path.display());
            Ok(())
        }
        Commands::Devices => {
            devices();
            Ok(())
        }
        Commands::Status => status(&config),
    }
}

/// The recognition loop plus its control surface: one line per command on
/// stdin, mirroring the buttons of a desktop front-end.
async fn run(config: &Config, recognize: bool) -> Result<()> {
    let handle = engine::spawn_engine(config, recognize)?;

    println!("commands: toggle | present | not-present | absent | quit");
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match line.trim() {
                    "" => {}
                    "toggle" => {
                        let on = handle.toggle().await?;
                        println!("recognition {}", if on { "on" } else { "off" });
                    }
                    "present" => print_names("Present students", handle.present().await?),
                    "not-present" => {
                        print_names("Students not present today", handle.not_present().await?)
                    }
                    "absent" => print_names("Absent students", handle.absent().await?),
                    "quit" => break,
                    other => println!("unknown command: {other}"),
                }
            }
        }
    }

    tracing::info!("shutting down");
    Ok(())
}

fn print_names(title: &str, names: Vec<String>) {
    println!("{title}:");
    if names.is_empty() {
        println!("  (none)");
    }
    for name in names {
        println!("  {name}");
    }
}

fn register(
    config: &Config,
    name: String,
    course: String,
    cohort: String,
    photo: Option<String>,
    capture: bool,
) -> Result<()> {
    let photo_path = match photo {
        Some(path) => path,
        None if capture => capture_photo(config, None)?.to_string_lossy().into_owned(),
        None => anyhow::bail!("provide --photo <path> or --capture"),
    };

    let mut store = RosterStore::load(&config.roster_path)?;
    let student = store.register(NewStudent {
        name,
        course,
        cohort,
        photo_path,
    })?;
    println!("registered {} (id {})", student.name, student.id);
    Ok(())
}

fn roster(config: &Config) -> Result<()> {
    let store = RosterStore::load(&config.roster_path)?;
    if store.is_empty() {
        println!("no students registered");
        return Ok(());
    }
    for student in store.students() {
        println!(
            "{:>4}  {:<24} {:<10} {:<8} {}",
            student.id, student.name, student.course, student.cohort, student.photo_path
        );
    }
    Ok(())
}

/// Grab one frame from the camera and save it as a JPEG.
fn capture_photo(config: &Config, output: Option<PathBuf>) -> Result<PathBuf> {
    let camera = Camera::open(&config.camera_device())?;
    let frame = camera.capture_frame()?;

    let path = match output {
        Some(path) => path,
        None => {
            std::fs::create_dir_all(&config.photo_dir)?;
            config.photo_dir.join(format!("{}.jpg", Uuid::new_v4()))
        }
    };
    engine::save_frame_jpeg(&frame, &path)?;
    Ok(path)
}

fn devices() {
    let devices = Camera::list_devices();
    if devices.is_empty() {
        println!("no capture devices found");
        return;
    }
    for dev in devices {
        println!("{}  {} ({})", dev.path, dev.name, dev.driver);
    }
}

fn status(config: &Config) -> Result<()> {
    let store = RosterStore::load(&config.roster_path)?;
    let status = serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "camera": config.camera_device(),
        "roster": config.roster_path,
        "registered_students": store.len(),
        "attendance_dir": config.attendance_dir,
        "detector_model": config.detector_model_path(),
        "encoder_model": config.encoder_model_path(),
        "match_threshold": config.match_threshold,
        "tick_ms": config.tick_ms,
        "exit_after_misses": config.exit_after_misses,
    });
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
