//! camera_probe - list connected cameras and suggest `[camera]` settings.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::IsTerminal;

use detect_halt::ingest::{list_cameras, CameraInfo, CameraKind};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about = "List cameras usable by detect_halt")]
struct Args {
    /// Number of /dev/videoN indices to probe.
    #[arg(long, default_value_t = 5)]
    count: u32,

    /// Print the device list as JSON.
    #[arg(long)]
    json: bool,

    /// UI mode for stderr progress (auto|plain|pretty).
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let ui = ui::Ui::from_flag(&args.ui, std::io::stderr().is_terminal());

    let cameras = ui.step("Probe video devices", || Ok(list_cameras(args.count)))?;

    if args.json {
        let rows: Vec<_> = cameras.iter().map(camera_json).collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if cameras.is_empty() {
        return Err(anyhow!(
            "no video devices found on /dev/video0..{}",
            args.count.saturating_sub(1)
        ));
    }

    for camera in &cameras {
        println!(
            "[{}] {}  card={}  driver={}  capture={}  kind={}",
            camera.index,
            camera.path,
            camera.card.as_deref().unwrap_or("?"),
            camera.driver.as_deref().unwrap_or("?"),
            if camera.can_capture { "yes" } else { "no" },
            camera.kind
        );
    }

    match cameras.iter().find(|camera| camera.can_capture) {
        Some(camera) => {
            println!();
            println!("Recommended settings:");
            println!("[camera]");
            println!("index = {}", camera.index);
            if camera.kind != CameraKind::for_index(camera.index) {
                println!("kind = \"{}\"", camera.kind);
            }
        }
        None => log::warn!("no capture-capable camera found"),
    }
    Ok(())
}

fn camera_json(camera: &CameraInfo) -> serde_json::Value {
    serde_json::json!({
        "index": camera.index,
        "path": camera.path,
        "card": camera.card,
        "driver": camera.driver,
        "can_capture": camera.can_capture,
        "kind": camera.kind.to_string(),
    })
}
