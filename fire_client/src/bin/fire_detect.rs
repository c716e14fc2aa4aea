//! Fire detection client binary.
//!
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use env_logger::TimestampPrecision;
use fire_client::{
    client::{Endpoint, Submitter},
    sensors::{CaptureSession, DeviceProvider},
    surface::Surface,
};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[clap(author, version)]
struct Args {
    /// Address of the fire detection service
    #[clap(long, default_value = "localhost:5000")]
    address: String,

    /// Video device used for captures
    #[clap(long, default_value = "/dev/video0")]
    device: String,

    /// Pixel format requested from the camera (MJPG, YUYV or RGB3)
    #[clap(long)]
    format: Option<String>,

    /// Camera resolution as WIDTHxHEIGHT, the largest supported one by default
    #[clap(long, value_parser = parse_resolution)]
    resolution: Option<(u32, u32)>,

    /// Camera frames per second, the highest supported rate by default
    #[clap(long)]
    frame_rate: Option<u32>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Detect fire on an image file
    Detect {
        file: PathBuf,

        /// Save the annotated result image to this path
        #[clap(long)]
        save_result: Option<PathBuf>,
    },
    /// Capture a camera frame and detect fire on it
    Capture {
        /// Save the annotated result image to this path
        #[clap(long)]
        save_result: Option<PathBuf>,
    },
    /// Show the URL of the live detection feed
    Live,
    /// List past detections of the service
    History,
    /// Interactive session
    Session,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::builder()
        .format_timestamp(Some(TimestampPrecision::Millis))
        .init();

    let submitter = Submitter::new(Endpoint::new(&args.address));
    let camera = CaptureSession::new(camera_provider(&args)?);
    let mut surface = Surface::new(submitter, camera);

    match args.command {
        Command::Detect { file, save_result } => {
            surface.select_file(&file).await?;
            surface.submit_selected().await?;
            print!("{surface}");
            save_result_image(&surface, save_result.as_deref()).await?;
        }
        Command::Capture { save_result } => {
            surface.start_camera();
            if let Some(alert) = surface.take_alert() {
                return Err(anyhow!(alert));
            }
            let detected = surface.capture_and_detect().await;
            surface.stop_camera();
            detected?;
            print!("{surface}");
            save_result_image(&surface, save_result.as_deref()).await?;
        }
        Command::Live => {
            surface.toggle_live_feed();
            print!("{surface}");
        }
        Command::History => {
            for entry in surface.submitter().history().await? {
                println!("{} {}", entry.timestamp, entry.image);
                for prediction in entry.prediction {
                    println!("  {} - {}%", prediction.class, prediction.confidence);
                }
            }
        }
        Command::Session => run_session(&mut surface).await?,
    }

    Ok(())
}

#[cfg(target_os = "linux")]
fn camera_provider(args: &Args) -> Result<Box<dyn DeviceProvider>> {
    use fire_client::sensors::{PixelFormat, V4lProvider};

    let mut provider = V4lProvider::new(&args.device);
    if let Some(format) = &args.format {
        let format = PixelFormat::from_fourcc(format.as_bytes())
            .ok_or_else(|| anyhow!("Unsupported pixel format {format}"))?;
        provider = provider.with_format(format);
    }
    if let Some(resolution) = args.resolution {
        provider = provider.with_resolution(resolution);
    }
    if let Some(frame_rate) = args.frame_rate {
        provider = provider.with_frame_rate((1, frame_rate));
    }

    Ok(Box::new(provider))
}

#[cfg(not(target_os = "linux"))]
fn camera_provider(args: &Args) -> Result<Box<dyn DeviceProvider>> {
    log::warn!("No video backend, camera {} is unavailable", args.device);
    Ok(Box::new(fire_client::sensors::NoDevice))
}

fn parse_resolution(value: &str) -> Result<(u32, u32), String> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {value}"))?;
    let width = width.trim().parse().map_err(|err| format!("width: {err}"))?;
    let height = height.trim().parse().map_err(|err| format!("height: {err}"))?;
    Ok((width, height))
}

async fn save_result_image(surface: &Surface, path: Option<&Path>) -> Result<()> {
    if let (Some(path), Some(result)) = (path, surface.result()) {
        let saved = surface
            .submitter()
            .download_result_image(result, path)
            .await
            .map_err(|err| anyhow!(err))?;
        if !saved {
            log::warn!("No result image to save");
        }
    }
    Ok(())
}

const SESSION_HELP: &str =
    "Commands: camera | capture | file <path> | submit | live | show | help | quit";

/// Drive the surface from commands read on stdin.
async fn run_session(surface: &mut Surface) -> Result<()> {
    println!("{SESSION_HELP}");
    print!("{surface}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));

        let outcome = match command {
            "camera" => {
                surface.toggle_camera();
                Ok(())
            }
            "capture" => surface.capture_and_detect().await.map(|_| ()),
            "file" if !rest.trim().is_empty() => surface.select_file(rest.trim()).await,
            "submit" => surface.submit_selected().await.map(|_| ()),
            "live" => {
                surface.toggle_live_feed();
                Ok(())
            }
            "show" | "" => Ok(()),
            "quit" | "exit" => break,
            _ => {
                println!("{SESSION_HELP}");
                continue;
            }
        };

        if let Some(alert) = surface.take_alert() {
            eprintln!("{alert}");
        }
        if let Err(err) = outcome {
            eprintln!("{err}");
        }
        print!("{surface}");
    }

    surface.stop_camera();
    Ok(())
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn test_parse_resolution() {
        assert_eq!(parse_resolution("1280x720"), Ok((1280, 720)));
        assert_eq!(parse_resolution("640X480"), Ok((640, 480)));
        assert!(parse_resolution("1280").is_err());
        assert!(parse_resolution("widexhigh").is_err());
    }

    #[test]
    fn test_camera_overrides_parse() {
        let args = Args::try_parse_from([
            "fire_detect",
            "--resolution",
            "800x600",
            "--frame-rate",
            "15",
            "capture",
        ])
        .unwrap();

        assert_eq!(args.resolution, Some((800, 600)));
        assert_eq!(args.frame_rate, Some(15));
        assert!(matches!(args.command, Command::Capture { save_result: None }));
    }
}
