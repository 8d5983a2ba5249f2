//! voxcall - realtime voice calls with chat characters

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use voxcall_audio::AudioCapture;
use voxcall_engine::{run_call, CallConfig, CharacterRef};

#[derive(Parser, Debug)]
#[command(name = "voxcall", about = "Realtime voice calls with chat characters")]
struct Args {
    /// Backend endpoint (host:port), overrides the config file
    #[arg(long)]
    endpoint: Option<String>,

    /// Character to call
    #[arg(long, default_value = "demo-character")]
    character_id: String,

    /// Display name of the character
    #[arg(long, default_value = "Demo Character")]
    character_name: String,

    /// Input device index, overrides the config file
    #[arg(long)]
    device: Option<usize>,

    /// List input devices and exit
    #[arg(long)]
    list_devices: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let args = Args::parse();

    if args.list_devices {
        let devices = AudioCapture::list_devices().context("Failed to enumerate devices")?;
        for device in devices {
            let marker = if device.is_default { " [default]" } else { "" };
            println!(
                "{:3}: {} ({} ch, {} Hz){}",
                device.index,
                device.name,
                device.max_input_channels,
                device.default_sample_rate,
                marker
            );
        }
        return Ok(());
    }

    let mut config = CallConfig::load().context("Failed to load configuration")?;
    if let Some(endpoint) = args.endpoint {
        config.endpoint = endpoint;
    }
    if let Some(device) = args.device {
        config.audio_device_index = Some(device);
    }

    let character = CharacterRef {
        id: args.character_id,
        name: args.character_name,
    };

    info!("Dialing {} at {}", character.name, config.endpoint);

    run_call(config, character).await.context("Call failed")?;

    Ok(())
}
