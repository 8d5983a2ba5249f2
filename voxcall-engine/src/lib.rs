//! Voxcall Call Engine
//!
//! Orchestrates a realtime voice call with a character: microphone capture
//! in bounded windows, activity detection, segment transcoding, the wire
//! protocol, and reply playback, all serialized through one state machine.
//!
//! ```text
//! AudioCapture ──windows──┐                  ┌── PlaybackController
//!      │ tap              │                  │        (rodio)
//! ActivityDetector ───────┼─> EngineEvent ───┤
//!                         │      queue       │
//! TransportChannel ───────┘        │         └── CallUpdate stream
//!   (NDJSON/TCP)            CallStateMachine
//! ```

pub mod capture;
pub mod config;
pub mod error;
pub mod events;
pub mod machine;
pub mod playback;
pub mod session;
pub mod silence;

pub use capture::CaptureDevice;
pub use config::CallConfig;
pub use error::{CallError, Result};
pub use events::{CallUpdate, EngineEvent, PlaybackCommand};
pub use machine::CallStateMachine;
pub use playback::PlaybackController;
pub use session::{CallSession, CallState, CharacterRef, FloorHolder, VoiceMessage};
pub use silence::SilenceTimeoutPolicy;

use tokio::sync::mpsc;
use tracing::info;

use voxcall_audio::{AudioCapture, AudioConfig};
use voxcall_transport::{InboundFrame, TransportChannel};
use voxcall_vad::{ActivityConfig, ActivityDetector};

/// Wire up a full call and run it to completion
///
/// Returns the `CallUpdate` receiver alongside the running call so callers
/// can observe it, via [`dial`]; this function drives everything itself and
/// logs updates, which is what the binary wants.
pub async fn run_call(config: CallConfig, character: CharacterRef) -> Result<()> {
    let (parts, updates_rx) = dial(config, character).await?;

    // Log the conversation for the terminal front-end
    let updates_task = tokio::spawn(log_updates(updates_rx));

    // Ctrl-C hangs up; the machine releases capture and drains out
    let hangup_events = parts.events.clone();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, hanging up");
            let _ = hangup_events.send(EngineEvent::Hangup);
        }
    });

    parts.machine.run().await;
    parts.channel.shutdown().await;
    updates_task.abort();
    signal_task.abort();

    Ok(())
}

/// Everything `dial` leaves running for the caller to drive
pub struct ActiveCall {
    pub machine: CallStateMachine<AudioCapture>,
    pub channel: TransportChannel,
    pub events: mpsc::UnboundedSender<EngineEvent>,
}

/// Acquire the microphone, connect, and spawn the call's worker tasks
///
/// Fails with `PermissionDenied` before connecting when the microphone is
/// unavailable, and with `Connect` (capture released) when the backend
/// cannot be reached. On success the returned machine is in `Connecting`
/// with a `ChannelOpen` event already queued.
pub async fn dial(
    config: CallConfig,
    character: CharacterRef,
) -> Result<(ActiveCall, mpsc::UnboundedReceiver<CallUpdate>)> {
    let audio_config = AudioConfig {
        sample_rate: config.sample_rate,
        window_duration: config.window_ms as f32 / 1000.0,
        device_index: config.audio_device_index,
        ..Default::default()
    };

    let mut capture = AudioCapture::new(audio_config)?;
    let mut segments_rx = capture
        .take_segments()
        .ok_or_else(|| CallError::Capture("Segment receiver already taken".to_string()))?;
    let tap = capture.tap_reader();

    let detector = ActivityDetector::new(
        ActivityConfig::new()
            .with_threshold(config.activity_threshold)
            .with_sample_rate(config.sample_rate),
    )?;

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (playback_tx, playback_rx) = mpsc::unbounded_channel();
    let (updates_tx, updates_rx) = mpsc::unbounded_channel();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();

    let mut machine = CallStateMachine::new(
        config.clone(),
        character,
        capture,
        outbound_tx,
        playback_tx,
        updates_tx,
        events_rx,
    );

    // Microphone first: permission problems surface before any connection
    machine.start_call()?;

    let mut channel = match TransportChannel::connect(&config.endpoint).await {
        Ok(channel) => channel,
        Err(e) => {
            machine.connect_failed(&e.to_string());
            return Err(CallError::Connect(e.to_string()));
        }
    };

    let mut inbound = channel
        .take_inbound()
        .ok_or_else(|| CallError::Capture("Inbound receiver already taken".to_string()))?;
    let transport_tx = channel.sender();

    // Outbound pump: machine -> transport writer
    tokio::spawn(async move {
        while let Some(event) = outbound_rx.recv().await {
            if transport_tx.send(event).is_err() {
                break;
            }
        }
    });

    // Inbound pump: transport reader -> event queue
    let inbound_events = events_tx.clone();
    tokio::spawn(async move {
        while let Some(frame) = inbound.recv().await {
            let event = match frame {
                InboundFrame::Event(server_event) => EngineEvent::Inbound(server_event),
                InboundFrame::Closed => EngineEvent::ChannelClosed,
            };
            if inbound_events.send(event).is_err() {
                break;
            }
        }
    });

    // Segment pump: finalized recording windows -> event queue
    let segment_events = events_tx.clone();
    tokio::spawn(async move {
        while let Some(segment) = segments_rx.recv().await {
            if segment_events
                .send(EngineEvent::SegmentReady(segment))
                .is_err()
            {
                break;
            }
        }
    });

    // Activity analyzer: drain the tap on a steady tick
    let activity_events = events_tx.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(std::time::Duration::from_millis(64));
        loop {
            tick.tick().await;
            let samples = tap.drain();
            if samples.is_empty() {
                continue;
            }
            let level = detector.analyze(&samples);
            if activity_events
                .send(EngineEvent::Activity {
                    intensity: level.intensity,
                })
                .is_err()
            {
                break;
            }
        }
    });

    // Reply playback
    let controller = PlaybackController::new(playback_rx, events_tx.clone())?;
    tokio::spawn(controller.run());

    events_tx
        .send(EngineEvent::ChannelOpen)
        .map_err(|_| CallError::InvalidState("Event queue closed".to_string()))?;

    Ok((
        ActiveCall {
            machine,
            channel,
            events: events_tx,
        },
        updates_rx,
    ))
}

async fn log_updates(mut updates_rx: mpsc::UnboundedReceiver<CallUpdate>) {
    while let Some(update) = updates_rx.recv().await {
        match update {
            CallUpdate::StateChanged(state) => info!("Call state: {}", state),
            CallUpdate::Transcript(text) => info!("You (partial): {}", text),
            CallUpdate::Message(message) => {
                let speaker = if message.is_user { "You" } else { "Character" };
                info!("{}: {}", speaker, message.text);
            }
            CallUpdate::Warning(warning) => tracing::warn!("{}", warning),
            CallUpdate::ActivityLevel(_) => {}
        }
    }
}
