//! Engine event types
//!
//! Every input to the call state machine arrives as an `EngineEvent` on one
//! queue, so concurrent sources (transport reader, capture windows, the
//! activity analyzer, playback completions, the user) are serialized before
//! they touch call state.

use voxcall_audio::AudioSegment;
use voxcall_transport::ServerEvent;

use crate::session::{CallState, VoiceMessage};

/// Inputs to the call state machine, consumed by a single event loop
#[derive(Debug)]
pub enum EngineEvent {
    /// Transport connection is open and writable
    ChannelOpen,
    /// Transport connection ended (fatal mid-call)
    ChannelClosed,
    /// Decoded frame from the backend
    Inbound(ServerEvent),
    /// A recording window was finalized
    SegmentReady(AudioSegment),
    /// One activity-analyzer tick
    Activity { intensity: f32 },
    /// A playback attempt finished, successfully or not
    PlaybackFinished {
        generation: u64,
        error: Option<String>,
    },
    /// User requested to end the call
    Hangup,
}

/// Commands for the playback controller
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackCommand {
    /// Fetch and play a reply; stops any playback already in flight
    Play { url: String, generation: u64 },
    /// Stop whatever is playing
    Stop,
}

/// Updates for whatever front-end is observing the call
#[derive(Debug, Clone)]
pub enum CallUpdate {
    StateChanged(CallState),
    /// Most recent activity intensity (0-100), for a level meter
    ActivityLevel(f32),
    /// Provisional recognition text, superseded by the next transcript
    Transcript(String),
    /// A persistent conversation message
    Message(VoiceMessage),
    /// Non-fatal degradation worth surfacing
    Warning(String),
}
