//! Call state machine
//!
//! The single serialization point of a call. Every concurrent source
//! (transport reader, finalized recording windows, activity ticks, playback
//! completions, the user's hangup) feeds one event queue, and this machine
//! is its only consumer. No other task mutates call state.
//!
//! The run loop polls the event queue before the silence deadline, so a
//! recording window that arrives together with a timeout always wins.

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::{debug, info, warn};

use voxcall_transcode::Transcoder;
use voxcall_transport::{ClientEvent, ServerEvent};

use crate::capture::CaptureDevice;
use crate::config::CallConfig;
use crate::error::{CallError, Result};
use crate::events::{CallUpdate, EngineEvent, PlaybackCommand};
use crate::session::{CallSession, CallState, CharacterRef, FloorHolder, VoiceMessage};
use crate::silence::SilenceTimeoutPolicy;

pub struct CallStateMachine<C: CaptureDevice> {
    config: CallConfig,
    session: CallSession,
    capture: C,
    transcoder: Transcoder,
    silence: SilenceTimeoutPolicy,
    /// Dropped at hangup so the transport writer shuts down
    outbound: Option<mpsc::UnboundedSender<ClientEvent>>,
    playback: mpsc::UnboundedSender<PlaybackCommand>,
    updates: mpsc::UnboundedSender<CallUpdate>,
    events: mpsc::UnboundedReceiver<EngineEvent>,
    pending_transcript: Option<String>,
    playback_generation: u64,
}

impl<C: CaptureDevice> CallStateMachine<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: CallConfig,
        character: CharacterRef,
        capture: C,
        outbound: mpsc::UnboundedSender<ClientEvent>,
        playback: mpsc::UnboundedSender<PlaybackCommand>,
        updates: mpsc::UnboundedSender<CallUpdate>,
        events: mpsc::UnboundedReceiver<EngineEvent>,
    ) -> Self {
        let silence = SilenceTimeoutPolicy::new(config.silence_timeout());
        let transcoder = Transcoder::new(config.permissive_transcode);

        Self {
            config,
            session: CallSession::new(character),
            capture,
            transcoder,
            silence,
            outbound: Some(outbound),
            playback,
            updates,
            events,
            pending_transcript: None,
            playback_generation: 0,
        }
    }

    /// Acquire the microphone and enter `Connecting`
    ///
    /// Permission failures surface here, before any connection is opened,
    /// and leave the machine in `Idle` holding nothing.
    pub fn start_call(&mut self) -> Result<()> {
        if self.session.state != CallState::Idle {
            return Err(CallError::InvalidState(format!(
                "start_call in state {}",
                self.session.state
            )));
        }

        self.capture.acquire()?;
        info!("Calling {}", self.session.character.name);
        self.set_state(CallState::Connecting);

        Ok(())
    }

    /// The transport could not be opened: release capture, back to `Idle`
    pub fn connect_failed(&mut self, reason: &str) {
        warn!("Connection failed: {}", reason);
        self.capture.release();
        self.silence.cancel();
        self.set_state(CallState::Idle);
    }

    pub fn state(&self) -> CallState {
        self.session.state
    }

    pub fn floor(&self) -> FloorHolder {
        self.session.floor
    }

    /// Consume events until the call ends
    pub async fn run(mut self) {
        loop {
            if self.session.state == CallState::Ended {
                break;
            }

            let deadline = self.silence.deadline();
            let sleep_target =
                deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(86400));

            tokio::select! {
                biased;

                event = self.events.recv() => {
                    match event {
                        Some(event) => self.handle_event(event),
                        None => {
                            debug!("Event sources dropped, ending call");
                            self.hangup();
                        }
                    }
                }

                _ = sleep_until(sleep_target), if deadline.is_some() => {
                    self.on_silence_timeout();
                }
            }
        }

        info!(
            "Call ended after {:.1}s",
            self.session.elapsed().as_secs_f64()
        );
    }

    /// Apply one event. Ignored entirely once the call has ended.
    pub fn handle_event(&mut self, event: EngineEvent) {
        if self.session.state == CallState::Ended {
            return;
        }

        match event {
            EngineEvent::Hangup => self.hangup(),
            EngineEvent::ChannelOpen => self.on_channel_open(),
            EngineEvent::ChannelClosed => self.on_channel_closed(),
            EngineEvent::Inbound(server_event) => self.on_server_event(server_event),
            EngineEvent::SegmentReady(segment) => self.on_segment(segment),
            EngineEvent::Activity { intensity } => self.on_activity(intensity),
            EngineEvent::PlaybackFinished { generation, error } => {
                self.on_playback_finished(generation, error)
            }
        }
    }

    /// End the call. Idempotent and effective from every state; always
    /// releases the capture device.
    pub fn hangup(&mut self) {
        if self.session.state == CallState::Ended {
            return;
        }

        self.silence.cancel();
        let _ = self.playback.send(PlaybackCommand::Stop);
        self.capture.release();
        self.outbound.take();
        self.session.floor = FloorHolder::Nobody;
        self.set_state(CallState::Ended);
    }

    /// Fire the armed silence timeout (called from the run loop)
    pub fn on_silence_timeout(&mut self) {
        self.silence.fire();

        if self.session.state != CallState::Listening {
            return;
        }

        info!("Silence timeout, prompting the character");
        self.send(ClientEvent::SilenceTimeout {
            character_id: self.session.character.id.clone(),
        });
        self.session.floor = FloorHolder::Nobody;
        self.set_state(CallState::Processing);
    }

    fn on_channel_open(&mut self) {
        if self.session.state != CallState::Connecting {
            debug!("Channel open in state {}, ignoring", self.session.state);
            return;
        }

        self.send(ClientEvent::Init {
            character_id: self.session.character.id.clone(),
            character_name: self.session.character.name.clone(),
        });
        self.set_state(CallState::AwaitingGreeting);
    }

    fn on_channel_closed(&mut self) {
        warn!("Connection lost, ending call");
        self.update(CallUpdate::Warning("Connection lost".to_string()));
        self.hangup();
    }

    fn on_server_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Greeting { text, audio_url } => {
                if self.session.state != CallState::AwaitingGreeting {
                    debug!("Greeting in state {}, ignoring", self.session.state);
                    return;
                }

                if let Err(e) = self.capture.arm() {
                    warn!("Failed to arm capture: {}", e);
                    self.update(CallUpdate::Warning(format!(
                        "Microphone unavailable: {}",
                        e
                    )));
                }

                self.update(CallUpdate::Message(VoiceMessage::agent(
                    text,
                    audio_url.clone(),
                )));
                self.start_playback(audio_url);
            }

            ServerEvent::Transcript { text } => {
                self.pending_transcript = Some(text.clone());
                self.update(CallUpdate::Transcript(text));
            }

            ServerEvent::Response { text, audio_url } => {
                if self.session.state != CallState::Processing {
                    debug!("Response in state {}, ignoring", self.session.state);
                    return;
                }

                if let Some(transcript) = self.pending_transcript.take() {
                    self.update(CallUpdate::Message(VoiceMessage::user(transcript)));
                }
                self.update(CallUpdate::Message(VoiceMessage::agent(
                    text,
                    audio_url.clone(),
                )));
                self.start_playback(audio_url);
            }

            ServerEvent::Error { message } => {
                warn!("Backend error: {}", message);
                self.update(CallUpdate::Warning(message));
            }
        }
    }

    fn on_segment(&mut self, segment: voxcall_audio::AudioSegment) {
        if self.session.state != CallState::Listening {
            // Windows finalized while the agent holds the floor would echo
            // its own reply back; drop them.
            debug!("Segment in state {}, dropped", self.session.state);
            return;
        }

        if !self.session.has_user_spoken {
            debug!("Silent window dropped ({:?})", segment.duration());
            return;
        }
        self.session.has_user_spoken = false;

        match self.transcoder.transcode(&segment) {
            Ok(audio) => {
                self.send(ClientEvent::Audio {
                    character_id: self.session.character.id.clone(),
                    data: audio.data,
                });
                self.silence.cancel();
                self.session.floor = FloorHolder::Nobody;
                self.set_state(CallState::Processing);
            }
            Err(e) => {
                warn!("Transcode failed, window dropped: {}", e);
                self.update(CallUpdate::Warning(format!(
                    "Dropped a recording window: {}",
                    e
                )));
            }
        }
    }

    fn on_activity(&mut self, intensity: f32) {
        self.session.last_intensity = intensity;
        self.update(CallUpdate::ActivityLevel(intensity));

        let speaking = intensity > self.config.activity_threshold;
        if speaking && self.session.state == CallState::Listening {
            self.session.has_user_spoken = true;
            self.silence.reset();
        }
    }

    fn on_playback_finished(&mut self, generation: u64, error: Option<String>) {
        if generation != self.playback_generation {
            debug!("Stale playback completion (gen {})", generation);
            return;
        }

        if self.session.state != CallState::Speaking {
            debug!(
                "Playback completion in state {}, ignoring",
                self.session.state
            );
            return;
        }

        if let Some(e) = error {
            // Playback failures degrade the turn, never the call
            warn!("Playback failed: {}", e);
            self.update(CallUpdate::Warning(format!("Playback failed: {}", e)));
        }

        self.enter_listening();
    }

    fn enter_listening(&mut self) {
        self.session.floor = FloorHolder::User;
        self.session.has_user_spoken = false;

        self.send(ClientEvent::Ready);

        if let Err(e) = self.capture.start_windows() {
            warn!("Failed to start recording windows: {}", e);
            self.update(CallUpdate::Warning(format!(
                "Recording unavailable: {}",
                e
            )));
        }

        self.silence.arm();
        self.set_state(CallState::Listening);
    }

    fn start_playback(&mut self, url: String) {
        self.playback_generation += 1;
        let _ = self.playback.send(PlaybackCommand::Play {
            url,
            generation: self.playback_generation,
        });

        self.silence.cancel();
        self.session.floor = FloorHolder::Agent;
        self.set_state(CallState::Speaking);
    }

    fn set_state(&mut self, state: CallState) {
        if self.session.state == state {
            return;
        }
        debug!("Call state: {} -> {}", self.session.state, state);
        self.session.state = state;
        self.update(CallUpdate::StateChanged(state));
    }

    fn send(&self, event: ClientEvent) {
        if let Some(outbound) = &self.outbound {
            if outbound.send(event).is_err() {
                warn!("Outbound queue closed");
            }
        }
    }

    fn update(&self, update: CallUpdate) {
        let _ = self.updates.send(update);
    }
}
