//! Call flow tests driven through a mock capture device

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{advance, sleep};

use voxcall_audio::{AudioError, AudioSegment, Result as AudioResult};
use voxcall_engine::{
    CallConfig, CallState, CallStateMachine, CallUpdate, CaptureDevice, CharacterRef,
    EngineEvent, FloorHolder, PlaybackCommand,
};
use voxcall_transport::{ClientEvent, ServerEvent};

#[derive(Default)]
struct MockFlags {
    acquired: AtomicBool,
    armed: AtomicBool,
    windows: AtomicBool,
    released: AtomicBool,
}

struct MockCapture {
    flags: Arc<MockFlags>,
    deny_permission: bool,
}

impl CaptureDevice for MockCapture {
    fn acquire(&mut self) -> AudioResult<()> {
        if self.deny_permission {
            return Err(AudioError::permission_denied("test denial"));
        }
        self.flags.acquired.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn arm(&mut self) -> AudioResult<()> {
        self.flags.armed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn start_windows(&mut self) -> AudioResult<()> {
        self.flags.windows.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn release(&mut self) {
        self.flags.released.store(true, Ordering::SeqCst);
    }

    fn is_released(&self) -> bool {
        self.flags.released.load(Ordering::SeqCst)
    }
}

struct Harness {
    machine: CallStateMachine<MockCapture>,
    events_tx: mpsc::UnboundedSender<EngineEvent>,
    outbound_rx: mpsc::UnboundedReceiver<ClientEvent>,
    playback_rx: mpsc::UnboundedReceiver<PlaybackCommand>,
    updates_rx: mpsc::UnboundedReceiver<CallUpdate>,
    flags: Arc<MockFlags>,
}

fn harness() -> Harness {
    harness_with(false)
}

fn harness_with(deny_permission: bool) -> Harness {
    let config = CallConfig::default();

    let flags = Arc::new(MockFlags::default());
    let capture = MockCapture {
        flags: Arc::clone(&flags),
        deny_permission,
    };

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (playback_tx, playback_rx) = mpsc::unbounded_channel();
    let (updates_tx, updates_rx) = mpsc::unbounded_channel();

    let machine = CallStateMachine::new(
        config,
        CharacterRef {
            id: "c1".to_string(),
            name: "Ada".to_string(),
        },
        capture,
        outbound_tx,
        playback_tx,
        updates_tx,
        events_rx,
    );

    Harness {
        machine,
        events_tx,
        outbound_rx,
        playback_rx,
        updates_rx,
        flags,
    }
}

fn greeting() -> EngineEvent {
    EngineEvent::Inbound(ServerEvent::Greeting {
        text: "Hello!".to_string(),
        audio_url: "http://backend/greet.wav".to_string(),
    })
}

fn response() -> EngineEvent {
    EngineEvent::Inbound(ServerEvent::Response {
        text: "Nice to meet you".to_string(),
        audio_url: "http://backend/reply.wav".to_string(),
    })
}

fn segment() -> EngineEvent {
    EngineEvent::SegmentReady(AudioSegment::from_samples(&vec![0.3; 160], 16000).unwrap())
}

fn drain_outbound(rx: &mut mpsc::UnboundedReceiver<ClientEvent>) -> Vec<ClientEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

fn drain_playback(rx: &mut mpsc::UnboundedReceiver<PlaybackCommand>) -> Vec<PlaybackCommand> {
    let mut out = Vec::new();
    while let Ok(command) = rx.try_recv() {
        out.push(command);
    }
    out
}

fn drain_updates(rx: &mut mpsc::UnboundedReceiver<CallUpdate>) -> Vec<CallUpdate> {
    let mut out = Vec::new();
    while let Ok(update) = rx.try_recv() {
        out.push(update);
    }
    out
}

/// Drive a fresh machine into Listening: connect, greet, finish playback
fn to_listening(h: &mut Harness) {
    h.machine.start_call().unwrap();
    h.machine.handle_event(EngineEvent::ChannelOpen);
    h.machine.handle_event(greeting());
    h.machine.handle_event(EngineEvent::PlaybackFinished {
        generation: 1,
        error: None,
    });
    assert_eq!(h.machine.state(), CallState::Listening);
}

#[tokio::test]
async fn permission_denial_keeps_machine_idle() {
    let mut h = harness_with(true);

    assert!(h.machine.start_call().is_err());
    assert_eq!(h.machine.state(), CallState::Idle);
    assert!(drain_outbound(&mut h.outbound_rx).is_empty());
}

#[tokio::test]
async fn greeting_starts_playback_exactly_once() {
    let mut h = harness();
    h.machine.start_call().unwrap();
    assert_eq!(h.machine.state(), CallState::Connecting);

    h.machine.handle_event(EngineEvent::ChannelOpen);
    assert_eq!(h.machine.state(), CallState::AwaitingGreeting);

    let outbound = drain_outbound(&mut h.outbound_rx);
    assert!(matches!(
        outbound.as_slice(),
        [ClientEvent::Init { character_id, .. }] if character_id == "c1"
    ));

    h.machine.handle_event(greeting());
    assert_eq!(h.machine.state(), CallState::Speaking);
    assert_eq!(h.machine.floor(), FloorHolder::Agent);
    assert!(h.flags.armed.load(Ordering::SeqCst));

    let plays = drain_playback(&mut h.playback_rx);
    assert_eq!(
        plays,
        vec![PlaybackCommand::Play {
            url: "http://backend/greet.wav".to_string(),
            generation: 1,
        }]
    );
}

#[tokio::test]
async fn playback_completion_releases_floor_and_sends_ready() {
    let mut h = harness();
    to_listening(&mut h);

    assert_eq!(h.machine.floor(), FloorHolder::User);
    assert!(h.flags.windows.load(Ordering::SeqCst));

    let outbound = drain_outbound(&mut h.outbound_rx);
    assert!(outbound.contains(&ClientEvent::Ready));
}

#[tokio::test]
async fn speechful_segment_is_sent_and_enters_processing() {
    let mut h = harness();
    to_listening(&mut h);
    drain_outbound(&mut h.outbound_rx);

    h.machine.handle_event(EngineEvent::Activity { intensity: 40.0 });
    h.machine.handle_event(segment());

    assert_eq!(h.machine.state(), CallState::Processing);
    assert_eq!(h.machine.floor(), FloorHolder::Nobody);

    let outbound = drain_outbound(&mut h.outbound_rx);
    match outbound.as_slice() {
        [ClientEvent::Audio { character_id, data }] => {
            assert_eq!(character_id, "c1");
            assert_eq!(&data[..4], b"RIFF");
        }
        other => panic!("Expected exactly one audio event, got {:?}", other),
    }
}

#[tokio::test]
async fn silent_window_is_dropped() {
    let mut h = harness();
    to_listening(&mut h);
    drain_outbound(&mut h.outbound_rx);

    // quiet activity only, below the threshold
    h.machine.handle_event(EngineEvent::Activity { intensity: 10.0 });
    h.machine.handle_event(segment());

    assert_eq!(h.machine.state(), CallState::Listening);
    assert!(drain_outbound(&mut h.outbound_rx).is_empty());
}

#[tokio::test]
async fn boundary_intensity_does_not_count_as_speech() {
    let mut h = harness();
    to_listening(&mut h);
    drain_outbound(&mut h.outbound_rx);

    // exactly at the threshold: not speech
    h.machine.handle_event(EngineEvent::Activity { intensity: 15.0 });
    h.machine.handle_event(segment());

    assert_eq!(h.machine.state(), CallState::Listening);
    assert!(drain_outbound(&mut h.outbound_rx).is_empty());
}

#[tokio::test]
async fn response_promotes_transcript_and_resumes_speaking() {
    let mut h = harness();
    to_listening(&mut h);

    h.machine.handle_event(EngineEvent::Activity { intensity: 40.0 });
    h.machine.handle_event(segment());
    assert_eq!(h.machine.state(), CallState::Processing);
    drain_updates(&mut h.updates_rx);

    h.machine.handle_event(EngineEvent::Inbound(ServerEvent::Transcript {
        text: "hi there".to_string(),
    }));
    h.machine.handle_event(response());

    assert_eq!(h.machine.state(), CallState::Speaking);
    assert_eq!(h.machine.floor(), FloorHolder::Agent);

    let messages: Vec<_> = drain_updates(&mut h.updates_rx)
        .into_iter()
        .filter_map(|u| match u {
            CallUpdate::Message(m) => Some(m),
            _ => None,
        })
        .collect();
    assert_eq!(messages.len(), 2);
    assert!(messages[0].is_user);
    assert_eq!(messages[0].text, "hi there");
    assert!(!messages[1].is_user);
    assert_eq!(messages[1].text, "Nice to meet you");

    let plays = drain_playback(&mut h.playback_rx);
    assert_eq!(
        plays,
        vec![PlaybackCommand::Play {
            url: "http://backend/reply.wav".to_string(),
            generation: 2,
        }]
    );
}

#[tokio::test]
async fn transcript_alone_creates_no_message() {
    let mut h = harness();
    to_listening(&mut h);
    drain_updates(&mut h.updates_rx);

    h.machine.handle_event(EngineEvent::Inbound(ServerEvent::Transcript {
        text: "partial words".to_string(),
    }));

    let updates = drain_updates(&mut h.updates_rx);
    assert!(updates
        .iter()
        .any(|u| matches!(u, CallUpdate::Transcript(t) if t == "partial words")));
    assert!(!updates.iter().any(|u| matches!(u, CallUpdate::Message(_))));
}

#[tokio::test]
async fn playback_error_is_nonfatal_and_returns_to_listening() {
    let mut h = harness();
    h.machine.start_call().unwrap();
    h.machine.handle_event(EngineEvent::ChannelOpen);
    h.machine.handle_event(greeting());
    drain_updates(&mut h.updates_rx);

    h.machine.handle_event(EngineEvent::PlaybackFinished {
        generation: 1,
        error: Some("decode failed".to_string()),
    });

    assert_eq!(h.machine.state(), CallState::Listening);
    let updates = drain_updates(&mut h.updates_rx);
    assert!(updates
        .iter()
        .any(|u| matches!(u, CallUpdate::Warning(w) if w.contains("decode failed"))));
}

#[tokio::test]
async fn stale_playback_completion_is_ignored() {
    let mut h = harness();
    h.machine.start_call().unwrap();
    h.machine.handle_event(EngineEvent::ChannelOpen);
    h.machine.handle_event(greeting());

    h.machine.handle_event(EngineEvent::PlaybackFinished {
        generation: 99,
        error: None,
    });

    assert_eq!(h.machine.state(), CallState::Speaking);
}

#[tokio::test]
async fn backend_error_event_does_not_end_the_call() {
    let mut h = harness();
    to_listening(&mut h);
    drain_updates(&mut h.updates_rx);

    h.machine.handle_event(EngineEvent::Inbound(ServerEvent::Error {
        message: "tts overloaded".to_string(),
    }));

    assert_eq!(h.machine.state(), CallState::Listening);
    assert!(drain_updates(&mut h.updates_rx)
        .iter()
        .any(|u| matches!(u, CallUpdate::Warning(w) if w.contains("tts overloaded"))));
}

#[tokio::test]
async fn channel_closure_is_fatal() {
    let mut h = harness();
    to_listening(&mut h);

    h.machine.handle_event(EngineEvent::ChannelClosed);

    assert_eq!(h.machine.state(), CallState::Ended);
    assert!(h.flags.released.load(Ordering::SeqCst));
}

#[tokio::test]
async fn hangup_releases_capture_from_every_state() {
    // Idle
    let mut h = harness();
    h.machine.hangup();
    assert_eq!(h.machine.state(), CallState::Ended);
    assert!(h.flags.released.load(Ordering::SeqCst));

    // Connecting
    let mut h = harness();
    h.machine.start_call().unwrap();
    h.machine.hangup();
    assert_eq!(h.machine.state(), CallState::Ended);
    assert!(h.flags.released.load(Ordering::SeqCst));

    // AwaitingGreeting
    let mut h = harness();
    h.machine.start_call().unwrap();
    h.machine.handle_event(EngineEvent::ChannelOpen);
    h.machine.hangup();
    assert!(h.flags.released.load(Ordering::SeqCst));

    // Speaking
    let mut h = harness();
    h.machine.start_call().unwrap();
    h.machine.handle_event(EngineEvent::ChannelOpen);
    h.machine.handle_event(greeting());
    h.machine.hangup();
    assert!(h.flags.released.load(Ordering::SeqCst));

    // Listening
    let mut h = harness();
    to_listening(&mut h);
    h.machine.hangup();
    assert!(h.flags.released.load(Ordering::SeqCst));

    // Processing
    let mut h = harness();
    to_listening(&mut h);
    h.machine.handle_event(EngineEvent::Activity { intensity: 40.0 });
    h.machine.handle_event(segment());
    h.machine.hangup();
    assert!(h.flags.released.load(Ordering::SeqCst));
}

#[tokio::test]
async fn hangup_twice_is_a_noop() {
    let mut h = harness();
    to_listening(&mut h);

    h.machine.hangup();
    h.machine.hangup();

    assert_eq!(h.machine.state(), CallState::Ended);
    let stops = drain_playback(&mut h.playback_rx)
        .into_iter()
        .filter(|c| matches!(c, PlaybackCommand::Stop))
        .count();
    assert_eq!(stops, 1);
}

#[tokio::test]
async fn events_after_hangup_are_ignored() {
    let mut h = harness();
    to_listening(&mut h);
    h.machine.hangup();
    drain_outbound(&mut h.outbound_rx);

    h.machine.handle_event(EngineEvent::Activity { intensity: 40.0 });
    h.machine.handle_event(segment());
    h.machine.handle_event(response());

    assert_eq!(h.machine.state(), CallState::Ended);
    assert!(drain_outbound(&mut h.outbound_rx).is_empty());
}

#[tokio::test]
async fn connect_failure_returns_to_idle_and_releases() {
    let mut h = harness();
    h.machine.start_call().unwrap();
    assert_eq!(h.machine.state(), CallState::Connecting);

    h.machine.connect_failed("connection refused");

    assert_eq!(h.machine.state(), CallState::Idle);
    assert!(h.flags.released.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn silence_timeout_fires_once_per_arm() {
    let mut h = harness();
    h.machine.start_call().unwrap();

    let events = h.events_tx.clone();
    let task = tokio::spawn(h.machine.run());

    events.send(EngineEvent::ChannelOpen).unwrap();
    events.send(greeting()).unwrap();
    events
        .send(EngineEvent::PlaybackFinished {
            generation: 1,
            error: None,
        })
        .unwrap();
    sleep(Duration::from_millis(1)).await;
    drain_outbound(&mut h.outbound_rx);

    // Nothing at 4999ms, exactly one timeout once 5000ms of silence pass
    sleep(Duration::from_millis(4998)).await;
    assert!(drain_outbound(&mut h.outbound_rx).is_empty());

    sleep(Duration::from_millis(3)).await;
    let outbound = drain_outbound(&mut h.outbound_rx);
    assert!(matches!(
        outbound.as_slice(),
        [ClientEvent::SilenceTimeout { character_id }] if character_id == "c1"
    ));

    // Disarmed after firing: no second timeout
    sleep(Duration::from_secs(12)).await;
    assert!(drain_outbound(&mut h.outbound_rx).is_empty());

    events.send(EngineEvent::Hangup).unwrap();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn activity_postpones_timeout_by_full_interval() {
    let mut h = harness();
    h.machine.start_call().unwrap();

    let events = h.events_tx.clone();
    let task = tokio::spawn(h.machine.run());

    events.send(EngineEvent::ChannelOpen).unwrap();
    events.send(greeting()).unwrap();
    events
        .send(EngineEvent::PlaybackFinished {
            generation: 1,
            error: None,
        })
        .unwrap();
    sleep(Duration::from_millis(1)).await;
    drain_outbound(&mut h.outbound_rx);

    // Speech at 3s pushes the deadline to 8s, not 5s
    sleep(Duration::from_millis(3000)).await;
    events
        .send(EngineEvent::Activity { intensity: 50.0 })
        .unwrap();
    sleep(Duration::from_millis(1)).await;

    sleep(Duration::from_millis(4900)).await; // ~7.9s total
    assert!(drain_outbound(&mut h.outbound_rx).is_empty());

    sleep(Duration::from_millis(200)).await; // past 8s
    let outbound = drain_outbound(&mut h.outbound_rx);
    assert_eq!(
        outbound
            .iter()
            .filter(|e| matches!(e, ClientEvent::SilenceTimeout { .. }))
            .count(),
        1
    );

    events.send(EngineEvent::Hangup).unwrap();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn queued_segment_beats_expired_timeout() {
    let mut h = harness();
    h.machine.start_call().unwrap();

    let events = h.events_tx.clone();
    let task = tokio::spawn(h.machine.run());

    events.send(EngineEvent::ChannelOpen).unwrap();
    events.send(greeting()).unwrap();
    events
        .send(EngineEvent::PlaybackFinished {
            generation: 1,
            error: None,
        })
        .unwrap();
    events
        .send(EngineEvent::Activity { intensity: 50.0 })
        .unwrap();
    sleep(Duration::from_millis(1)).await;
    drain_outbound(&mut h.outbound_rx);

    // Queue the segment, then let the clock blow past the deadline without
    // giving the machine a chance to run in between. The event queue is
    // polled first, so the segment wins the race.
    events.send(segment()).unwrap();
    advance(Duration::from_secs(6)).await;
    sleep(Duration::from_millis(1)).await;

    let outbound = drain_outbound(&mut h.outbound_rx);
    assert!(outbound
        .iter()
        .any(|e| matches!(e, ClientEvent::Audio { .. })));
    assert!(!outbound
        .iter()
        .any(|e| matches!(e, ClientEvent::SilenceTimeout { .. })));

    events.send(EngineEvent::Hangup).unwrap();
    task.await.unwrap();
}
