// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! The composition root: owns the coordinator, turns commands into coordinator calls and runs
//! the single-threaded event loop.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{select, Receiver, Sender};
use rayon::ThreadPoolBuilder;
use tracing::{debug, info, warn};

use crate::audio::{self, DecodedAudio, SourceEvent};
use crate::error::SoundboardError;
use crate::library::{ClipId, Upload};
use crate::playback::PlaybackCoordinator;
use crate::timer::Timers;
use crate::trigger::Trigger;

/// How long the loop sleeps when nothing is scheduled.
const IDLE_WAIT: Duration = Duration::from_secs(1);

/// Requests from the UI.
#[derive(Debug)]
pub enum Command {
    /// A trigger control was pressed.
    Activate(Trigger),
    /// Plays a named clip of a trigger alongside everything else.
    Preview(Trigger, String),
    /// The stop control was pressed. A second press inside the double-press window forces.
    StopPressed,
    /// Graceful stop of everything.
    StopAll,
    /// Stops everything without a fade.
    StopImmediately,
    /// Mutes and halts everything on the spot.
    ForceStop,
    SetVolume(f32),
    AddClips(Vec<Upload>),
    RemoveClip(Trigger, String),
    ClearClips(Trigger),
    Shutdown,
}

/// Shows user-visible errors.
pub trait Notifier: Send {
    fn notify(&mut self, error: &SoundboardError);
}

/// What a stop gesture resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopKind {
    Graceful,
    Force,
}

/// Tells a single press of the stop control from a double press.
pub struct StopGesture {
    window: Duration,
    pending: Timers<()>,
}

impl StopGesture {
    pub fn new(window: Duration) -> StopGesture {
        StopGesture {
            window,
            pending: Timers::new(),
        }
    }

    /// Registers a press. A press while another is pending resolves to a force stop; a first
    /// press resolves later, through `poll`.
    pub fn press(&mut self, now: Instant) -> Option<StopKind> {
        if self.pending.cancel(&()) {
            return Some(StopKind::Force);
        }
        self.pending.schedule((), now + self.window);
        None
    }

    /// Resolves a single press once its window has passed.
    pub fn poll(&mut self, now: Instant) -> Option<StopKind> {
        if self.pending.take_due(now).is_empty() {
            None
        } else {
            Some(StopKind::Graceful)
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.next_deadline()
    }
}

/// Worker pool decoding clips off the event loop. Backed by a dedicated Rayon thread pool.
pub struct DecodePool {
    pool: rayon::ThreadPool,
}

impl DecodePool {
    /// Creates a new pool with the given number of worker threads.
    pub fn new(num_threads: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads.max(1))
            .thread_name(|i| format!("soundboard-decode-{i}"))
            .build()?;
        Ok(Self { pool })
    }

    /// Spawns a one-shot job on the pool.
    pub fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pool.spawn(job);
    }
}

/// A finished background decode.
struct Decoded {
    id: ClipId,
    result: Result<DecodedAudio, SoundboardError>,
}

pub struct Soundboard {
    coordinator: PlaybackCoordinator,
    notifier: Box<dyn Notifier>,
    stop: StopGesture,
    decoder: DecodePool,
    decoded_tx: Sender<Decoded>,
    decoded_rx: Receiver<Decoded>,
    /// Clips with a decode in flight.
    pending: HashSet<ClipId>,
    /// Clips that failed to decode. They are decoded again only when played.
    failed: HashSet<ClipId>,
    source_events: Receiver<SourceEvent>,
}

impl Soundboard {
    /// Opens the output and starts decoding the loaded library in the background.
    pub fn new(
        coordinator: PlaybackCoordinator,
        decoder: DecodePool,
        notifier: Box<dyn Notifier>,
        double_press: Duration,
    ) -> Soundboard {
        let (decoded_tx, decoded_rx) = crossbeam_channel::unbounded();
        let source_events = coordinator.output_events();
        let mut soundboard = Soundboard {
            coordinator,
            notifier,
            stop: StopGesture::new(double_press),
            decoder,
            decoded_tx,
            decoded_rx,
            pending: HashSet::new(),
            failed: HashSet::new(),
            source_events,
        };

        match soundboard.coordinator.open_output() {
            Ok(sample_rate) => debug!(sample_rate, "Audio output ready"),
            // The next activation tries again.
            Err(e) => warn!(err = %e, "Unable to open audio output"),
        }
        soundboard.warm_cache();
        soundboard
    }

    pub fn coordinator(&self) -> &PlaybackCoordinator {
        &self.coordinator
    }

    /// Handles a command. Returns false once the board has shut down.
    pub fn handle(&mut self, command: Command, now: Instant) -> bool {
        self.tick(now);
        debug!(command = ?command, "Handling command");

        match command {
            Command::Activate(trigger) => {
                let result = self.coordinator.activate(trigger, now).map(|_| ());
                self.report(result);
                self.warm_cache();
            }
            Command::Preview(trigger, name) => {
                let result = self.coordinator.preview(trigger, &name, now).map(|_| ());
                self.report(result);
            }
            Command::StopPressed => {
                if let Some(kind) = self.stop.press(now) {
                    self.apply_stop(kind);
                }
            }
            Command::StopAll => self.coordinator.stop_all_sounds(),
            Command::StopImmediately => self.coordinator.stop_all_sounds_immediately(),
            Command::ForceStop => self.coordinator.force_stop_all_sounds(),
            Command::SetVolume(volume) => {
                self.coordinator.set_volume(volume);
            }
            Command::AddClips(uploads) => {
                let persisted = self.coordinator.add_clips(uploads);
                for error in &persisted.value.rejected {
                    self.notify(error);
                }
                self.report(persisted.saved);
                self.warm_cache();
            }
            Command::RemoveClip(trigger, name) => {
                let persisted = self.coordinator.remove_clip(trigger, &name);
                if persisted.value.is_none() {
                    self.notify(&SoundboardError::ClipNotFound { trigger, name });
                }
                self.report(persisted.saved);
            }
            Command::ClearClips(trigger) => {
                let persisted = self.coordinator.clear_clips(trigger);
                self.report(persisted.saved);
            }
            Command::Shutdown => {
                self.shutdown();
                return false;
            }
        }
        true
    }

    /// Fires everything that has come due.
    pub fn tick(&mut self, now: Instant) {
        self.coordinator.poll_timers(now);
        if let Some(kind) = self.stop.poll(now) {
            self.apply_stop(kind);
        }
    }

    /// Feeds pending source events to the coordinator.
    pub fn drain_source_events(&mut self) -> usize {
        let events: Vec<_> = self.source_events.try_iter().collect();
        let count = events.len();
        for event in events {
            self.coordinator.handle_source_event(event);
        }
        count
    }

    /// When `tick` next has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.coordinator.next_deadline(), self.stop.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// The number of background decodes in flight.
    pub fn pending_decodes(&self) -> usize {
        self.pending.len()
    }

    fn apply_stop(&mut self, kind: StopKind) {
        debug!(kind = ?kind, "Stop gesture");
        match kind {
            StopKind::Graceful => self.coordinator.stop_all_sounds(),
            StopKind::Force => self.coordinator.force_stop_all_sounds(),
        }
    }

    /// Queues a background decode for every clip that isn't playable yet. Does nothing until
    /// the output is open, since decoding targets its sample rate. A clip played while its
    /// decode is still queued is decoded again on the loop.
    fn warm_cache(&mut self) {
        let Some(sample_rate) = self
            .coordinator
            .output()
            .map(|context| context.sample_rate())
        else {
            return;
        };

        let library = self.coordinator.library();
        let cold: Vec<_> = library
            .all_clips()
            .filter(|clip| {
                library.playable(clip.id()).is_none()
                    && !self.pending.contains(&clip.id())
                    && !self.failed.contains(&clip.id())
            })
            .map(|clip| (clip.id(), clip.name().to_string(), clip.shared_bytes()))
            .collect();

        for (id, name, bytes) in cold {
            self.pending.insert(id);
            let tx = self.decoded_tx.clone();
            self.decoder.spawn(move || {
                let result = audio::decode(&name, &bytes, sample_rate);
                if tx.send(Decoded { id, result }).is_err() {
                    debug!(clip = %name, "Soundboard gone before decode finished");
                }
            });
        }
    }

    fn handle_decoded(&mut self, decoded: Decoded) {
        self.pending.remove(&decoded.id);
        match decoded.result {
            Ok(audio) => {
                if !self.coordinator.cache_playable(decoded.id, Arc::new(audio)) {
                    debug!(clip = %decoded.id, "Clip removed before decode finished");
                }
            }
            // Reported to the user if the clip is played.
            Err(e) => {
                warn!(clip = %decoded.id, err = %e, "Background decode failed");
                self.failed.insert(decoded.id);
            }
        }
    }

    fn report(&mut self, result: Result<(), SoundboardError>) {
        if let Err(e) = result {
            self.notify(&e);
        }
    }

    fn notify(&mut self, error: &SoundboardError) {
        if error.is_user_visible() {
            self.notifier.notify(error);
        } else {
            debug!(err = %error, "Error not shown");
        }
    }

    fn shutdown(&mut self) {
        self.pending.clear();
        self.coordinator.shutdown();
    }

    /// Runs the event loop until a `Shutdown` command arrives or every command sender is gone.
    pub fn run(mut self, commands: Receiver<Command>) {
        info!("Soundboard running");
        let events = self.source_events.clone();
        let decoded = self.decoded_rx.clone();

        let mut running = true;
        while running {
            let timeout = self
                .next_deadline()
                .map(|deadline| deadline.saturating_duration_since(Instant::now()))
                .unwrap_or(IDLE_WAIT);

            select! {
                recv(commands) -> command => {
                    running = match command {
                        Ok(command) => self.handle(command, Instant::now()),
                        Err(_) => {
                            info!("Command channel closed");
                            self.shutdown();
                            false
                        }
                    };
                }
                recv(events) -> event => {
                    if let Ok(event) = event {
                        self.coordinator.handle_source_event(event);
                    }
                }
                recv(decoded) -> result => {
                    if let Ok(result) = result {
                        self.handle_decoded(result);
                    }
                }
                default(timeout) => {}
            }

            if running {
                self.tick(Instant::now());
            }
        }
        info!("Soundboard stopped");
    }
}

impl std::fmt::Debug for Soundboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Soundboard")
            .field("coordinator", &self.coordinator)
            .field("pending", &self.pending.len())
            .field("failed", &self.failed.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::audio::{mock, AudioOutput, ContextState};
    use crate::labels::LabelController;
    use crate::library::{SoundLibrary, StoredClip, StoredLibrary};
    use crate::playback::PlaybackOptions;
    use crate::status::{PlaybackPhase, StatusProjector};
    use crate::testutil::{clip_upload, wav_bytes, MemoryStore, RecordingNotifier, RecordingSink};

    const DOUBLE_PRESS: Duration = Duration::from_millis(300);

    struct Fixture {
        board: Soundboard,
        backend: mock::Backend,
        store: MemoryStore,
        notifier: RecordingNotifier,
        sink: RecordingSink,
    }

    fn fixture() -> Fixture {
        fixture_with(MemoryStore::default())
    }

    fn fixture_with(store: MemoryStore) -> Fixture {
        let backend = mock::Backend::new(2, 8000);
        let notifier = RecordingNotifier::default();
        let sink = RecordingSink::default();
        let mut status = StatusProjector::new();
        status.subscribe(Box::new(sink.clone()));

        let coordinator = PlaybackCoordinator::new(
            SoundLibrary::load(Box::new(store.clone())),
            LabelController::new(Duration::from_millis(600)),
            status,
            AudioOutput::new(Box::new(backend.clone())),
            PlaybackOptions::default(),
        )
        .with_seed(7);
        let board = Soundboard::new(
            coordinator,
            DecodePool::new(1).unwrap(),
            Box::new(notifier.clone()),
            DOUBLE_PRESS,
        );

        Fixture {
            board,
            backend,
            store,
            notifier,
            sink,
        }
    }

    #[test]
    fn test_stop_gesture() {
        let mut gesture = StopGesture::new(DOUBLE_PRESS);
        let now = Instant::now();

        assert_eq!(gesture.press(now), None);
        assert_eq!(gesture.next_deadline(), Some(now + DOUBLE_PRESS));
        assert_eq!(gesture.poll(now + Duration::from_millis(299)), None);
        assert_eq!(gesture.poll(now + DOUBLE_PRESS), Some(StopKind::Graceful));
        assert_eq!(gesture.poll(now + DOUBLE_PRESS), None);

        assert_eq!(gesture.press(now), None);
        assert_eq!(
            gesture.press(now + Duration::from_millis(100)),
            Some(StopKind::Force)
        );
        assert_eq!(gesture.next_deadline(), None);
        assert_eq!(gesture.poll(now + Duration::from_secs(1)), None);
    }

    #[test]
    fn test_single_stop_press_fades_after_window() {
        let mut fixture = fixture();
        let now = Instant::now();

        assert!(fixture.board.handle(Command::Activate(Trigger::Goal), now));
        assert!(fixture.board.handle(Command::StopPressed, now));
        assert!(!fixture.board.coordinator().state().is_idle());

        fixture.board.tick(now + DOUBLE_PRESS);
        assert!(fixture.board.coordinator().state().is_idle());
        assert_eq!(fixture.board.coordinator().fading(), 1);
    }

    #[test]
    fn test_double_stop_press_forces() {
        let mut fixture = fixture();
        let now = Instant::now();

        fixture.board.handle(Command::Activate(Trigger::Goal), now);
        fixture.board.handle(Command::StopPressed, now);
        fixture
            .board
            .handle(Command::StopPressed, now + Duration::from_millis(150));

        assert!(fixture.board.coordinator().state().is_idle());
        assert_eq!(fixture.board.coordinator().fading(), 0);
        assert_eq!(fixture.backend.context().unwrap().source_count(), 0);
        assert_eq!(fixture.board.next_deadline(), None);
    }

    #[test]
    fn test_rejected_upload_is_notified() {
        let mut fixture = fixture();
        fixture.board.handle(
            Command::AddClips(vec![
                Upload::new(Trigger::Goal, "jubel.wav", None, vec![1, 2, 3]),
                clip_upload(Trigger::Goal, "jubel.mp3", 0.1, 8000),
            ]),
            Instant::now(),
        );

        let messages = fixture.notifier.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("jubel.wav"));
        assert_eq!(fixture.board.coordinator().library().total_clips(), 1);
        assert_eq!(fixture.store.writes(), 1);
    }

    #[test]
    fn test_failed_save_is_notified() {
        let mut fixture = fixture();
        fixture.store.fail_writes(true);
        fixture.board.handle(
            Command::AddClips(vec![clip_upload(Trigger::Save, "parade.mp3", 0.1, 8000)]),
            Instant::now(),
        );

        let messages = fixture.notifier.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("write"));
        // Kept in memory regardless.
        assert_eq!(fixture.board.coordinator().library().total_clips(), 1);
    }

    #[test]
    fn test_removing_unknown_clip_is_notified() {
        let mut fixture = fixture();
        fixture.board.handle(
            Command::RemoveClip(Trigger::Goal, "missing".to_string()),
            Instant::now(),
        );
        assert_eq!(fixture.notifier.messages().len(), 1);
        assert_eq!(fixture.store.writes(), 0);
    }

    #[test]
    fn test_clips_decode_in_background() {
        let mut fixture = fixture();
        let now = Instant::now();
        fixture.board.handle(
            Command::AddClips(vec![clip_upload(Trigger::Save, "parade.mp3", 0.2, 8000)]),
            now,
        );
        assert_eq!(fixture.board.pending_decodes(), 1);

        let decoded = fixture
            .board
            .decoded_rx
            .recv_timeout(Duration::from_secs(5))
            .unwrap();
        fixture.board.handle_decoded(decoded);
        assert_eq!(fixture.board.pending_decodes(), 0);
        assert_eq!(fixture.board.coordinator().library().cached(), 1);
    }

    #[test]
    fn test_loaded_clips_decode_at_startup() {
        let payload = wav_bytes(&[0.5; 800], 1, 8000);
        let mut stored = StoredLibrary::new();
        stored.insert(
            Trigger::Goal.key().to_string(),
            vec![StoredClip {
                name: "jubel".to_string(),
                payload,
            }],
        );
        let mut fixture = fixture_with(MemoryStore::with_library(stored));

        assert_eq!(fixture.backend.opened(), 1);
        assert_eq!(fixture.board.pending_decodes(), 1);

        let decoded = fixture
            .board
            .decoded_rx
            .recv_timeout(Duration::from_secs(5))
            .unwrap();
        fixture.board.handle_decoded(decoded);
        assert_eq!(fixture.board.coordinator().library().cached(), 1);
    }

    #[test]
    fn test_failed_decode_is_not_retried() {
        let mut fixture = fixture();
        let now = Instant::now();
        fixture.board.handle(
            Command::AddClips(vec![Upload::new(
                Trigger::Goal,
                "kaputt.mp3",
                None,
                vec![0x42; 64],
            )]),
            now,
        );
        assert_eq!(fixture.board.pending_decodes(), 1);

        let decoded = fixture
            .board
            .decoded_rx
            .recv_timeout(Duration::from_secs(5))
            .unwrap();
        fixture.board.handle_decoded(decoded);
        assert_eq!(fixture.board.pending_decodes(), 0);

        fixture.board.handle(
            Command::AddClips(vec![clip_upload(Trigger::Save, "parade.mp3", 0.1, 8000)]),
            now,
        );
        assert_eq!(fixture.board.pending_decodes(), 1);

        let decoded = fixture
            .board
            .decoded_rx
            .recv_timeout(Duration::from_secs(5))
            .unwrap();
        fixture.board.handle_decoded(decoded);
        assert_eq!(fixture.board.pending_decodes(), 0);
        assert_eq!(fixture.board.coordinator().library().cached(), 1);

        // Re-adding gives the clip a new identity, so it is tried again.
        fixture.board.handle(Command::ClearClips(Trigger::Goal), now);
        fixture.board.handle(
            Command::AddClips(vec![Upload::new(
                Trigger::Goal,
                "kaputt.mp3",
                None,
                vec![0x42; 64],
            )]),
            now,
        );
        assert_eq!(fixture.board.pending_decodes(), 1);
    }

    #[test]
    fn test_source_events_end_entries() {
        let mut fixture = fixture();
        fixture
            .board
            .handle(Command::Activate(Trigger::Save), Instant::now());
        fixture
            .backend
            .context()
            .unwrap()
            .render_for(Duration::from_millis(1100));

        assert_eq!(fixture.board.drain_source_events(), 1);
        assert!(fixture.board.coordinator().state().is_idle());
        assert_eq!(
            fixture.sink.last().map(|status| status.phase),
            Some(PlaybackPhase::Idle)
        );
    }

    #[test]
    fn test_run_until_shutdown() {
        let fixture = fixture();
        let (tx, rx) = crossbeam_channel::unbounded();
        let board = fixture.board;
        let handle = thread::spawn(move || board.run(rx));

        tx.send(Command::Activate(Trigger::Victory)).unwrap();
        tx.send(Command::SetVolume(0.3)).unwrap();
        tx.send(Command::Shutdown).unwrap();
        handle.join().unwrap();

        let published = fixture.sink.published();
        assert!(published
            .iter()
            .any(|status| status.phase == PlaybackPhase::Playing));
        assert_eq!(
            published.last().map(|status| status.phase),
            Some(PlaybackPhase::Idle)
        );
        assert_eq!(
            fixture.backend.context().unwrap().state(),
            ContextState::Closed
        );
    }

    #[test]
    fn test_run_stops_when_senders_are_gone() {
        let fixture = fixture();
        let (tx, rx) = crossbeam_channel::unbounded::<Command>();
        let board = fixture.board;
        let handle = thread::spawn(move || board.run(rx));
        drop(tx);
        handle.join().unwrap();
        assert_eq!(fixture.backend.opened(), 1);
        assert_eq!(
            fixture.backend.context().unwrap().state(),
            ContextState::Closed
        );
    }
}
