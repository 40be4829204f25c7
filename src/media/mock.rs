//! Mock Media für Tests
//!
//! Stellt Track- und Acquirer-Implementierungen bereit, die alle Aufrufe
//! protokollieren statt echte Hardware anzusprechen. Die Acquisition kann
//! angehalten werden, bis der Test sie freigibt.

use super::acquirer::{MediaAcquirer, MediaError};
use super::track::{MediaKind, SinkRef, TrackHandle};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

static NEXT_TRACK_ID: AtomicUsize = AtomicUsize::new(1);

// ============================================================================
// MOCK TRACK
// ============================================================================

/// Track, der seinen Zustand nur mitschreibt
#[derive(Debug)]
pub struct MockTrack {
    id: String,
    kind: MediaKind,
    enabled: AtomicBool,
    stopped: AtomicBool,
    close_count: AtomicUsize,
    played_in: Mutex<Vec<SinkRef>>,
}

impl MockTrack {
    pub fn new(kind: MediaKind) -> Arc<Self> {
        let n = NEXT_TRACK_ID.fetch_add(1, Ordering::SeqCst);
        Arc::new(Self {
            id: format!("{}-{}", kind, n),
            kind,
            enabled: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
            close_count: AtomicUsize::new(0),
            played_in: Mutex::new(Vec::new()),
        })
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.close_count() > 0
    }

    /// Anzahl der wirksamen `close()`-Aufrufe (höchstens 1)
    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }

    pub fn played_in(&self) -> Vec<SinkRef> {
        self.played_in.lock().clone()
    }
}

impl TrackHandle for MockTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn play(&self, sink: &SinkRef) {
        self.stopped.store(false, Ordering::SeqCst);
        self.played_in.lock().push(sink.clone());
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn close(&self) {
        // Zweites close() ist ein No-op
        let _ = self
            .close_count
            .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst);
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

// ============================================================================
// MOCK ACQUIRER
// ============================================================================

/// Acquirer, der frische Mock-Tracks ausgibt oder gezielt fehlschlägt
#[derive(Debug, Default)]
pub struct MockAcquirer {
    failure: Option<MediaError>,
    acquire_count: AtomicUsize,
    issued: Mutex<Vec<Arc<MockTrack>>>,
    acquire_gate: Option<Arc<Notify>>,
}

impl MockAcquirer {
    /// Acquirer, der immer Tracks liefert
    pub fn working() -> Self {
        Self::default()
    }

    /// Acquirer, der immer mit dem angegebenen Fehler abbricht
    pub fn failing(error: MediaError) -> Self {
        Self {
            failure: Some(error),
            ..Self::default()
        }
    }

    /// Acquisition wartet, bis [`MockAcquirer::release_acquire`] aufgerufen wird
    pub fn gated_acquire(mut self) -> Self {
        self.acquire_gate = Some(Arc::new(Notify::new()));
        self
    }

    pub fn release_acquire(&self) {
        if let Some(gate) = &self.acquire_gate {
            gate.notify_one();
        }
    }

    pub fn acquire_count(&self) -> usize {
        self.acquire_count.load(Ordering::SeqCst)
    }

    /// Alle bisher ausgegebenen Tracks (Audio, Video, Audio, ...)
    pub fn issued(&self) -> Vec<Arc<MockTrack>> {
        self.issued.lock().clone()
    }

    /// Prüft, ob jeder ausgegebene Track wieder geschlossen wurde
    pub fn all_released(&self) -> bool {
        self.issued.lock().iter().all(|t| t.is_closed())
    }
}

#[async_trait]
impl MediaAcquirer for MockAcquirer {
    async fn acquire_audio_video(
        &self,
    ) -> Result<(Arc<dyn TrackHandle>, Arc<dyn TrackHandle>), MediaError> {
        self.acquire_count.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.acquire_gate {
            gate.notified().await;
        }

        if let Some(error) = &self.failure {
            return Err(error.clone());
        }

        let audio = MockTrack::new(MediaKind::Audio);
        let video = MockTrack::new(MediaKind::Video);
        {
            let mut issued = self.issued.lock();
            issued.push(Arc::clone(&audio));
            issued.push(Arc::clone(&video));
        }

        let audio: Arc<dyn TrackHandle> = audio;
        let video: Arc<dyn TrackHandle> = video;
        Ok((audio, video))
    }
}
