//! Listener-Registrierung für Transport-Events
//!
//! Jede Registrierung liefert eine [`EventSubscription`] zurück. Solange sie
//! lebt, empfängt sie alle Events in Eingangsreihenfolge; beim Drop wird der
//! Listener automatisch abgemeldet. Ein vergessenes `off()` gibt es damit
//! nicht mehr.

use super::messages::TransportEvent;
use futures::Stream;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tokio::sync::mpsc;

type ListenerMap = HashMap<u64, mpsc::UnboundedSender<TransportEvent>>;

// ============================================================================
// EVENT EMITTER
// ============================================================================

/// Listener-Tabelle für Transport-Implementierungen
#[derive(Debug, Clone, Default)]
pub struct EventEmitter {
    listeners: Arc<Mutex<ListenerMap>>,
    next_id: Arc<AtomicU64>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registriert einen neuen Listener
    pub fn listen(&self) -> EventSubscription {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        // Unbounded: Events dürfen während eines laufenden Subscribe nicht verloren gehen
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.lock().insert(id, tx);

        tracing::debug!("Transport listener {} registered", id);

        EventSubscription {
            rx,
            _guard: ListenerGuard {
                id,
                listeners: Arc::downgrade(&self.listeners),
            },
        }
    }

    /// Verteilt ein Event an alle registrierten Listener
    ///
    /// Gibt die Anzahl der erreichten Listener zurück.
    pub fn emit(&self, event: TransportEvent) -> usize {
        let mut listeners = self.listeners.lock();
        listeners.retain(|_, tx| tx.send(event.clone()).is_ok());
        listeners.len()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

// ============================================================================
// LISTENER GUARD
// ============================================================================

/// Meldet den zugehörigen Listener beim Drop ab
#[derive(Debug)]
pub struct ListenerGuard {
    id: u64,
    listeners: Weak<Mutex<ListenerMap>>,
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            if listeners.lock().remove(&self.id).is_some() {
                tracing::debug!("Transport listener {} unregistered", self.id);
            }
        }
    }
}

// ============================================================================
// EVENT SUBSCRIPTION
// ============================================================================

/// Empfangsseite einer Listener-Registrierung
#[derive(Debug)]
pub struct EventSubscription {
    rx: mpsc::UnboundedReceiver<TransportEvent>,
    _guard: ListenerGuard,
}

impl EventSubscription {
    /// Wartet auf das nächste Event
    ///
    /// Gibt `None` zurück, sobald die Transport-Session keine Events mehr
    /// liefern kann.
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }

    /// Meldet den Listener explizit ab
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Stream for EventSubscription {
    type Item = TransportEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaKind;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let emitter = EventEmitter::new();
        let mut subscription = emitter.listen();

        emitter.emit(TransportEvent::published("u1", MediaKind::Audio));
        emitter.emit(TransportEvent::published("u1", MediaKind::Video));
        emitter.emit(TransportEvent::left("u1"));

        assert_eq!(
            subscription.recv().await,
            Some(TransportEvent::published("u1", MediaKind::Audio))
        );
        assert_eq!(
            subscription.next().await,
            Some(TransportEvent::published("u1", MediaKind::Video))
        );
        assert_eq!(subscription.recv().await, Some(TransportEvent::left("u1")));
    }

    #[test]
    fn test_drop_unregisters_listener() {
        let emitter = EventEmitter::new();
        let first = emitter.listen();
        let second = emitter.listen();
        assert_eq!(emitter.listener_count(), 2);

        drop(first);
        assert_eq!(emitter.listener_count(), 1);

        second.unsubscribe();
        assert_eq!(emitter.listener_count(), 0);
        assert_eq!(emitter.emit(TransportEvent::left("u1")), 0);
    }

    #[test]
    fn test_guard_outliving_emitter() {
        let emitter = EventEmitter::new();
        let subscription = emitter.listen();

        drop(emitter);
        // Abmelden ohne Emitter darf nicht paniken
        drop(subscription);
    }
}
