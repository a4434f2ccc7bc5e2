//! Outward event channel.
//!
//! The state machine publishes typed, fire-and-forget [`CompanionEvent`]s
//! over a single sum-typed channel. Consumers (dashboard, overlays) subscribe
//! once and receive every kind through the same receiver, decoupling their
//! cadence from ingestion. During backfill the bus is suppressed so replaying
//! history does not replay UI updates.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::trace;

use crate::commander::CommanderState;
use crate::journal::{BodySignals, SurfaceContact};

/// Everything the engine announces to the outside world.
#[derive(Debug, Clone)]
pub enum CompanionEvent {
    /// The current system changed (jump, relog, or backfill refresh).
    SystemChanged {
        /// System name.
        system: String,
    },
    /// A body was scanned.
    BodyScanned {
        /// System the body belongs to.
        system: String,
        /// Journal body name.
        body_name: String,
    },
    /// A body was surface-mapped.
    BodyMapped {
        /// Journal body name.
        body_name: String,
    },
    /// Signal counts on a body changed.
    BodySignalsUpdated(BodySignals),
    /// An organic scan stage completed.
    BioScanned {
        /// Localized species name.
        species: String,
        /// Stage reached (1..=3).
        stage: u8,
    },
    /// An organism was scanned that the body's signal survey did not predict.
    ExobiologyMismatch {
        /// Body index within the current system.
        body_id: i64,
        /// Localized genus that was not in the predicted list.
        genus: String,
    },
    /// The tailer switched to a new journal file.
    FileChanged {
        /// Name of the file now being tailed.
        file: String,
    },
    /// The journal continued into a new part file mid-session.
    Continued {
        /// Part number.
        part: u32,
    },
    /// A play session started.
    GameStarted {
        /// Session start time.
        at: DateTime<Utc>,
    },
    /// A play session ended.
    GameStopped {
        /// Session end time.
        at: DateTime<Utc>,
    },
    /// Arrived somewhere by fleet-carrier jump.
    CarrierJumped {
        /// Destination system.
        system: String,
    },
    /// Every body in the system has been found.
    AllBodiesFound {
        /// System name.
        system: String,
        /// Body count.
        count: u32,
    },
    /// A navigation route was plotted.
    RoutePlotted,
    /// The navigation route was cleared.
    RouteCleared,
    /// Ship touched down on a surface.
    Touchdown(SurfaceContact),
    /// Ship lifted off a surface.
    Liftoff(SurfaceContact),
    /// Commander set foot on a body.
    BodyFootfalled(SurfaceContact),
    /// Commander state changed (ranks, reputation, credits, ship, ...).
    CommanderUpdated(CommanderState),
}

/// Fire-and-forget publisher for [`CompanionEvent`]s.
///
/// Cloning is cheap; all clones share the suppression flag. Without a
/// subscriber, or while suppressed, events are dropped silently.
#[derive(Clone)]
pub struct EventBus {
    tx: Option<mpsc::UnboundedSender<CompanionEvent>>,
    suppressed: Arc<AtomicBool>,
}

impl EventBus {
    /// Create a bus plus the receiving half for the single consumer.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<CompanionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: Some(tx),
                suppressed: Arc::new(AtomicBool::new(false)),
            },
            rx,
        )
    }

    /// Create a bus with no subscriber; every emit is a no-op.
    #[must_use]
    pub fn disconnected() -> Self {
        Self {
            tx: None,
            suppressed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Publish an event. Dropped when suppressed or unsubscribed.
    pub fn emit(&self, event: CompanionEvent) {
        if self.suppressed.load(Ordering::Relaxed) {
            trace!(?event, "event suppressed");
            return;
        }
        if let Some(tx) = &self.tx {
            // A closed receiver is equivalent to no subscriber.
            let _ = tx.send(event);
        }
    }

    /// Publish even while suppressed (backfill's single completion refresh).
    pub fn emit_unsuppressed(&self, event: CompanionEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }

    /// Suppress or restore outward forwarding.
    pub fn set_suppressed(&self, suppressed: bool) {
        self.suppressed.store(suppressed, Ordering::Relaxed);
    }

    /// Whether forwarding is currently suppressed.
    #[must_use]
    pub fn is_suppressed(&self) -> bool {
        self.suppressed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_reach_subscriber() {
        let (bus, mut rx) = EventBus::channel();
        bus.emit(CompanionEvent::RoutePlotted);
        let received = rx.try_recv().expect("event");
        assert!(matches!(received, CompanionEvent::RoutePlotted));
    }

    #[test]
    fn suppression_drops_events() {
        let (bus, mut rx) = EventBus::channel();
        bus.set_suppressed(true);
        bus.emit(CompanionEvent::RouteCleared);
        assert!(rx.try_recv().is_err());

        bus.emit_unsuppressed(CompanionEvent::SystemChanged {
            system: "Sol".to_string(),
        });
        assert!(rx.try_recv().is_ok());

        bus.set_suppressed(false);
        bus.emit(CompanionEvent::RouteCleared);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn disconnected_bus_is_silent() {
        let bus = EventBus::disconnected();
        bus.emit(CompanionEvent::RoutePlotted);
        assert!(!bus.is_suppressed());
    }

    #[test]
    fn clones_share_suppression() {
        let (bus, _rx) = EventBus::channel();
        let clone = bus.clone();
        bus.set_suppressed(true);
        assert!(clone.is_suppressed());
    }
}
