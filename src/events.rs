//! Typed event fan-out: a single tagged enum published to every subscriber
//! over `std::sync::mpsc`, since dispatch runs on plain OS threads rather
//! than an async runtime.

use std::sync::Arc;

use crate::session::SessionState;
use crate::wire::about::AboutRecord;
use crate::wire::advert::ManufacturerRecord;

/// A single published event. Delivery is at-least-once, in order, per kind.
#[derive(Clone, Debug)]
pub enum Event {
    /// The session transitioned to a new state (fires only when the new
    /// state differs from the previous one).
    StateChanged(SessionState),
    /// The manufacturer advertisement was parsed at connect.
    ManufacturerData(ManufacturerRecord),
    /// The About characteristic was read and decoded.
    About(AboutRecord),
    /// The Machine Description was (re)selected; fires once per connect.
    JoeChanged(Arc<crate::catalog::Joe>),
    /// The set of asserted alert bits changed (fires only when the set
    /// differs from the previous one). Carries the display names of the
    /// currently active alerts, in bit order.
    AlertsChanged(Vec<String>),
    /// A `ProductCounters` statistics read completed.
    ProductCounters,
    /// A `MaintenanceCounter` statistics read completed.
    MaintenanceCounters(Vec<u32>),
    /// A `MaintenancePercent` statistics read completed.
    MaintenancePercents(Vec<u32>),
    /// A Product-Progress notification arrived; carries the decoded bytes
    /// as-is, with no further parsing.
    ProductProgress(Vec<u8>),
    /// A session-invalid failure occurred; the session has transitioned
    /// (or is transitioning) to DISCONNECTED.
    SessionFailure(String),
}

/// The session's fan-out list of event subscribers.
///
/// A `Vec` of senders rather than a single broadcast channel: keeps one
/// `mpsc::Sender` per subscribing connection and drops closed ones lazily
/// on send.
#[derive(Debug, Default)]
pub struct Dispatcher {
    subscribers: Vec<std::sync::mpsc::Sender<Event>>,
}

impl Dispatcher {
    /// Creates an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new subscriber, returning the receiving end.
    pub fn subscribe(&mut self) -> std::sync::mpsc::Receiver<Event> {
        let (tx, rx) = std::sync::mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    /// Publishes `event` to every live subscriber, dropping any whose
    /// receiver has gone away.
    pub fn publish(&mut self, event: Event) {
        self.subscribers
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_delivers_in_order_to_all_subscribers() {
        let mut d = Dispatcher::new();
        let rx1 = d.subscribe();
        let rx2 = d.subscribe();
        d.publish(Event::StateChanged(SessionState::Connecting));
        d.publish(Event::StateChanged(SessionState::Connected));
        for rx in [rx1, rx2] {
            assert!(matches!(
                rx.recv().unwrap(),
                Event::StateChanged(SessionState::Connecting)
            ));
            assert!(matches!(
                rx.recv().unwrap(),
                Event::StateChanged(SessionState::Connected)
            ));
        }
    }

    #[test]
    fn dropped_subscriber_is_pruned_without_error() {
        let mut d = Dispatcher::new();
        {
            let _rx = d.subscribe();
        }
        assert_eq!(d.subscribers.len(), 1);
        d.publish(Event::ProductCounters);
        assert_eq!(d.subscribers.len(), 0);
    }
}
