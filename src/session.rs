//! The coffee-maker session: connection state machine, heartbeat task, and
//! statistics request flow.
//!
//! All mutable session state lives behind one `SyncMutex`; writes are
//! serialised by holding that lock across the synchronous transport call.
//! The heartbeat task is a plain `std::thread` cooperating through a
//! `tokio_util::sync::CancellationToken` rather than an async runtime.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::adapter::{Adapter, AdapterEvent};
use crate::catalog::{Joe, MachineCatalog};
use crate::commands::{self, Write};
use crate::error::Error;
use crate::events::{Dispatcher, Event};
use crate::uuid::CharacteristicId;
use crate::wire::about::AboutRecord;
use crate::wire::advert::ManufacturerRecord;
use crate::wire::stats::{decode_readiness, StatisticsData, StatisticsMode, StatisticsReadiness};
use crate::wire::status::decode_alerts;
use crate::SyncMutex;

/// Interval between heartbeat ticks.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);
/// Poll interval and retry cap for the statistics-ready loop.
const STATS_POLL_INTERVAL: Duration = Duration::from_millis(500);
const STATS_POLL_ATTEMPTS: u32 = 20;

/// The session's connection state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

#[derive(Debug)]
struct Inner<A: Adapter> {
    state: SessionState,
    key: u8,
    handle: Option<A::Handle>,
    joe: Option<Arc<Joe>>,
    active_alerts: Vec<usize>,
}

impl<A: Adapter> Inner<A> {
    fn new() -> Self {
        Self {
            state: SessionState::Disconnected,
            key: 0,
            handle: None,
            joe: None,
            active_alerts: Vec::new(),
        }
    }
}

/// State shared between the caller thread and the heartbeat thread. Every
/// operation that touches the adapter handle or `key` takes this, not the
/// outer [`Session`], so both sides call the exact same code path.
#[derive(Debug)]
struct Shared<A: Adapter> {
    adapter: A,
    catalog: Arc<MachineCatalog>,
    xml_dir: PathBuf,
    inner: SyncMutex<Inner<A>>,
    dispatcher: SyncMutex<Dispatcher>,
}

impl<A: Adapter> Shared<A> {
    fn write(&self, write: Write) -> crate::Result<()> {
        let inner = self.inner.lock();
        let handle = inner
            .handle
            .as_ref()
            .ok_or_else(|| Error::SessionInvalid("not connected".into()))?;
        let encoded = write.encode(inner.key);
        self.adapter
            .write_characteristic(handle, write.characteristic.uuid(), &encoded)
    }

    fn read(&self, characteristic: CharacteristicId) -> crate::Result<Vec<u8>> {
        let inner = self.inner.lock();
        let handle = inner
            .handle
            .as_ref()
            .ok_or_else(|| Error::SessionInvalid("not connected".into()))?;
        self.adapter.read_characteristic(handle, characteristic.uuid())
    }

    fn set_state(&self, new: SessionState) {
        let changed = {
            let mut inner = self.inner.lock();
            if inner.state == new {
                false
            } else {
                inner.state = new;
                true
            }
        };
        if changed {
            self.dispatcher.lock().publish(Event::StateChanged(new));
        }
    }

    /// Reads Machine-Status, decodes the active alert set, and publishes an
    /// [`Event::AlertsChanged`] iff the set changed. Never called before the
    /// session key has been established.
    fn refresh_alerts(&self) {
        let raw = match self.read(CharacteristicId::MachineStatus) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "machine-status read failed");
                return;
            }
        };
        let key = self.inner.lock().key;
        let Some(bits) = decode_alerts(&raw, key) else {
            return;
        };
        self.apply_alert_bits(bits);
    }

    fn apply_alert_bits(&self, bits: Vec<usize>) {
        let (changed, joe) = {
            let mut inner = self.inner.lock();
            if inner.active_alerts == bits {
                (false, None)
            } else {
                inner.active_alerts = bits.clone();
                (true, inner.joe.clone())
            }
        };
        if !changed {
            return;
        }
        let names = joe.map_or_else(Vec::new, |joe| {
            bits.iter()
                .filter_map(|bit| joe.alerts.iter().find(|a| a.bit == *bit))
                .map(|a| a.name.clone())
                .collect()
        });
        self.dispatcher.lock().publish(Event::AlertsChanged(names));
    }

    /// Drains adapter events queued for the current handle. Returns `true`
    /// if an unsolicited disconnect was among them.
    fn drain_adapter_events(&self) -> bool {
        let events = {
            let inner = self.inner.lock();
            inner.handle.as_ref().map_or_else(Vec::new, |h| h.poll_events())
        };
        let mut disconnected = false;
        for event in events {
            match event {
                AdapterEvent::Disconnected => disconnected = true,
                AdapterEvent::Notification { uuid, data } => self.handle_notification(uuid, &data),
            }
        }
        disconnected
    }

    fn handle_notification(&self, uuid: crate::uuid::Uuid, data: &[u8]) {
        match CharacteristicId::from_uuid(uuid) {
            Some(CharacteristicId::MachineStatus) => {
                let key = self.inner.lock().key;
                if let Some(bits) = decode_alerts(data, key) {
                    self.apply_alert_bits(bits);
                }
            }
            Some(CharacteristicId::ProductProgress) => {
                let key = self.inner.lock().key;
                let decoded = bluefrog_codec::enc_dec(data, key);
                self.dispatcher.lock().publish(Event::ProductProgress(decoded));
            }
            _ => {}
        }
    }

    /// Unsolicited-disconnect teardown, run from the heartbeat thread
    /// itself: it cannot join its own `JoinHandle`, so it finalises state
    /// and drops the adapter handle directly rather than calling
    /// [`Session::disconnect`]: an adapter callback must not re-enter the
    /// session's connect/disconnect entry points synchronously.
    fn teardown_from_heartbeat(&self) {
        self.set_state(SessionState::Disconnecting);
        let handle = self.inner.lock().handle.take();
        if let Some(handle) = handle {
            self.adapter.disconnect(&handle);
        }
        self.set_state(SessionState::Disconnected);
    }
}

/// A live connection to one BlueFrog machine over one [`Adapter`] handle.
///
/// `A::Handle` is exclusively owned by the session; nothing outside this
/// module touches the adapter.
#[derive(Debug)]
pub struct Session<A: Adapter + 'static> {
    shared: Arc<Shared<A>>,
    heartbeat_cancel: SyncMutex<CancellationToken>,
    heartbeat_handle: SyncMutex<Option<std::thread::JoinHandle<()>>>,
}

impl<A: Adapter + 'static> Session<A> {
    /// Builds a session over `adapter`, looking up machine descriptions in
    /// `catalog` and loading per-model XML files from `xml_dir`.
    pub fn new(adapter: A, catalog: Arc<MachineCatalog>, xml_dir: impl Into<PathBuf>) -> Self {
        Self {
            shared: Arc::new(Shared {
                adapter,
                catalog,
                xml_dir: xml_dir.into(),
                inner: SyncMutex::new(Inner::new()),
                dispatcher: SyncMutex::new(Dispatcher::new()),
            }),
            heartbeat_cancel: SyncMutex::new(CancellationToken::new()),
            heartbeat_handle: SyncMutex::new(None),
        }
    }

    /// Registers a new event subscriber.
    pub fn subscribe(&self) -> std::sync::mpsc::Receiver<Event> {
        self.shared.dispatcher.lock().subscribe()
    }

    /// The session's current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.shared.inner.lock().state
    }

    /// The currently selected Machine Description, if connected.
    #[must_use]
    pub fn joe(&self) -> Option<Arc<Joe>> {
        self.shared.inner.lock().joe.clone()
    }

    /// Connects to `address`, derives the session key from the
    /// manufacturer advertisement, selects the Machine Description, and
    /// starts the heartbeat.
    pub fn connect(&self, address: &str) -> crate::Result<()> {
        self.shared.set_state(SessionState::Connecting);

        let handle = match self.shared.adapter.connect(address) {
            Ok(handle) => handle,
            Err(e) => {
                self.shared.set_state(SessionState::Disconnected);
                return Err(e);
            }
        };

        if let Err(e) = self.establish(handle) {
            self.shared.set_state(SessionState::Disconnected);
            self.shared
                .dispatcher
                .lock()
                .publish(Event::SessionFailure(e.to_string()));
            return Err(e);
        }

        *self.heartbeat_cancel.lock() = CancellationToken::new();
        self.spawn_heartbeat();
        Ok(())
    }

    /// The post-connect setup: parse the advert, select the Joe, write the
    /// initial heartbeat, read About. Any failure here tears down the
    /// adapter handle and returns an error; the caller transitions state.
    fn establish(&self, handle: A::Handle) -> crate::Result<()> {
        let man_data = self.shared.adapter.manufacturer_data(&handle);
        let record = ManufacturerRecord::parse(&man_data).map_err(|e| {
            self.shared.adapter.disconnect(&handle);
            e
        })?;

        let machine = self
            .shared
            .catalog
            .lookup(u64::from(record.article_number))
            .cloned()
            .ok_or_else(|| {
                self.shared.adapter.disconnect(&handle);
                Error::SessionInvalid(format!(
                    "article number {} not in catalog",
                    record.article_number
                ))
            })?;

        let joe = crate::catalog::load_joe(&machine, &self.shared.xml_dir).map_err(|e| {
            self.shared.adapter.disconnect(&handle);
            e
        })?;
        let joe = Arc::new(joe);

        {
            let mut inner = self.shared.inner.lock();
            inner.key = record.key;
            inner.handle = Some(handle);
            inner.joe = Some(joe.clone());
        }
        self.shared.set_state(SessionState::Connected);
        self.shared
            .dispatcher
            .lock()
            .publish(Event::ManufacturerData(record));
        self.shared.dispatcher.lock().publish(Event::JoeChanged(joe));

        self.shared.write(commands::heartbeat())?;

        let about_raw = self.shared.read(CharacteristicId::About)?;
        let about = AboutRecord::parse(&about_raw)?;
        self.shared.dispatcher.lock().publish(Event::About(about));

        Ok(())
    }

    /// Tears the connection down: writes the disconnect hint, stops the
    /// heartbeat, releases the adapter handle.
    pub fn disconnect(&self) {
        let should_proceed = matches!(
            self.shared.inner.lock().state,
            SessionState::Connecting | SessionState::Connected
        );
        if !should_proceed {
            return;
        }
        self.shared.set_state(SessionState::Disconnecting);
        if let Err(e) = self.shared.write(commands::disconnect_hint()) {
            warn!(error = %e, "disconnect hint write failed");
        }
        self.heartbeat_cancel.lock().cancel();
        if let Some(join) = self.heartbeat_handle.lock().take() {
            let _ = join.join();
        }
        let handle = self.shared.inner.lock().handle.take();
        if let Some(handle) = handle {
            self.shared.adapter.disconnect(&handle);
        }
        self.shared.set_state(SessionState::Disconnected);
    }

    /// Requests one statistics category, blocking the caller for up to
    /// ~10 s.
    pub fn request_statistics(&self, mode: StatisticsMode) -> crate::Result<()> {
        self.shared.write(commands::statistics_request(mode))?;

        let mut ready = false;
        for _ in 0..STATS_POLL_ATTEMPTS {
            std::thread::sleep(STATS_POLL_INTERVAL);
            let raw = self.shared.read(CharacteristicId::StatisticsCommand)?;
            let key = self.shared.inner.lock().key;
            if decode_readiness(&raw, key) == StatisticsReadiness::Ready {
                ready = true;
                break;
            }
        }
        if !ready {
            debug!(?mode, "statistics poll exhausted retries, reading anyway");
        }

        let raw = self.shared.read(CharacteristicId::StatisticsData)?;
        let key = self.shared.inner.lock().key;
        let data = StatisticsData::decode(&raw, key, mode);
        self.dispatch_statistics(mode, &data);
        Ok(())
    }

    fn dispatch_statistics(&self, mode: StatisticsMode, data: &StatisticsData) {
        match mode {
            StatisticsMode::ProductCounters => {
                if let Some(joe) = self.shared.inner.lock().joe.clone() {
                    joe.apply_product_counters(data);
                }
                self.shared.dispatcher.lock().publish(Event::ProductCounters);
            }
            StatisticsMode::MaintenanceCounter => {
                let count = self
                    .shared
                    .inner
                    .lock()
                    .joe
                    .as_ref()
                    .map_or(0, |j| j.maintenance_counter_labels.len());
                let values = (0..count).map(|i| data.slot(i)).collect();
                self.shared
                    .dispatcher
                    .lock()
                    .publish(Event::MaintenanceCounters(values));
            }
            StatisticsMode::MaintenancePercent => {
                let count = self
                    .shared
                    .inner
                    .lock()
                    .joe
                    .as_ref()
                    .map_or(0, |j| j.maintenance_percent_labels.len());
                let values = (0..count).map(|i| data.slot(i)).collect();
                self.shared
                    .dispatcher
                    .lock()
                    .publish(Event::MaintenancePercents(values));
            }
        }
    }

    /// Issues a product-start write for `product`.
    pub fn start_product(&self, product: &crate::catalog::Product) -> crate::Result<()> {
        self.shared.write(commands::product(product)?)
    }

    /// Issues the default, unparameterised coffee command.
    pub fn start_default_coffee(&self) -> crate::Result<()> {
        self.shared.write(commands::default_coffee()?)
    }

    /// Issues the lock/unlock-UI command.
    pub fn set_ui_locked(&self, locked: bool) -> crate::Result<()> {
        self.shared.write(if locked {
            commands::lock_ui()
        } else {
            commands::unlock_ui()
        })
    }

    /// Issues the graceful-shutdown P-Mode command. Distinct
    /// from [`Session::disconnect`]: this asks the machine to power down,
    /// it does not tear down the local connection or stop the heartbeat.
    pub fn request_shutdown(&self) -> crate::Result<()> {
        self.shared.write(commands::shutdown())
    }

    fn spawn_heartbeat(&self) {
        let shared = self.shared.clone();
        let cancel = self.heartbeat_cancel.lock().clone();
        let join = std::thread::spawn(move || loop {
            if cancel.is_cancelled() {
                break;
            }
            let state = shared.inner.lock().state;
            if !matches!(state, SessionState::Connected | SessionState::Connecting) {
                break;
            }
            if let Err(e) = shared.write(commands::heartbeat()) {
                warn!(error = %e, "heartbeat write failed");
            }
            shared.refresh_alerts();
            if shared.drain_adapter_events() {
                shared.teardown_from_heartbeat();
                break;
            }
            std::thread::sleep(HEARTBEAT_INTERVAL);
        });
        *self.heartbeat_handle.lock() = Some(join);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::simulated::SimulatedAdapter;
    use crate::catalog::Machine;
    use std::time::Instant;

    fn sample_catalog_and_xml() -> (Arc<MachineCatalog>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("test_machine.xml"),
            r#"<JOE dated="2024-01-01">
                <PRODUCTS>
                  <PRODUCT Name="Espresso" Code="04"/>
                </PRODUCTS>
                <ALERTS>
                  <ALERT Bit="0" Name="Water tank empty"/>
                </ALERTS>
              </JOE>"#,
        )
        .unwrap();
        let catalog = MachineCatalog::from_entries_for_test(vec![Machine {
            article_number: 1000,
            name: "Test Machine".into(),
            file_stem: "test_machine".into(),
            version: 1,
        }]);
        (Arc::new(catalog), dir)
    }

    #[test]
    fn connect_reaches_connected_and_heartbeats() {
        let (catalog, dir) = sample_catalog_and_xml();
        let adapter = SimulatedAdapter::new(0x2A, 1000);
        let session = Session::new(adapter, catalog, dir.path());
        let rx = session.subscribe();
        session.connect("sim-address").unwrap();
        assert_eq!(session.state(), SessionState::Connected);

        let mut saw_connected = false;
        let deadline = Instant::now() + Duration::from_millis(1500);
        while Instant::now() < deadline {
            match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                Ok(Event::StateChanged(SessionState::Connected)) => {
                    saw_connected = true;
                    break;
                }
                Ok(_) => continue,
                Err(_) => break,
            }
        }
        assert!(saw_connected);
        session.disconnect();
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[test]
    fn request_statistics_completes() {
        let (catalog, dir) = sample_catalog_and_xml();
        let adapter = SimulatedAdapter::new(0x2A, 1000);
        let session = Session::new(adapter, catalog, dir.path());
        session.connect("sim-address").unwrap();
        session
            .request_statistics(StatisticsMode::ProductCounters)
            .unwrap();
        session.disconnect();
    }
}
