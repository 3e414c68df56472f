//! Full session happy-path integration test, run against the crate's own
//! `SimulatedAdapter` through the `testing` feature: state-machine
//! monotonicity and heartbeat cadence, exercised end to end rather than
//! unit by unit.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bluefrog::adapter::simulated::SimulatedAdapter;
use bluefrog::catalog::{Machine, MachineCatalog};
use bluefrog::wire::stats::StatisticsMode;
use bluefrog::{Event, Session, SessionState};

const SAMPLE_XML: &str = r#"<JOE dated="2024-01-01">
    <PRODUCTS>
      <PRODUCT Name="Espresso" Code="04">
        <COFFEE_STRENGTH Argument="F2" Default="03">
          <ITEM Name="Mild" Value="01"/>
          <ITEM Name="Normal" Value="03"/>
        </COFFEE_STRENGTH>
      </PRODUCT>
    </PRODUCTS>
    <ALERTS>
      <ALERT Bit="0" Name="Water tank empty"/>
    </ALERTS>
  </JOE>"#;

fn sample_catalog_and_xml() -> (Arc<MachineCatalog>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("test_machine.xml"), SAMPLE_XML).unwrap();
    let catalog = MachineCatalog::from_entries_for_test(vec![Machine {
        article_number: 1000,
        name: "Test Machine".into(),
        file_stem: "test_machine".into(),
        version: 1,
    }]);
    (Arc::new(catalog), dir)
}

#[test]
fn full_session_happy_path() {
    let (catalog, dir) = sample_catalog_and_xml();
    let adapter = SimulatedAdapter::new(0x2A, 1000);
    let session = Session::new(adapter, catalog, dir.path());
    let rx = session.subscribe();

    let mut observed_states = Vec::new();

    session.connect("sim-address").unwrap();
    assert_eq!(session.state(), SessionState::Connected);

    // At least one heartbeat observed within 1.5s.
    let deadline = Instant::now() + Duration::from_millis(1500);
    while Instant::now() < deadline {
        match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Ok(Event::StateChanged(state)) => observed_states.push(state),
            Ok(_) => continue,
            Err(_) => break,
        }
    }
    assert!(observed_states.contains(&SessionState::Connecting));
    assert!(observed_states.contains(&SessionState::Connected));

    session
        .request_statistics(StatisticsMode::ProductCounters)
        .unwrap();
    let joe = session.joe().unwrap();
    assert_eq!(joe.total_products(), 5);
    assert_eq!(joe.products[0].counter(), 2);

    session.disconnect();
    assert_eq!(session.state(), SessionState::Disconnected);

    // Drain the rest of the channel and check state transitions were a
    // valid prefix of CONNECTING?, CONNECTED?, DISCONNECTING, DISCONNECTED,
    // ignoring non-state events interleaved by the heartbeat.
    let mut trailing_states = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let Event::StateChanged(state) = event {
            trailing_states.push(state);
        }
    }
    assert_eq!(
        trailing_states.last().copied(),
        Some(SessionState::Disconnected)
    );
}

#[test]
fn product_and_ui_commands_round_trip_through_the_adapter() {
    let (catalog, dir) = sample_catalog_and_xml();
    let adapter = SimulatedAdapter::new(0x17, 1000);
    let session = Session::new(adapter, catalog, dir.path());
    session.connect("sim-address").unwrap();

    let joe = session.joe().unwrap();
    let espresso = joe.products.iter().find(|p| p.code == "04").unwrap();
    session.start_product(espresso).unwrap();
    session.set_ui_locked(true).unwrap();
    session.start_default_coffee().unwrap();
    session.request_shutdown().unwrap();

    session.disconnect();
}

#[test]
fn reconnect_after_disconnect_starts_a_fresh_heartbeat() {
    let (catalog, dir) = sample_catalog_and_xml();
    let adapter = SimulatedAdapter::new(0x2A, 1000);
    let session = Session::new(adapter, catalog, dir.path());

    session.connect("sim-address").unwrap();
    session.disconnect();
    assert_eq!(session.state(), SessionState::Disconnected);

    session.connect("sim-address").unwrap();
    assert_eq!(session.state(), SessionState::Connected);
    session.disconnect();
    assert_eq!(session.state(), SessionState::Disconnected);
}
