//! Driver/CLI glue: scans for a machine by name, connects, logs every
//! session event, issues the requested command, and disconnects on Ctrl-C
//! or after the command completes.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use regex::Regex;
use tracing::{error, info, warn};

use bluefrog::adapter::btleplug_adapter::BtleplugAdapter;
use bluefrog::catalog::MachineCatalog;
use bluefrog::wire::stats::StatisticsMode;
use bluefrog::{Event, Session, SessionState};

/// Command-line driver for a BlueFrog coffee machine.
#[derive(Parser)]
#[command(name = "bluefrog-cli")]
#[command(author, version, about = "Drives a BlueFrog BLE coffee machine", long_about = None)]
struct Cli {
    /// Regex matched against the advertised device name.
    #[arg(short, long, default_value = "BlueFrog.*", global = true)]
    name: String,

    /// Path to `JOE_MACHINES.TXT`.
    #[arg(long, default_value = "JOE_MACHINES.TXT", global = true)]
    catalog: PathBuf,

    /// Directory containing per-model `<stem>.xml` files.
    #[arg(long, default_value = ".", global = true)]
    xml_dir: PathBuf,

    /// How long to scan before giving up.
    #[arg(long, default_value = "30", global = true)]
    scan_timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connect, print identity/alert/statistics events, then disconnect.
    Status,
    /// Connect and issue the unparameterised default-coffee command.
    DefaultCoffee,
    /// Connect and start a named product from the machine's catalog entry.
    Product {
        /// Product code as it appears in `<stem>.xml` (e.g. "04").
        code: String,
    },
    /// Connect and request one statistics category.
    Statistics {
        #[arg(value_enum)]
        mode: StatsModeArg,
    },
    /// Lock or unlock the machine's own front-panel UI.
    Ui {
        #[arg(value_enum)]
        state: UiStateArg,
    },
    /// Ask the machine to power down gracefully (does not affect the local
    /// connection; follow with the normal disconnect).
    Shutdown,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum StatsModeArg {
    Products,
    MaintenanceCounter,
    MaintenancePercent,
}

impl From<StatsModeArg> for StatisticsMode {
    fn from(arg: StatsModeArg) -> Self {
        match arg {
            StatsModeArg::Products => Self::ProductCounters,
            StatsModeArg::MaintenanceCounter => Self::MaintenanceCounter,
            StatsModeArg::MaintenancePercent => Self::MaintenancePercent,
        }
    }
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum UiStateArg {
    Lock,
    Unlock,
}

fn main() -> bluefrog::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let catalog = Arc::new(MachineCatalog::load(&cli.catalog)?);
    let adapter = BtleplugAdapter::open()?;
    let pattern = Regex::new(&cli.name)
        .map_err(|e| bluefrog::Error::ScanFailed(format!("bad --name pattern: {e}")))?;
    let cancel = tokio_util::sync::CancellationToken::new();
    {
        let cancel = cancel.clone();
        let timeout = Duration::from_secs(cli.scan_timeout_secs);
        std::thread::spawn(move || {
            std::thread::sleep(timeout);
            cancel.cancel();
        });
    }

    let (_name, address) = adapter
        .scan(&pattern, &cancel)?
        .ok_or_else(|| bluefrog::Error::ScanFailed("no matching peripheral found".into()))?;
    info!(%address, "found machine");

    let session = Arc::new(Session::new(adapter, catalog, cli.xml_dir));
    spawn_event_logger(&session);
    install_ctrlc_disconnect(&session);

    session.connect(&address)?;
    info!("connected");

    let result = run_command(&session, cli.command);

    session.disconnect();
    while session.state() != SessionState::Disconnected {
        std::thread::sleep(Duration::from_millis(50));
    }
    result
}

fn run_command(session: &Session<BtleplugAdapter>, command: Command) -> bluefrog::Result<()> {
    match command {
        Command::Status => {
            std::thread::sleep(Duration::from_secs(2));
            Ok(())
        }
        Command::DefaultCoffee => session.start_default_coffee(),
        Command::Product { code } => {
            let joe = session
                .joe()
                .ok_or_else(|| bluefrog::Error::SessionInvalid("no machine description".into()))?;
            let product = joe
                .products
                .iter()
                .find(|p| p.code == code)
                .ok_or_else(|| bluefrog::Error::Catalog(format!("unknown product code {code:?}")))?;
            session.start_product(product)
        }
        Command::Statistics { mode } => session.request_statistics(mode.into()),
        Command::Ui { state } => session.set_ui_locked(matches!(state, UiStateArg::Lock)),
        Command::Shutdown => session.request_shutdown(),
    }
}

/// Logs every session event at `info`.
fn spawn_event_logger(session: &Arc<Session<BtleplugAdapter>>) {
    let rx = session.subscribe();
    std::thread::spawn(move || {
        for event in rx {
            match event {
                Event::StateChanged(state) => info!(?state, "session state changed"),
                Event::ManufacturerData(record) => info!(?record, "manufacturer advertisement"),
                Event::About(about) => info!(?about, "about"),
                Event::JoeChanged(joe) => info!(machine = %joe.machine.name, "machine description selected"),
                Event::AlertsChanged(names) => info!(?names, "active alerts changed"),
                Event::ProductCounters => info!("product counters updated"),
                Event::MaintenanceCounters(values) => info!(?values, "maintenance counters"),
                Event::MaintenancePercents(values) => info!(?values, "maintenance percents"),
                Event::ProductProgress(bytes) => info!(?bytes, "product progress"),
                Event::SessionFailure(reason) => error!(%reason, "session failure"),
            }
        }
    });
}

/// Installs a Ctrl-C handler that disconnects the session exactly once.
fn install_ctrlc_disconnect(session: &Arc<Session<BtleplugAdapter>>) {
    let session = session.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        warn!("interrupted, disconnecting");
        session.disconnect();
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler");
    }
}
