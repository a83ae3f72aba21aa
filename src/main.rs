//! blecentral host binary.
//!
//! Runs the central-role scenarios against the platform Bluetooth stack
//! through btleplug:
//!
//! ```text
//! blecentral scan --seconds 5
//! blecentral scan --live
//! blecentral telemetry
//! blecentral heart-rate C4:7C:8D:6A:3E:01 F0:0D:1E:2A:44:90
//! blecentral badge C4:7C:8D:6A:3E:01 smiley.txt
//! ```
//!
//! `RUST_LOG=debug` shows the library's diagnostics.

mod host;

use std::fmt::Display;
use std::ops::ControlFlow;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use embassy_futures::select::{select3, Either3};
use embassy_time::{Duration, Timer};

use blecentral::command::bitmap::Bitmap;
use blecentral::config::{
    Dedup, BADGE_BANDS, BADGE_ROWS, BLE_CONNECT_TIMEOUT_MS, BLE_SCAN_CYCLE_MS, BLE_SCAN_DURATION_SECS,
};
use blecentral::error::{ConnectError, GattError};
use blecentral::profiles::device_info::{self, DeviceInfo};
use blecentral::profiles::proximity::{self, ProximityBroadcast};
use blecentral::profiles::telemetry::{self, Telemetry};
use blecentral::profiles::{alert_level, blink, explorer, heart_rate, led_badge};
use blecentral::{
    filter, with_session, Address, DeviceDescriptor, DisplayGeometry, Orchestrator, ScanConfig,
    Scanner, Session, SessionConfig,
};

use host::BtleplugAdapter;

#[derive(Parser)]
#[command(name = "blecentral", version, about = "Bluetooth Low Energy central-role scenarios")]
struct Cli {
    /// Deadline for a connection to come up, in milliseconds
    #[arg(long, global = true, default_value_t = BLE_CONNECT_TIMEOUT_MS)]
    connect_timeout_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List advertising devices
    Scan {
        #[arg(long, default_value_t = BLE_SCAN_DURATION_SECS)]
        seconds: u64,
        /// Print every advertisement as it arrives instead of a summary
        #[arg(long)]
        live: bool,
    },
    /// Print environment telemetry broadcasts until interrupted
    Telemetry,
    /// Print the service data carried by advertisements
    ServiceData {
        #[arg(long, default_value_t = BLE_SCAN_DURATION_SECS)]
        seconds: u64,
    },
    /// Print exposure notification broadcasts until interrupted
    Proximity,
    /// Look for LED name badges
    FindBadge {
        #[arg(long, default_value_t = BLE_SCAN_DURATION_SECS)]
        seconds: u64,
    },
    /// Read the device name, model number and manufacturer
    DeviceInfo { address: Address },
    /// Read the alert level
    AlertLevel {
        address: Address,
        /// Go through the link loss service instead of the first match
        #[arg(long)]
        via_link_loss: bool,
    },
    /// Make a device blink
    Blink { address: Address },
    /// Stream heart rate from one or more devices until interrupted
    HeartRate {
        #[arg(required = true)]
        addresses: Vec<Address>,
        /// Discovery window before connecting
        #[arg(long, default_value_t = BLE_SCAN_DURATION_SECS)]
        seconds: u64,
    },
    /// Print telemetry indications from a connected sensor until interrupted
    Indications { address: Address },
    /// Dump every service, characteristic and descriptor
    Explore { address: Address },
    /// Show a picture on an LED badge
    Badge {
        address: Address,
        /// Text file, one line per row, '#' lit and '.' unlit
        file: PathBuf,
        #[arg(long, default_value_t = BADGE_BANDS)]
        bands: usize,
        #[arg(long, default_value_t = BADGE_ROWS)]
        rows: usize,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let adapter = BtleplugAdapter::first()
        .await
        .context("no usable Bluetooth adapter")?;
    let config = SessionConfig::default()
        .with_connect_timeout(Duration::from_millis(cli.connect_timeout_ms));

    match cli.command {
        Command::Scan { seconds, live: true } => live_scan(&adapter, seconds).await?,
        Command::Scan { seconds, live: false } => {
            let devices = discover(&adapter, filter::any(), seconds).await?;
            for d in &devices {
                println!("{} {} {} dBm", d.address, d.name().unwrap_or("(unnamed)"), d.rssi);
            }
        }
        Command::Telemetry => {
            cycle_scan(&adapter, filter::manufacturer(telemetry::COMPANY_ID), |d| {
                Telemetry::from_advertisement(d).map(|t| format!("{}\n{t}", d.address))
            })
            .await?;
        }
        Command::ServiceData { seconds } => {
            let devices = discover(&adapter, filter::has_service_data(), seconds).await?;
            for d in &devices {
                println!("{}", d.address);
                for (uuid, data) in &d.service_data {
                    println!("- {uuid}: 0x{}", hex::encode(data));
                }
            }
        }
        Command::Proximity => {
            cycle_scan(
                &adapter,
                filter::service_data(proximity::SERVICE),
                ProximityBroadcast::from_advertisement,
            )
            .await?;
        }
        Command::FindBadge { seconds } => {
            let badges = discover(&adapter, filter::name_prefix(led_badge::NAME_PREFIX), seconds).await?;
            for d in &badges {
                println!("{} {} {} dBm", d.address, d.name().unwrap_or_default(), d.rssi);
            }
        }
        Command::DeviceInfo { address } => {
            if let Some(info) = connected(&adapter, address, config, async |s| DeviceInfo::read(s).await).await? {
                println!("{info}");
            }
        }
        Command::AlertLevel {
            address,
            via_link_loss,
        } => {
            let level = connected(&adapter, address, config, async |s| {
                if via_link_loss {
                    alert_level::read_link_loss(s).await
                } else {
                    alert_level::read(s).await
                }
            })
            .await?;
            match level {
                Some(Ok(level)) => println!("Alert level: {level} ({})", alert_level::describe(level)),
                Some(Err(e)) => println!("{address}: {e}"),
                None => {}
            }
        }
        Command::Blink { address } => {
            if let Some(Err(e)) = connected(&adapter, address, config, async |s| blink::blink(s).await).await? {
                log::debug!("{address}: {e}");
                println!("Can't blink device");
            }
        }
        Command::HeartRate { addresses, seconds } => {
            heart_rate_all(&adapter, &addresses, seconds, config).await?;
        }
        Command::Indications { address } => {
            if let Some(Err(e)) = connected(&adapter, address, config, async |s| indications(s).await).await? {
                println!("{address}: {e}");
            }
        }
        Command::Explore { address } => {
            if let Some(report) = connected(&adapter, address, config, async |s| explorer::explore(s).await).await? {
                for service in &report {
                    println!("{service}");
                }
            }
        }
        Command::Badge {
            address,
            file,
            bands,
            rows,
        } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("can't read {}", file.display()))?;
            let image: Bitmap = text
                .parse()
                .with_context(|| format!("bad picture in {}", file.display()))?;
            let geometry = DisplayGeometry::new(bands, rows);
            if let Some(Err(e)) = connected(&adapter, address, config, async |s| {
                led_badge::show(s, &image, geometry).await
            })
            .await?
            {
                println!("{address}: {e}");
            }
        }
    }
    Ok(())
}

async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        // No signal handler; run until the work ends on its own.
        core::future::pending::<()>().await;
    }
}

/// Devices matching `filter` seen during one discovery window.
async fn discover<F>(adapter: &BtleplugAdapter, filter: F, seconds: u64) -> Result<Vec<DeviceDescriptor>>
where
    F: Fn(&DeviceDescriptor) -> bool + 'static,
{
    let scanner = Scanner::new(adapter, ScanConfig::default());
    let devices = scanner.discover(filter, Duration::from_secs(seconds)).await?;
    if devices.is_empty() {
        println!("No devices found");
    }
    Ok(devices)
}

/// Print each advertisement as it arrives, duplicates included, until the
/// window closes or the operator interrupts.
async fn live_scan(adapter: &BtleplugAdapter, seconds: u64) -> Result<()> {
    let scanner = Scanner::new(adapter, ScanConfig { dedup: Dedup::Off });
    let mut sub = scanner.start(filter::any()).await?;
    let events = sub.for_each(|event| {
        println!("{}", event.device);
        ControlFlow::Continue(())
    });
    select3(events, Timer::after(Duration::from_secs(seconds)), interrupted()).await;
    sub.stop().await?;
    Ok(())
}

/// Print every advertisement `extract` understands until interrupted.
///
/// The scan session is restarted every cycle so a sensor that keeps
/// broadcasting new readings is reported again.
async fn cycle_scan<F, E, T>(adapter: &BtleplugAdapter, filter: F, mut extract: E) -> Result<()>
where
    F: Fn(&DeviceDescriptor) -> bool + 'static,
    E: FnMut(&DeviceDescriptor) -> Option<T>,
    T: Display,
{
    let scanner = Scanner::new(adapter, ScanConfig::default());
    let mut sub = scanner.start(filter).await?;
    let cycle = Duration::from_millis(BLE_SCAN_CYCLE_MS);
    loop {
        if !sub.is_active() {
            return Err(anyhow!("scan ended by the adapter"));
        }
        let window = async {
            while let Some((_, reading)) = sub.next_with(&mut extract).await {
                println!("{reading}\n");
            }
        };
        match select3(window, Timer::after(cycle), interrupted()).await {
            Either3::First(()) => {}
            Either3::Second(()) => scanner.restart().await?,
            Either3::Third(()) => break,
        }
    }
    sub.stop().await?;
    Ok(())
}

/// Run `f` on a ready session.  `None` when the device could not be
/// reached; that is reported to the operator, not treated as fatal.
async fn connected<'a, F, R>(
    adapter: &'a BtleplugAdapter,
    address: Address,
    config: SessionConfig,
    f: F,
) -> Result<Option<R>>
where
    F: AsyncFnOnce(&Session<'a, BtleplugAdapter>) -> R,
{
    match with_session(adapter, address, config, f).await {
        Ok(out) => Ok(Some(out)),
        Err(ConnectError::AdapterUnavailable) => Err(anyhow!(ConnectError::AdapterUnavailable)),
        Err(e) => {
            log::debug!("{address}: {e}");
            println!("Can't connect to device {address}.");
            Ok(None)
        }
    }
}

async fn indications(session: &Session<'_, BtleplugAdapter>) -> Result<(), GattError> {
    let mut sub = session.subscribe(telemetry::CHARACTERISTIC).await?;
    let readings = sub.for_each(|value| {
        match Telemetry::decode(value) {
            Ok(t) => println!("{t}\n"),
            Err(e) => log::debug!("{}: {e}", session.address()),
        }
        ControlFlow::Continue(())
    });
    match select3(readings, session.pump(), interrupted()).await {
        Either3::Second(Err(e)) => Err(e),
        _ => Ok(()),
    }
}

async fn heart_rate_all(
    adapter: &BtleplugAdapter,
    addresses: &[Address],
    seconds: u64,
    config: SessionConfig,
) -> Result<()> {
    let targets = discover(adapter, filter::addresses(addresses), seconds).await?;
    for missing in addresses
        .iter()
        .filter(|a| !targets.iter().any(|d| d.address == **a))
    {
        println!("Can't find device {missing}.");
    }
    if targets.is_empty() {
        return Ok(());
    }

    let orchestrator = Orchestrator::new(adapter, config);
    let report = orchestrator
        .run(
            &targets,
            async |session| {
                let address = session.address();
                println!("Connected to {}", device_info::display_name(session).await);
                heart_rate::watch(session, move |reading| {
                    println!("{address}: {} bpm", reading.bpm);
                    ControlFlow::Continue(())
                })
                .await
            },
            interrupted(),
        )
        .await;

    for (address, outcome) in report.iter() {
        println!("{address}: {outcome}");
    }
    Ok(())
}
