//! Headless bench controller
//!
//! Drives the bench engine from the command line: port listing, full channel
//! scans, and performance campaigns. With `--simulate` everything runs
//! against the virtual mux and scripted probes, so the tool works without
//! bench hardware attached.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use cart_bench::{
    run_bench_actor, BenchCommand, BenchEvent, CampaignPlan, ChannelId, ChannelRegistry,
    ChannelSelection, EventSender, FileJournal, ReattemptPolicy, RegistryConfig, StopPolicy,
    SLOT_COUNT,
};
use cart_link::{discover, LinkConfig, MuxLink, PortScanner};
use cart_sim::{spawn_virtual_mux, SimProbe, SimProbeConfig};
use clap::{Parser, Subcommand};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "cart-ctl", about = "Cartridge test-bench controller", version)]
struct Cli {
    /// Run against the virtual mux and simulated probes
    #[arg(long, global = true)]
    simulate: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List candidate serial ports
    Ports,

    /// Find which serial port the multiplexer is on
    Discover,

    /// Probe all eight channels and report what answered
    Scan,

    /// Run a performance campaign
    Campaign {
        /// Channels to test (repeatable), e.g. -c 1 -c 4
        #[arg(short, long = "channel", required = true)]
        channels: Vec<u8>,

        /// Slots to test on each channel (0 = loopback)
        #[arg(short, long = "slot", default_values_t = [1usize])]
        slots: Vec<usize>,

        /// Stop after this many iterations
        #[arg(long, conflicts_with = "duration_secs")]
        iterations: Option<u32>,

        /// Run for at least this many seconds
        #[arg(long)]
        duration_secs: Option<u64>,

        /// Run full cart checks instead of loopback-only
        #[arg(long)]
        with_cart: bool,

        /// Skip a channel for the rest of the run after its first failure
        #[arg(long)]
        skip_after_failure: bool,

        /// Directory for the JSON-lines result journal
        #[arg(long, default_value = "results")]
        out_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cart_ctl=info,cart_link=info,cart_bench=info,cart_sim=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Ports => list_ports(),
        Command::Discover => discover_mux().await,
        Command::Scan => scan(cli.simulate).await,
        Command::Campaign {
            channels,
            slots,
            iterations,
            duration_secs,
            with_cart,
            skip_after_failure,
            out_dir,
        } => {
            let stop = match (iterations, duration_secs) {
                (Some(n), None) => StopPolicy::Iterations(n),
                (None, Some(secs)) => StopPolicy::DurationSecs(secs),
                (None, None) => StopPolicy::Iterations(1),
                (Some(_), Some(_)) => unreachable!("clap rejects the combination"),
            };
            let reattempt = if skip_after_failure {
                ReattemptPolicy::SkipAfterFailure
            } else {
                ReattemptPolicy::EveryIteration
            };
            campaign(
                cli.simulate,
                channels,
                slots,
                stop,
                with_cart,
                reattempt,
                out_dir,
            )
            .await
        }
    }
}

fn list_ports() -> Result<()> {
    let ports = PortScanner::new().enumerate_ports()?;
    if ports.is_empty() {
        println!("no serial ports found");
        return Ok(());
    }
    for port in ports {
        let desc = port.product.as_deref().unwrap_or("unknown");
        match (port.vid, port.pid) {
            (Some(vid), Some(pid)) => {
                println!("{}  {}  [{:04x}:{:04x}]", port.port, desc, vid, pid)
            }
            _ => println!("{}  {}", port.port, desc),
        }
    }
    Ok(())
}

/// Build the registry and hand it to a spawned bench actor.
///
/// Real cartridge probes are hardware collaborators this tool does not ship;
/// anything beyond port listing therefore requires `--simulate`.
async fn start_actor(
    simulate: bool,
) -> Result<(
    mpsc::Sender<BenchCommand>,
    mpsc::UnboundedReceiver<BenchEvent>,
    tokio::task::JoinHandle<()>,
)> {
    if !simulate {
        bail!("channel probes require bench hardware integration; run with --simulate");
    }

    let (stream, _mux) = spawn_virtual_mux();
    let mut link = MuxLink::new(LinkConfig::default());
    link.attach(Box::new(stream), Some("sim".to_string()));
    info!("using virtual mux");

    let (events, event_rx) = EventSender::channel();
    events.emit(BenchEvent::LinkConnected {
        port: "sim".to_string(),
    });

    let registry = ChannelRegistry::new(link, RegistryConfig::default(), events, |_| {
        Box::new(SimProbe::new(SimProbeConfig::fully_loaded("FLASH-64")))
    });

    let (cmd_tx, cmd_rx) = mpsc::channel(32);
    let handle = tokio::spawn(run_bench_actor(registry, cmd_rx));
    Ok((cmd_tx, event_rx, handle))
}

/// Probe the machine's serial ports for the multiplexer.
async fn discover_mux() -> Result<()> {
    let mut link = MuxLink::new(LinkConfig::default());
    let port = discover(&mut link).await.context("mux discovery failed")?;
    println!("multiplexer on {}", port);
    Ok(())
}

async fn scan(simulate: bool) -> Result<()> {
    let (cmd_tx, mut event_rx, handle) = start_actor(simulate).await?;

    cmd_tx.send(BenchCommand::ScanAll).await?;

    for n in 1..=8u8 {
        let channel = ChannelId::new(n).expect("in range");
        let (resp_tx, resp_rx) = oneshot::channel();
        cmd_tx
            .send(BenchCommand::QueryChannel {
                channel,
                response: resp_tx,
            })
            .await?;
        let state = resp_rx.await?;

        let hardware = state.hardware.as_deref().unwrap_or("-");
        let carts: Vec<String> = state
            .slots
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, s)| s.cart_present)
            .map(|(i, s)| format!("slot {} ({})", i, s.cart_type.as_deref().unwrap_or("?")))
            .collect();
        println!(
            "channel {}: {:?}  {}  {}",
            n,
            state.connection,
            hardware,
            if carts.is_empty() {
                "no carts".to_string()
            } else {
                carts.join(", ")
            }
        );
    }

    cmd_tx.send(BenchCommand::Shutdown).await?;
    handle.await?;
    // Drain remaining events quietly
    while event_rx.try_recv().is_ok() {}
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn campaign(
    simulate: bool,
    channels: Vec<u8>,
    slots: Vec<usize>,
    stop: StopPolicy,
    with_cart: bool,
    reattempt: ReattemptPolicy,
    out_dir: PathBuf,
) -> Result<()> {
    for &slot in &slots {
        if slot >= SLOT_COUNT {
            bail!(
                "slot {} is out of range (expected 0..={})",
                slot,
                SLOT_COUNT - 1
            );
        }
    }
    let selection: Vec<ChannelSelection> = channels
        .iter()
        .map(|&n| {
            Ok(ChannelSelection {
                channel: ChannelId::new(n)?,
                slots: slots.clone(),
            })
        })
        .collect::<Result<_, cart_bench::BenchError>>()?;

    let (cmd_tx, mut event_rx, handle) = start_actor(simulate).await?;

    for sel in &selection {
        cmd_tx
            .send(BenchCommand::SetSelection {
                channel: sel.channel,
                slots: sel.slots.clone(),
            })
            .await?;
    }

    let plan = CampaignPlan {
        selection,
        stop,
        with_cart,
        reattempt,
    };
    let journal = FileJournal::new(&out_dir, "campaign").context("opening result journal")?;

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current check");
            ctrl_c_cancel.cancel();
        }
    });

    let (outcome_tx, outcome_rx) = oneshot::channel();
    cmd_tx
        .send(BenchCommand::StartCampaign {
            plan,
            journal: Box::new(journal),
            cancel,
            outcome: outcome_tx,
        })
        .await?;

    // Report progress while the campaign runs
    let printer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                BenchEvent::CampaignProgress(report) => {
                    let total = report
                        .total_operations
                        .map(|t| format!("/{}", t))
                        .unwrap_or_default();
                    println!(
                        "iteration {} channel {}: {}{} done, last {}",
                        report.current_iteration,
                        report.channel,
                        report.completed_operations,
                        total,
                        report.last_result
                    );
                }
                BenchEvent::CampaignFinished { .. } => break,
                BenchEvent::Error { source, message } => {
                    warn!("{}: {}", source, message);
                }
                _ => {}
            }
        }
    });

    let outcome = outcome_rx.await?.context("campaign failed")?;
    printer.await?;

    println!(
        "\ncampaign {:?}: {} iteration(s) in {:.1}s",
        outcome.status,
        outcome.iterations_completed,
        outcome.elapsed.as_secs_f64()
    );
    for summary in &outcome.summaries {
        println!(
            "  channel {} slot {}: {} over {} iteration(s)",
            summary.channel, summary.slot, summary.outcome, summary.iterations
        );
    }
    println!("journal written under {}", out_dir.display());

    cmd_tx.send(BenchCommand::Shutdown).await?;
    handle.await?;
    Ok(())
}
