//! CLI Entry Point for asi-stage
//!
//! Exposes each stage operation as a subcommand, plus a timelapse runner and
//! a port listing. Connection parameters come from `config/default.toml`
//! (all keys optional) and can be overridden on the command line.
//!
//! # Usage
//!
//! ```bash
//! # Zero the stage on the configured port
//! asi-stage zero
//!
//! # Select the serpentine pattern on an explicit port
//! asi-stage --port /dev/ttyUSB0 mode serpentine
//!
//! # Trigger a 12-timepoint timelapse, one scan every 2 s
//! asi-stage timelapse --timepoints 12 --interval-ms 2000
//! ```

use anyhow::Result;
use asi_stage::config::Settings;
use asi_stage::instrument::{Ack, AsiStage, ScanMode};
use asi_stage::worker::TimelapseWorker;
use clap::{Parser, Subcommand, ValueEnum};
use log::warn;

#[derive(Parser)]
#[command(name = "asi-stage")]
#[command(about = "Control an ASI motorized stage over a serial port", long_about = None)]
struct Cli {
    /// Config name under config/ (defaults to "default")
    #[arg(long)]
    config: Option<String>,

    /// Serial port override (e.g., /dev/ttyUSB0, COM6)
    #[arg(long)]
    port: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set the scan speed on the scanned axis
    Speed {
        value: f64,
    },
    /// Restore the stock motion speed on both axes
    DefaultSpeed,
    /// Apply the fixed backlash compensation offsets
    Backlash,
    /// Select the raster or serpentine scan pattern
    Mode {
        #[arg(value_enum)]
        mode: ModeArg,
    },
    /// Declare the current position as the origin
    Zero,
    /// Trigger a scan pass with the configured parameters
    Scan,
    /// Program a relative scan over the given extents
    Scanr {
        #[arg(default_value_t = 0.0)]
        x: f64,
        #[arg(default_value_t = 0.0)]
        y: f64,
    },
    /// Program a vector scan over the given extents and line factor
    Scanv {
        #[arg(default_value_t = 0.0)]
        x: f64,
        #[arg(default_value_t = 0.0)]
        y: f64,
        #[arg(default_value_t = 1.0)]
        f: f64,
    },
    /// Run a timelapse: repeated scan triggers with a fixed interval
    Timelapse {
        /// Number of scan passes (config value if omitted)
        #[arg(long)]
        timepoints: Option<u32>,
        /// Pause between passes in milliseconds (config value if omitted)
        #[arg(long)]
        interval_ms: Option<u64>,
    },
    /// List serial ports visible on this machine
    ListPorts,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ModeArg {
    Raster,
    Serpentine,
}

impl From<ModeArg> for ScanMode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Raster => ScanMode::Raster,
            ModeArg::Serpentine => ScanMode::Serpentine,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::new(cli.config.as_deref())?;
    init_logging(cli.verbose, settings.log_level.as_deref());
    if let Some(port) = cli.port {
        settings.stage.port = port;
        settings.validate()?;
    }

    match cli.command {
        Commands::ListPorts => return list_ports(),
        command => run_command(command, settings).await?,
    }

    Ok(())
}

async fn run_command(command: Commands, settings: Settings) -> Result<()> {
    let mut stage = AsiStage::open(&settings.stage)?;

    let response = match command {
        Commands::Speed { value } => stage.set_speed(value)?,
        Commands::DefaultSpeed => stage.set_default_speed()?,
        Commands::Backlash => stage.set_backlash()?,
        Commands::Mode { mode } => stage.set_scan_mode(mode.into())?,
        Commands::Zero => stage.zero()?,
        Commands::Scan => stage.start_scan()?,
        Commands::Scanr { x, y } => stage.scan_r(x, y)?,
        Commands::Scanv { x, y, f } => stage.scan_v(x, y, f)?,
        Commands::Timelapse {
            timepoints,
            interval_ms,
        } => {
            return run_timelapse(stage, settings, timepoints, interval_ms).await;
        }
        Commands::ListPorts => unreachable!("handled before opening the port"),
    };

    report(&response);
    Ok(())
}

async fn run_timelapse(
    stage: AsiStage,
    settings: Settings,
    timepoints: Option<u32>,
    interval_ms: Option<u64>,
) -> Result<()> {
    let mut params = settings.timelapse;
    if let Some(n) = timepoints {
        params.nb_timepoints = n;
    }
    if let Some(ms) = interval_ms {
        params.interval_ms = ms;
    }

    let mut worker = TimelapseWorker::new(stage.into_shared());
    let mut events = worker.events();
    worker.start(params)?;

    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            println!(
                "[{}] timepoint {}: {}",
                event.timestamp.format("%H:%M:%S%.3f"),
                event.timepoint,
                event.response
            );
        }
    });

    if let Some(stop) = worker.stop_handle() {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                println!("Stop requested, finishing current timepoint...");
                stop.stop();
            }
        });
    }

    let completed = worker.join().await?;
    println!("Timelapse finished after {} timepoints", completed);

    printer.abort();
    Ok(())
}

fn list_ports() -> Result<()> {
    let ports = serialport::available_ports()?;
    if ports.is_empty() {
        println!("No serial ports detected on this system.");
        return Ok(());
    }
    for port in ports {
        println!("{}", port.port_name);
    }
    Ok(())
}

fn report(response: &str) {
    println!("{}", response);
    if let Ack::Error(code) = Ack::classify(response) {
        warn!("Controller rejected the command with code {}", code);
    }
}

/// Initialize logging from the -v flag, falling back to the config file's
/// `log_level` key.
fn init_logging(verbose: bool, config_level: Option<&str>) {
    let log_level = if verbose {
        log::LevelFilter::Debug
    } else {
        config_level
            .and_then(|level| level.parse().ok())
            .unwrap_or(log::LevelFilter::Info)
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp(None)
        .format_module_path(false)
        .init();
}
