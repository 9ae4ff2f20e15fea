use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::time::Duration;
use tracing::{info, warn};

use bus_transport as bt;
use bus_transport::BusTransport;
use motor_bus as mb;
use motor_bus::{Command, MotorBus, Observation, ObservationSink};

type DynBus = Box<dyn BusTransport + Send>;

#[derive(Parser, Debug)]
#[command(
    name = "mbus",
    version,
    about = "Motor coprocessor bus tool",
    disable_help_subcommand = true
)]
struct Cli {
    /// Driver config file (YAML)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Override the configured backend
    #[arg(long, value_enum, global = true)]
    backend: Option<Backend>,

    /// Override the configured device (e.g., /dev/i2c-1 or mock0)
    #[arg(long, global = true)]
    device: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Backend {
    Mock,
    I2c,
}

impl Backend {
    fn into_config(self) -> mb::BackendKind {
        match self {
            Backend::Mock => mb::BackendKind::Mock,
            Backend::I2c => mb::BackendKind::I2c,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum SoundArg {
    None,
    ShortBeep,
    BootBeep,
    Bebop,
}

impl SoundArg {
    fn into_protocol(self) -> mb::Sound {
        match self {
            SoundArg::None => mb::Sound::None,
            SoundArg::ShortBeep => mb::Sound::ShortBeep,
            SoundArg::BootBeep => mb::Sound::BootBeep,
            SoundArg::Bebop => mb::Sound::Bebop,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum GpioArg {
    Reset,
    Red,
    Green,
}

impl GpioArg {
    fn into_protocol(self) -> mb::GpioMode {
        match self {
            GpioArg::Reset => mb::GpioMode::Reset,
            GpioArg::Red => mb::GpioMode::Red,
            GpioArg::Green => mb::GpioMode::Green,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List bus interfaces for the selected backend
    BusList,
    /// Start the driver and print device info
    Info {
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// Poll telemetry until the count is reached or Ctrl-C
    Poll {
        /// Number of observations to print before exiting
        #[arg(long)]
        count: Option<u64>,
        /// Print observations as JSON lines
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
        /// Also write observations to a JSONL file
        #[arg(long)]
        to: Option<String>,
        /// Print Prometheus metrics on exit
        #[arg(long, action = ArgAction::SetTrue)]
        metrics: bool,
    },
    /// Start the motors (LR-LR rotation mapping)
    StartMotors,
    /// Stop the motors
    StopMotors,
    /// Clear device error state
    ClearErrors,
    /// Play a sound on the motor drivers
    PlaySound {
        #[arg(value_enum)]
        sound: SoundArg,
    },
    /// Toggle a coprocessor GPIO
    Gpio {
        #[arg(value_enum)]
        mode: GpioArg,
    },
    /// Start motors, hold normalized speeds (FL FR BR BL), then stop
    SetSpeed {
        #[arg(num_args = 4, value_names = ["FL", "FR", "BR", "BL"])]
        speeds: Vec<f32>,
        /// Milliseconds to hold the speeds before stopping
        #[arg(long, default_value_t = 1000u64)]
        hold_ms: u64,
    },
}

#[derive(Serialize)]
struct TelemetryLine<'a> {
    ts: String,
    #[serde(flatten)]
    obs: &'a Observation,
}

/// Forwards observations from the worker thread into the async side.
struct ChannelSink(tokio::sync::mpsc::UnboundedSender<Observation>);

impl ObservationSink for ChannelSink {
    fn publish(&mut self, obs: &Observation) {
        let _ = self.0.send(*obs);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_tracing();
    let cli = Cli::parse();
    let cfg = resolve_config(&cli)?;

    match cli.command {
        Commands::BusList => bus_list(cfg.backend),
        Commands::Info { json } => show_info(&cfg, json),
        Commands::Poll {
            count,
            json,
            to,
            metrics,
        } => poll(&cfg, count, json, to.as_deref(), metrics).await,
        Commands::StartMotors => one_shot(&cfg, Command::start_motors()),
        Commands::StopMotors => one_shot(&cfg, Command::StopMotors),
        Commands::ClearErrors => one_shot(&cfg, Command::ClearErrors),
        Commands::PlaySound { sound } => {
            one_shot(&cfg, Command::PlaySound(sound.into_protocol()))
        }
        Commands::Gpio { mode } => one_shot(&cfg, Command::ToggleGpio(mode.into_protocol())),
        Commands::SetSpeed { speeds, hold_ms } => set_speed(&cfg, &speeds, hold_ms).await,
    }
}

fn setup_tracing() {
    // Best-effort; avoid panics if already set
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn resolve_config(cli: &Cli) -> Result<mb::DriverConfig> {
    let mut cfg = match cli.config.as_deref() {
        Some(path) => mb::load_config_file(path)?,
        None => mb::DriverConfig::default(),
    };
    if let Some(b) = cli.backend {
        cfg.backend = b.into_config();
    }
    if let Some(d) = &cli.device {
        cfg.device = d.clone();
    } else if cli.config.is_none() && cfg.backend == mb::BackendKind::Mock {
        cfg.device = "mock0".to_string();
    }
    Ok(cfg)
}

fn open_transport(cfg: &mb::DriverConfig) -> Result<DynBus> {
    match cfg.backend {
        mb::BackendKind::Mock => Ok(Box::new(mb::sim::simulated_bus(&cfg.device))),
        #[cfg(feature = "i2c")]
        mb::BackendKind::I2c => Ok(Box::new(bt::I2cBus::from_path(&cfg.device)?)),
        #[cfg(not(feature = "i2c"))]
        mb::BackendKind::I2c => anyhow::bail!("mbus was built without the `i2c` feature"),
    }
}

fn start_driver(cfg: &mb::DriverConfig) -> Result<MotorBus<DynBus>> {
    let mut driver = MotorBus::new(open_transport(cfg)?);
    driver.start()?;
    Ok(driver)
}

fn bus_list(backend: mb::BackendKind) -> Result<()> {
    let buses = match backend {
        mb::BackendKind::Mock => bt::MockBus::list()?,
        #[cfg(feature = "i2c")]
        mb::BackendKind::I2c => bt::I2cBus::list()?,
        #[cfg(not(feature = "i2c"))]
        mb::BackendKind::I2c => anyhow::bail!("mbus was built without the `i2c` feature"),
    };
    for bus in buses {
        println!("{}\t{}", bus.name, bus.driver);
    }
    Ok(())
}

fn show_info(cfg: &mb::DriverConfig, json: bool) -> Result<()> {
    let mut driver = start_driver(cfg)?;
    if let Some(dev) = driver.info() {
        if json {
            println!("{}", serde_json::to_string(dev)?);
        } else {
            println!("version\t{}.{}", dev.version_major, dev.version_minor);
            println!("type\t{}", dev.device_type);
            println!("motors\t{}", dev.n_motors_controlled);
            println!("flights\t{}", dev.n_flights);
            println!("last_flight_time\t{}", dev.last_flight_time);
            println!("total_flight_time\t{}", dev.total_flight_time);
            println!("last_error\t{}", dev.last_error);
        }
    }
    driver.stop()?;
    Ok(())
}

fn one_shot(cfg: &mb::DriverConfig, cmd: Command) -> Result<()> {
    let mut driver = start_driver(cfg)?;
    let res = driver.execute(&cmd);
    driver.stop()?;
    res?;
    info!(command = %cmd, "sent");
    Ok(())
}

fn telemetry_line(obs: &Observation) -> Result<String> {
    let ts = time::OffsetDateTime::now_utc().format(&time::format_description::well_known::Rfc3339)?;
    Ok(serde_json::to_string(&TelemetryLine { ts, obs })?)
}

fn print_observation(obs: &Observation) {
    let [fl, fr, br, bl] = obs.rpms();
    let sat = if obs.any_saturated() { " saturated" } else { "" };
    println!(
        "rpm={fl}/{fr}/{br}/{bl} battery={:.2}V error={}{sat}",
        obs.battery_voltage_v(),
        obs.error_code
    );
}

async fn poll(
    cfg: &mb::DriverConfig,
    count: Option<u64>,
    json: bool,
    to: Option<&str>,
    metrics: bool,
) -> Result<()> {
    let mut writer = match to {
        Some(path) => Some(BufWriter::new(File::create(path)?)),
        None => None,
    };
    let hub = mb::MetricsHub::new().map_err(|e| anyhow::anyhow!(e))?;
    let driver = MotorBus::new(open_transport(cfg)?).with_metrics(hub.dev.clone());
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let handle = mb::spawn(driver, ChannelSink(tx), cfg.poll_period())?;

    let mut seen = 0u64;
    loop {
        tokio::select! {
            maybe = rx.recv() => {
                let Some(obs) = maybe else { break };
                if json {
                    println!("{}", telemetry_line(&obs)?);
                } else {
                    print_observation(&obs);
                }
                if let Some(w) = writer.as_mut() {
                    w.write_all(telemetry_line(&obs)?.as_bytes())?;
                    w.write_all(b"\n")?;
                }
                seen += 1;
                if count.is_some_and(|c| seen >= c) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    handle.stop()?;
    if let Some(mut w) = writer {
        w.flush()?;
    }
    if metrics {
        print!("{}", hub.encode_text());
    }
    Ok(())
}

/// Wait for `period` or until `interrupt` resolves. Returns true when interrupted.
async fn hold<F>(period: Duration, interrupt: F) -> bool
where
    F: std::future::Future<Output = std::io::Result<()>>,
{
    tokio::select! {
        _ = tokio::time::sleep(period) => false,
        _ = interrupt => true,
    }
}

async fn set_speed(cfg: &mb::DriverConfig, speeds: &[f32], hold_ms: u64) -> Result<()> {
    let speeds: [f32; 4] = speeds
        .try_into()
        .map_err(|_| anyhow::anyhow!("expected four speeds (FL FR BR BL)"))?;
    if let Some(bad) = speeds.iter().find(|s| !(0.0..=1.0).contains(*s)) {
        anyhow::bail!("speed {bad} outside [0, 1]");
    }

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let handle = mb::spawn(
        MotorBus::new(open_transport(cfg)?),
        ChannelSink(tx),
        cfg.poll_period(),
    )?;
    handle.start_motors()?;
    let commanded = handle.set_esc_speed(speeds);
    if commanded.is_ok() {
        let period = Duration::from_millis(hold_ms);
        if hold(period, tokio::signal::ctrl_c()).await {
            info!("interrupted, stopping motors");
        }
    }
    // Always try to stop, even when the speed command failed.
    if let Err(e) = handle.stop_motors() {
        warn!(error = %e, "stop_motors failed");
    }
    let mut last = None;
    while let Ok(obs) = rx.try_recv() {
        last = Some(obs);
    }
    handle.stop()?;
    commanded?;
    if let Some(obs) = last {
        print_observation(&obs);
    }
    Ok(())
}
