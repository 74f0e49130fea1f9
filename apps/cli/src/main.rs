use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pinproc_core::{
    BoardConfig, Device, DriverState, Event, MachineType, NusbTransport, ResetMode,
};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "P-ROC board tool (Pure Rust)", long_about = None)]
struct Args {
    /// Board configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Machine type, overriding the configuration file
    #[arg(long)]
    machine: Option<MachineType>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the board's identity
    Info,
    /// Push machine defaults and clear every switch rule
    Reset,
    /// Print current switch states
    Switches {
        #[arg(long, default_value_t = 64)]
        count: usize,
    },
    /// Print board events as they arrive
    Events {
        /// Stop after this many seconds
        #[arg(long, default_value_t = 10)]
        seconds: u64,
    },
    /// Pulse one driver
    Pulse {
        driver: u16,
        /// Pulse length in ms
        #[arg(long, default_value_t = 20)]
        ms: u8,
    },
    /// Write the effective configuration to a file
    WriteConfig { output: PathBuf },
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if let Err(e) = run(args) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => BoardConfig::load_from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => BoardConfig::default(),
    };
    if let Some(machine) = args.machine {
        config.machine_type = machine;
    }

    if let Command::WriteConfig { output } = &args.command {
        config.save_to_file(output)?;
        info!(path = %output.display(), "Configuration written");
        return Ok(());
    }

    info!(machine = %config.machine_type, "Connecting to P-ROC...");
    let mut device = Device::connect(&config)?;

    match args.command {
        Command::Info => print_info(&device),
        Command::Reset => {
            device.reset(ResetMode::UpdateDevice)?;
            info!("Board reset to machine defaults");
        }
        Command::Switches { count } => {
            for (num, state) in device.switch_states(count)?.iter().enumerate() {
                println!("{num:3}: {state}");
            }
        }
        Command::Events { seconds } => watch_events(&mut device, Duration::from_secs(seconds))?,
        Command::Pulse { driver, ms } => {
            let current = device.driver_state(driver)?;
            device.update_driver_state(&DriverState { driver_num: driver, ..current }.pulsed(ms))?;
            device.flush_write()?;
            info!(driver, ms, "Pulsed");
        }
        Command::WriteConfig { .. } => {}
    }
    Ok(())
}

fn print_info(device: &Device<NusbTransport>) {
    if let Some(chip) = device.chip_info() {
        println!("Chip ID:     0x{:08X}", chip.chip_id);
        println!("Version:     {}.{}", chip.version, chip.revision);
        println!("Watchdog:    0x{:08X}", chip.watchdog);
        println!("Dipswitches: 0x{:08X}", chip.dipswitches);
    }
    println!("Machine:     {}", device.machine_type());
    if let Some(detected) = device.detected_machine_type() {
        println!("Detected:    {detected}");
    }
}

fn watch_events(device: &mut Device<NusbTransport>, duration: Duration) -> Result<()> {
    let mut switches = device.switch_config();
    switches.host_events_enable = true;
    device.update_switch_config(&switches)?;
    device.flush_write()?;

    let start = Instant::now();
    let mut events = [Event::default(); 16];
    while start.elapsed() < duration {
        let count = device.get_events(&mut events)?;
        for event in &events[..count] {
            println!("{event}");
        }
        device.tickle_watchdog()?;
        device.flush_write()?;
        thread::sleep(Duration::from_millis(10));
    }
    Ok(())
}
