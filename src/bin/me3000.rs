//! me3000 - command line access to a Sofar ME3000 inverter
//!
//! Usage: me3000 [--port /dev/ttyUSB0] [--slave 1] <command>
//! Example: me3000 --packet-log charge 1500

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use me3000_modbus::{InverterClient, InverterConfig, ModbusResult, RtuTransport, SlaveId};

#[derive(Parser)]
#[command(name = "me3000")]
#[command(about = "Read and control a Sofar ME3000 inverter over Modbus RTU")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file
    #[arg(short, long, global = true, env = "ME3000_CONFIG")]
    config: Option<PathBuf>,

    /// Serial port, overrides the configuration
    #[arg(short, long, global = true)]
    port: Option<String>,

    /// Slave address, overrides the configuration
    #[arg(short, long, global = true)]
    slave: Option<u8>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Hex-dump every frame
    #[arg(long, global = true)]
    packet_log: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the operating state
    State,
    /// Show the battery state of charge
    Battery,
    /// Dump the holding register block
    Holding,
    /// Dump the input register block
    Input,
    /// Show named readings from the holding block
    Telemetry,
    /// Return to automatic mode
    Auto {
        /// Extra attempts after a retryable failure
        #[arg(short, long, default_value_t = 0)]
        retries: u32,
    },
    /// Force charging at the given power
    Charge {
        #[arg(allow_negative_numbers = true)]
        watts: i32,
    },
    /// Force discharging at the given power
    Discharge {
        #[arg(allow_negative_numbers = true)]
        watts: i32,
    },
}

fn load_config(cli: &Cli) -> ModbusResult<InverterConfig> {
    let mut config = InverterConfig::load(cli.config.as_deref())?;

    if let Some(port) = &cli.port {
        config.serial.port = port.clone();
    }
    if let Some(slave) = cli.slave {
        config.slave_id = SlaveId::new(slave)?;
    }
    if cli.packet_log {
        config.packet_logging = true;
    }

    config.validate()?;
    Ok(config)
}

fn print_words(start: u16, words: &[u16]) {
    for (offset, word) in words.iter().enumerate() {
        println!(
            "0x{:04X}: {:5} (0x{:04X})",
            usize::from(start) + offset,
            word,
            word
        );
    }
}

async fn set_auto_with_retries(
    client: &mut InverterClient<RtuTransport>,
    retries: u32,
) -> ModbusResult<()> {
    let mut attempt = 0;
    loop {
        match client.set_auto().await {
            Ok(status) => {
                println!("Automatic mode (status {})", status);
                return Ok(());
            }
            Err(e) if e.is_retryable() && attempt < retries => {
                attempt += 1;
                warn!("Attempt {} failed: {}, retrying", attempt, e);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn run(cli: Cli) -> ModbusResult<()> {
    let config = load_config(&cli)?;
    info!(
        "Using {} at {} baud, slave {}",
        config.serial.port, config.serial.baud_rate, config.slave_id
    );

    let mut client = InverterClient::open(config);
    let map = *client.register_map();

    let result = match cli.command {
        Commands::State => client.get_inverter_state().await.map(|state| {
            println!("State: {} ({})", state, state.raw());
        }),
        Commands::Battery => client.get_battery_percentage().await.map(|soc| {
            println!("Battery: {}%", soc);
        }),
        Commands::Holding => client
            .read_holding()
            .await
            .map(|words| print_words(map.holding.start, &words)),
        Commands::Input => client
            .read_input()
            .await
            .map(|words| print_words(map.input.start, &words)),
        Commands::Telemetry => client.read_telemetry().await.map(|values| {
            for value in values {
                println!("{}", value);
            }
        }),
        Commands::Auto { retries } => set_auto_with_retries(&mut client, retries).await,
        Commands::Charge { watts } => client.set_charge(watts).await.map(|status| {
            println!("Charging at {} W (status {})", watts, status);
        }),
        Commands::Discharge { watts } => client.set_discharge(watts).await.map(|status| {
            println!("Discharging at {} W (status {})", watts, status);
        }),
    };

    client.disconnect().await?;

    let stats = client.stats();
    info!(
        "Sent {} frames ({} bytes), received {} ({} bytes), {} timeouts",
        stats.requests_sent,
        stats.bytes_sent,
        stats.responses_received,
        stats.bytes_received,
        stats.timeouts
    );
    result
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
