use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use hrlog::{BtleTransport, ConsolePrompt, CsvSink, SessionConfig, SessionController, SessionOutcome};
use log::LevelFilter;
use stream_cancel::Tripwire;

/// Record heart rate measurements from a BLE heart rate monitor to CSV.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Index of the bluetooth adapter to use
    #[arg(long, default_value_t = 0)]
    adapter: usize,

    /// Seconds to scan for heart rate devices
    #[arg(long, default_value_t = 8)]
    scan_secs: u64,

    /// Seconds between connection checks while streaming
    #[arg(long, default_value_t = 1)]
    poll_secs: u64,

    /// Directory to write heart_rate_<date>_<time>.csv into
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,
}

fn init_logging() {
    let mut builder = pretty_env_logger::formatted_builder();
    builder.filter_level(LevelFilter::Info);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder.init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_logging();
    let args = Args::parse();

    println!("Heart rate monitor");
    println!("{}", "=".repeat(50));

    let config = SessionConfig::default()
        .adapter_index(args.adapter)
        .scan_window(Duration::from_secs(args.scan_secs))
        .liveness_interval(Duration::from_secs(args.poll_secs.max(1)))
        .output_dir(args.output_dir);

    let transport = match BtleTransport::new(config.get_adapter_index()).await {
        Ok(transport) => transport,
        Err(e) => {
            eprintln!("Bluetooth is unavailable: {}", e);
            std::process::exit(1);
        }
    };
    let sink = CsvSink::new(config.get_output_dir());

    let (trigger, tripwire) = Tripwire::new();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                log::info!("Interrupted, shutting down");
                trigger.cancel();
            }
            Err(e) => {
                log::warn!("Cannot listen for Ctrl+C: {}", e);
                trigger.disable();
            }
        }
    });

    let mut session = SessionController::new(config, transport, sink, ConsolePrompt::stdio(), tripwire);
    let outcome = session.run().await;

    if let Some(path) = session.output_path() {
        println!(
            "{} samples saved to {}",
            session.samples_written(),
            path.display()
        );
    }

    let code = match outcome {
        SessionOutcome::Disconnected(reason) => {
            println!("Stopped: {}", reason);
            0
        }
        SessionOutcome::Failed(e) => {
            eprintln!("Failed: {}", e);
            1
        }
    };
    drop(session);

    // An interrupted prompt leaves a blocking stdin read behind that runtime shutdown would wait on
    std::process::exit(code);
}
