use clap::{Parser, ValueEnum};
use reactive_ping::config::ClientConfig;
use reactive_ping::core::Poller;
use reactive_ping::utils::{logger, validation};
use reactive_ping::{AggregatePoller, PingClient, PingRequest, StreamPoller};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// Decode batches one by one as they arrive
    Stream,
    /// Decode the whole body at once
    Aggregate,
}

#[derive(Parser)]
#[command(name = "ping-once")]
#[command(about = "Poll a buffered ping endpoint once and print the concatenated pongs")]
struct Args {
    /// Base URL of the ping server
    #[arg(short, long, default_value = "http://127.0.0.1:8080")]
    base_url: String,

    #[arg(short, long, value_enum, default_value = "stream")]
    mode: Mode,

    /// Number of pongs to request
    #[arg(long, default_value = "5")]
    times: u64,

    /// Per-pong delay in milliseconds
    #[arg(long, default_value = "200")]
    delay_ms: u64,

    /// Connect, read and write timeout in milliseconds
    #[arg(long, default_value = "5000")]
    timeout_ms: u64,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn validate_args(args: &Args) -> reactive_ping::Result<()> {
    validation::validate_url("base_url", &args.base_url)?;
    validation::validate_positive_number("timeout_ms", args.timeout_ms, 1)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    logger::init_cli_logger(args.verbose);

    if let Err(e) = validate_args(&args) {
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(e.exit_code());
    }

    let config = ClientConfig {
        base_url: Some(args.base_url.clone()),
        connect_timeout_ms: args.timeout_ms,
        read_timeout_ms: args.timeout_ms,
        write_timeout_ms: args.timeout_ms,
        ..ClientConfig::default()
    };
    let client = PingClient::new(&config)?;
    let request = PingRequest {
        times: args.times,
        delay_ms: args.delay_ms,
    };

    let poller: Box<dyn Poller> = match args.mode {
        Mode::Stream => Box::new(StreamPoller::new(client, request)),
        Mode::Aggregate => Box::new(AggregatePoller::new(client, request)),
    };

    tracing::info!("🚀 Polling {}{} with {}", args.base_url, request.path(), poller.name());

    match poller.poll().await {
        Ok(report) => {
            println!("{}", report.label);
            tracing::info!(
                "✅ {} records in {} batches ({} skipped) in {:?}, started {}",
                report.record_count(),
                report.batches.len(),
                report.skipped,
                report.elapsed,
                report.started_at.to_rfc3339()
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("❌ Poll failed: {} (Category: {:?})", e, e.category());
            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 {}", e.recovery_suggestion());
            std::process::exit(e.exit_code());
        }
    }
}
