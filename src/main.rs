use clap::Parser;
use reactive_ping::utils::{logger, validation::Validate};
use reactive_ping::{
    AggregatePoller, AppConfig, CliArgs, PingClient, PingError, PingRequest, PingServer, Scheduler,
    StreamPoller,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // 初始化日誌
    logger::init_logger(args.verbose, args.json_logs);

    tracing::info!("Starting reactive-ping");
    if args.verbose {
        tracing::debug!("CLI args: {:?}", args);
    }

    let config = match args.load_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("❌ Failed to load configuration: {}", e);
            eprintln!("❌ {}", e.user_friendly_message());
            std::process::exit(1);
        }
    };

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    if let Err(e) = run(config).await {
        tracing::error!(
            "❌ reactive-ping failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());

        let exit_code = e.exit_code();
        if exit_code > 0 {
            std::process::exit(exit_code);
        }
    }

    Ok(())
}

async fn run(mut config: AppConfig) -> reactive_ping::Result<()> {
    let shutdown = CancellationToken::new();

    let server = PingServer::bind(config.server_addr()?).await?;
    let bound = server.local_addr()?;
    config.client.port.get_or_insert(bound.port());
    let server_task = tokio::spawn(server.serve(shutdown.clone()));

    let jobs = if config.schedule.enabled {
        let client = PingClient::new(&config.client)?;
        let request = PingRequest {
            times: config.schedule.times,
            delay_ms: config.schedule.delay_ms,
        };
        tracing::info!("🔗 Scheduled pollers target {}{}", client.base_url(), request.path());

        let mut scheduler = Scheduler::new();
        scheduler.add_job(
            Arc::new(StreamPoller::new(client.clone(), request)),
            config.schedule.stream_initial_delay(),
            config.schedule.period(),
        )?;
        scheduler.add_job(
            Arc::new(AggregatePoller::new(client, request)),
            config.schedule.aggregate_initial_delay(),
            config.schedule.period(),
        )?;
        scheduler.start(shutdown.clone())
    } else {
        tracing::info!("Scheduled pollers disabled, serving only");
        Vec::new()
    };

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("🛑 Shutdown signal received");
                signal_token.cancel();
            }
            Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
        }
    });

    let served = server_task
        .await
        .map_err(|e| PingError::IoError(std::io::Error::other(e)));

    // 伺服器結束時一併停止排程
    shutdown.cancel();
    for job in jobs {
        if let Err(e) = job.await {
            tracing::warn!("Scheduled job ended abnormally: {}", e);
        }
    }

    served?
}
