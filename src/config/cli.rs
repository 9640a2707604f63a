use crate::config::toml_config::AppConfig;
use crate::utils::error::Result;
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "reactive-ping")]
#[command(about = "Streams delayed pong batches and polls them back on a schedule")]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address the server binds to
    #[arg(long)]
    pub bind: Option<String>,

    /// Port the server listens on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Host the scheduled client calls (defaults to this machine's address)
    #[arg(long)]
    pub client_host: Option<String>,

    /// Port the scheduled client calls (defaults to the server port)
    #[arg(long)]
    pub client_port: Option<u16>,

    /// Number of pongs requested by each scheduled poll
    #[arg(long)]
    pub times: Option<u64>,

    /// Per-pong delay requested by each scheduled poll
    #[arg(long)]
    pub delay_ms: Option<u64>,

    /// Serve only, do not start the scheduled pollers
    #[arg(long)]
    pub no_schedule: bool,

    /// Emit logs as JSON
    #[arg(long)]
    pub json_logs: bool,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,
}

impl CliArgs {
    /// 載入配置檔（若有）並套用命令列覆蓋設定
    pub fn load_config(&self) -> Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::from_file(path)?,
            None => AppConfig::default(),
        };
        self.apply_overrides(&mut config);
        Ok(config)
    }

    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(bind) = &self.bind {
            config.server.bind = bind.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(host) = &self.client_host {
            config.client.host = Some(host.clone());
        }
        if let Some(port) = self.client_port {
            config.client.port = Some(port);
        }
        if let Some(times) = self.times {
            config.schedule.times = times;
        }
        if let Some(delay_ms) = self.delay_ms {
            config.schedule.delay_ms = delay_ms;
        }
        if self.no_schedule {
            config.schedule.enabled = false;
        }
    }
}
