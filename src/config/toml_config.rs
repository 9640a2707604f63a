use crate::core::ClientSettings;
use crate::utils::error::{PingError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8080;
const DEFAULT_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub client: ClientConfig,
    pub schedule: ScheduleConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Full base URL; wins over `host` and `port` when set.
    pub base_url: Option<String>,
    /// 未設定時使用本機主機名稱解析出的位址
    pub host: Option<String>,
    /// 未設定時沿用伺服器實際綁定的 port
    pub port: Option<u16>,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub keep_alive: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            host: None,
            port: None,
            connect_timeout_ms: DEFAULT_TIMEOUT_MS,
            read_timeout_ms: DEFAULT_TIMEOUT_MS,
            write_timeout_ms: DEFAULT_TIMEOUT_MS,
            keep_alive: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub enabled: bool,
    pub times: u64,
    pub delay_ms: u64,
    pub period_ms: u64,
    pub stream_initial_delay_ms: u64,
    pub aggregate_initial_delay_ms: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            times: 5,
            delay_ms: 200,
            period_ms: 20_000,
            stream_initial_delay_ms: 10_000,
            aggregate_initial_delay_ms: 0,
        }
    }
}

impl ScheduleConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn stream_initial_delay(&self) -> Duration {
        Duration::from_millis(self.stream_initial_delay_ms)
    }

    pub fn aggregate_initial_delay(&self) -> Duration {
        Duration::from_millis(self.aggregate_initial_delay_ms)
    }
}

impl AppConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(PingError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置，缺少的欄位使用預設值
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| PingError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${PING_PORT})，未定義的變數保留原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| PingError::ConfigValidationError {
            field: "env_substitution".to_string(),
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn server_addr(&self) -> Result<SocketAddr> {
        let ip = validation::validate_ip_addr("server.bind", &self.server.bind)?;
        Ok(SocketAddr::new(ip, self.server.port))
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_ip_addr("server.bind", &self.server.bind)?;

        if let Some(base_url) = &self.client.base_url {
            validation::validate_url("client.base_url", base_url)?;
        }
        if let Some(host) = &self.client.host {
            validation::validate_non_empty_string("client.host", host)?;
        }
        if let Some(port) = self.client.port {
            validation::validate_range("client.port", port, 1, u16::MAX)?;
        }

        validation::validate_positive_number("client.connect_timeout_ms", self.client.connect_timeout_ms, 1)?;
        validation::validate_positive_number("client.read_timeout_ms", self.client.read_timeout_ms, 1)?;
        validation::validate_positive_number("client.write_timeout_ms", self.client.write_timeout_ms, 1)?;
        validation::validate_positive_number("schedule.period_ms", self.schedule.period_ms, 1)?;

        Ok(())
    }
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

/// Resolve this machine's hostname to its first IPv4 address.
pub fn resolve_local_host() -> String {
    let resolved = hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .and_then(|name| (name.as_str(), 0).to_socket_addrs().ok())
        .and_then(|mut addrs| addrs.find(SocketAddr::is_ipv4))
        .map(|addr| addr.ip().to_string());

    match resolved {
        Some(ip) => ip,
        None => {
            tracing::warn!("⚠️ Could not resolve local host address, falling back to 127.0.0.1");
            "127.0.0.1".to_string()
        }
    }
}

impl ClientConfig {
    pub fn resolved_host(&self) -> String {
        self.host.clone().unwrap_or_else(resolve_local_host)
    }
}

impl ClientSettings for ClientConfig {
    fn base_url(&self) -> String {
        if let Some(base_url) = &self.base_url {
            return base_url.clone();
        }

        let host = self.resolved_host();
        let port = self.port.unwrap_or(DEFAULT_PORT);
        match host.parse::<IpAddr>() {
            Ok(IpAddr::V6(v6)) => format!("http://[{}]:{}", v6, port),
            _ => format!("http://{}:{}", host, port),
        }
    }

    fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    fn keep_alive(&self) -> bool {
        self.keep_alive
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_match_demo_setup() {
        let config = AppConfig::from_toml_str("").unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.client.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.client.read_timeout(), Duration::from_secs(5));
        assert_eq!(config.client.write_timeout(), Duration::from_secs(5));
        assert!(config.client.keep_alive());
        assert_eq!(config.schedule.times, 5);
        assert_eq!(config.schedule.delay_ms, 200);
        assert_eq!(config.schedule.period(), Duration::from_secs(20));
        assert_eq!(config.schedule.stream_initial_delay(), Duration::from_secs(10));
        assert_eq!(config.schedule.aggregate_initial_delay(), Duration::ZERO);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_content = r#"
[server]
bind = "127.0.0.1"
port = 9090

[client]
host = "10.1.2.3"
port = 9090
read_timeout_ms = 1500

[schedule]
enabled = false
times = 7
"#;

        let config = AppConfig::from_toml_str(toml_content).unwrap();

        assert_eq!(config.server_addr().unwrap(), "127.0.0.1:9090".parse().unwrap());
        assert_eq!(config.client.base_url(), "http://10.1.2.3:9090");
        assert_eq!(config.client.read_timeout(), Duration::from_millis(1500));
        assert_eq!(config.client.connect_timeout(), Duration::from_secs(5));
        assert!(!config.schedule.enabled);
        assert_eq!(config.schedule.times, 7);
        assert_eq!(config.schedule.delay_ms, 200);
    }

    #[test]
    fn test_base_url_override_and_ipv6() {
        let mut client = ClientConfig {
            host: Some("::1".to_string()),
            port: Some(8081),
            ..ClientConfig::default()
        };
        assert_eq!(client.base_url(), "http://[::1]:8081");

        client.base_url = Some("http://ping.internal:80".to_string());
        assert_eq!(client.base_url(), "http://ping.internal:80");
    }

    #[test]
    fn test_resolve_local_host_is_ipv4() {
        let host = resolve_local_host();
        assert!(host.parse::<std::net::Ipv4Addr>().is_ok(), "not an IPv4 address: {}", host);
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("REACTIVE_PING_TEST_PORT", "9191");

        let config = AppConfig::from_toml_str(
            r#"
[server]
port = ${REACTIVE_PING_TEST_PORT}
"#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9191);

        std::env::remove_var("REACTIVE_PING_TEST_PORT");
    }

    #[test]
    fn test_config_validation() {
        let config = AppConfig::from_toml_str(
            r#"
[client]
base_url = "invalid-url"
"#,
        )
        .unwrap();
        assert!(config.validate().is_err());

        let config = AppConfig::from_toml_str(
            r#"
[schedule]
period_ms = 0
"#,
        )
        .unwrap();
        assert!(config.validate().is_err());

        let config = AppConfig::from_toml_str(
            r#"
[server]
bind = "not-an-ip"
"#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unparseable_toml() {
        let result = AppConfig::from_toml_str("[server\nport = 1");
        assert!(matches!(result, Err(PingError::ConfigValidationError { .. })));
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[schedule]\nperiod_ms = 1000\ndelay_ms = 50\n")
            .unwrap();

        let config = AppConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.schedule.period(), Duration::from_secs(1));
        assert_eq!(config.schedule.delay_ms, 50);
    }
}
