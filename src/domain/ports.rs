use crate::domain::model::PollReport;
use crate::utils::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// HTTP client settings, independent of where they were loaded from.
pub trait ClientSettings: Send + Sync {
    fn base_url(&self) -> String;
    fn connect_timeout(&self) -> Duration;
    fn read_timeout(&self) -> Duration;
    fn write_timeout(&self) -> Duration;
    fn keep_alive(&self) -> bool;
}

#[async_trait]
pub trait Poller: Send + Sync {
    fn name(&self) -> &str;

    /// 執行一次請求並收集完整結果
    async fn poll(&self) -> Result<PollReport>;
}
