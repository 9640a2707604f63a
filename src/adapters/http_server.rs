use crate::core::codec::StreamFormat;
use crate::core::sequence::pong_batches;
use crate::utils::error::Result;
use axum::body::Body;
use axum::extract::Path;
use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub const BUFFERED_ROUTE: &str = "/ping/buffered/{times}/{delay}";

pub fn router() -> Router {
    Router::new().route(BUFFERED_ROUTE, get(ping_buffered))
}

/// Streams `times` pongs in batches of two, each pong delayed by `delay` ms.
///
/// The body is written batch by batch while the sequence is produced; if the
/// caller disconnects the sequence is dropped and logs `End Cancel`.
async fn ping_buffered(Path((times, delay)): Path<(u64, u64)>, headers: HeaderMap) -> Response {
    let accept = headers.get(ACCEPT).and_then(|value| value.to_str().ok());
    let Some(format) = StreamFormat::negotiate(accept) else {
        tracing::warn!("Rejecting ping request, unsupported Accept: {:?}", accept);
        return (
            StatusCode::NOT_ACCEPTABLE,
            "supported media types: application/json, application/x-ndjson",
        )
            .into_response();
    };

    tracing::info!(
        "📡 ping/buffered times={} delay={}ms as {}",
        times,
        delay,
        format.content_type()
    );

    let batches = pong_batches(times, Duration::from_millis(delay));
    let body = Body::from_stream(format.encode(batches));

    ([(CONTENT_TYPE, format.content_type())], body).into_response()
}

pub struct PingServer {
    listener: TcpListener,
}

impl PingServer {
    /// 先綁定 port，確保排程的第一次請求不會早於伺服器就緒
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn serve(self, shutdown: CancellationToken) -> Result<()> {
        let addr = self.local_addr()?;
        tracing::info!("🚀 Ping server listening on http://{}", addr);

        axum::serve(self.listener, router())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        tracing::info!("Ping server on {} stopped", addr);
        Ok(())
    }
}
