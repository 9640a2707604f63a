// Adapters layer: the HTTP edges of the app (axum server, reqwest client and pollers).

pub mod http_client;
pub mod http_server;
