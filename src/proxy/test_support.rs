// Shared helpers for tests that need a live upstream

use axum::Router;

use crate::proxy::config::BypassHeader;
use crate::proxy::upstream::client::UpstreamClient;

/// Serve `router` on an ephemeral local port and return its origin
pub async fn spawn_upstream(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

pub fn upstream_client(origin: &str) -> UpstreamClient {
    UpstreamClient::new(origin, &BypassHeader::default(), None).unwrap()
}
