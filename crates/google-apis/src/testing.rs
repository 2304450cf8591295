//! Helpers for tests that talk to in-process mock APIs

use std::sync::Arc;

use axum::Router;
use chrono::Utc;
use common::Secret;
use google_auth::{AuthenticatedClient, ClientIdentity, TokenRecord};
use tokio::net::TcpListener;

/// Client holding a token valid for an hour, so no refresh is attempted.
pub fn authenticated_client() -> AuthenticatedClient {
    let identity = ClientIdentity {
        client_id: "test-client".into(),
        client_secret: Secret::new("test-secret".to_string()),
        auth_uri: "http://127.0.0.1:9/auth".into(),
        token_uri: "http://127.0.0.1:9/token".into(),
        scopes: vec![],
    };
    let token = TokenRecord {
        access_token: "at_test".into(),
        token_type: "Bearer".into(),
        refresh_token: String::new(),
        expiry: Some(Utc::now() + chrono::Duration::hours(1)),
        scopes: vec![],
    };
    AuthenticatedClient::new(reqwest::Client::new(), Arc::new(identity), token)
}

/// Serve `app` on an ephemeral port and return its base URL.
pub async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}
