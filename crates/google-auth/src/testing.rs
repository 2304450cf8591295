//! In-process token endpoint for tests

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::Form;
use axum::Json;
use axum::Router;
use axum::http::StatusCode;
use axum::routing::post;
use common::Secret;
use tokio::net::TcpListener;

use crate::identity::ClientIdentity;

type Recorded = Arc<Mutex<Vec<HashMap<String, String>>>>;

/// Mock token endpoint that records every form it receives and replies with
/// a fixed status and JSON body.
pub struct MockTokenEndpoint {
    pub url: String,
    requests: Recorded,
    handle: tokio::task::JoinHandle<()>,
}

impl MockTokenEndpoint {
    pub async fn ok(body: serde_json::Value) -> Self {
        Self::start(StatusCode::OK, body).await
    }

    pub async fn failing(status: StatusCode, body: serde_json::Value) -> Self {
        Self::start(status, body).await
    }

    async fn start(status: StatusCode, body: serde_json::Value) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests: Recorded = Arc::new(Mutex::new(Vec::new()));

        let recorded = requests.clone();
        let app = Router::new().route(
            "/token",
            post(move |Form(form): Form<HashMap<String, String>>| {
                let recorded = recorded.clone();
                let body = body.clone();
                async move {
                    recorded.lock().unwrap().push(form);
                    (status, Json(body))
                }
            }),
        );

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{addr}/token"),
            requests,
            handle,
        }
    }

    /// Forms received so far, in order.
    pub fn requests(&self) -> Vec<HashMap<String, String>> {
        self.requests.lock().unwrap().clone()
    }

    /// Identity whose token endpoint is this mock.
    pub fn identity(&self) -> ClientIdentity {
        ClientIdentity {
            client_id: "test-client.apps.googleusercontent.com".into(),
            client_secret: Secret::new("test-secret".to_string()),
            auth_uri: "https://accounts.example.test/o/oauth2/auth".into(),
            token_uri: self.url.clone(),
            scopes: vec!["https://www.googleapis.com/auth/drive.readonly".to_string()],
        }
    }

    /// Client secret file contents pointing at this mock.
    pub fn client_secret_json(&self) -> String {
        serde_json::json!({
            "installed": {
                "client_id": "test-client.apps.googleusercontent.com",
                "client_secret": "test-secret",
                "auth_uri": "https://accounts.example.test/o/oauth2/auth",
                "token_uri": self.url,
                "redirect_uris": ["http://localhost"]
            }
        })
        .to_string()
    }
}

impl Drop for MockTokenEndpoint {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
