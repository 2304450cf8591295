//! Response status handling shared by the API wrappers

use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

/// Map non-success statuses to errors; 401 becomes `Unauthorized`.
pub(crate) async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| String::from("<no body>"));
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(Error::Unauthorized(body));
    }
    Err(Error::Api {
        status: status.as_u16(),
        body,
    })
}

/// Check the status, then decode a JSON body.
pub(crate) async fn json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    check(response)
        .await?
        .json::<T>()
        .await
        .map_err(|e| Error::Http(format!("invalid response body: {e}")))
}

pub(crate) fn send_error(e: reqwest::Error) -> Error {
    Error::Http(e.to_string())
}
