//! A process-wide client installed explicitly at startup.
//!
//! Nothing is created lazily: until [`set_global_client`] succeeds, the
//! top-level helpers return a response carrying
//! [`Error::GlobalClientUnset`].

use std::sync::OnceLock;

use http::Method;

use crate::Result;
use crate::body::Body;
use crate::client::Client;
use crate::error::Error;
use crate::request::Request;
use crate::response::Response;

static GLOBAL_CLIENT: OnceLock<Client> = OnceLock::new();

/// Installs `client` for the lifetime of the process. Only the first call
/// succeeds.
pub fn set_global_client(client: Client) -> Result<()> {
    GLOBAL_CLIENT
        .set(client)
        .map_err(|_| Error::GlobalClientAlreadySet)
}

pub fn global_client() -> Result<&'static Client> {
    GLOBAL_CLIENT.get().ok_or(Error::GlobalClientUnset)
}

/// Sends `method uri` through the global client.
pub async fn send(method: Method, uri: &str, body: impl Into<Body>) -> Response {
    let client = match global_client() {
        Ok(client) => client,
        Err(error) => return Response::failed(error),
    };
    match Request::new(method, uri) {
        Ok(mut request) => {
            request.set_body(body);
            client.execute(request).await
        }
        Err(error) => Response::failed(error),
    }
}

pub async fn get(uri: &str) -> Response {
    send(Method::GET, uri, Body::empty()).await
}

pub async fn head(uri: &str) -> Response {
    send(Method::HEAD, uri, Body::empty()).await
}

pub async fn delete(uri: &str) -> Response {
    send(Method::DELETE, uri, Body::empty()).await
}

pub async fn post(uri: &str, body: impl Into<Body>) -> Response {
    send(Method::POST, uri, body).await
}

pub async fn put(uri: &str, body: impl Into<Body>) -> Response {
    send(Method::PUT, uri, body).await
}

pub async fn patch(uri: &str, body: impl Into<Body>) -> Response {
    send(Method::PATCH, uri, body).await
}

/// Runs a fully built request through the global client.
pub async fn execute(request: Request) -> Response {
    match global_client() {
        Ok(client) => client.execute(request).await,
        Err(error) => Response::failed(error),
    }
}
