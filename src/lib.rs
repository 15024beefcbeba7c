//! `reqloop` is an outbound HTTP request pipeline: admission control, retries
//! with backoff, body replay across attempts and request/response hooks, on
//! top of a pluggable transport (hyper + rustls by default).
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use reqloop::prelude::{BackoffStrategy, Client, RetryPolicy, triggers};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::builder()
//!         .timeout(Duration::from_secs(10))
//!         .retry_policy(
//!             RetryPolicy::new(
//!                 3,
//!                 BackoffStrategy::exponential(
//!                     Duration::from_millis(100),
//!                     Duration::from_secs(2),
//!                     true,
//!                 ),
//!             )
//!             .trigger(triggers::on_transport_error())
//!             .trigger(triggers::on_server_error()),
//!         )
//!         .try_build()?;
//!
//!     let body = client
//!         .get("https://api.example.com/v1/health")
//!         .send()
//!         .await
//!         .ensure_status_2xx()
//!         .text()
//!         .await?;
//!
//!     println!("{body}");
//!     Ok(())
//! }
//! ```
//!
//! # Notes
//!
//! - A [`RetryPolicy`] without triggers never retries.
//! - Streaming bodies are buffered once before the first attempt when the
//!   policy allows more than one attempt.
//! - Every failure, including cancellation, is reported in the error slot of
//!   the returned [`Response`].

mod backoff;
mod body;
mod client;
mod config;
mod content_encoding;
mod context;
mod error;
mod execution;
pub mod global;
pub mod hooks;
mod limiter;
mod rate_limit;
mod request;
mod response;
mod retry;
mod tls;
mod transport;
mod util;

pub use crate::backoff::{Backoff, BackoffStrategy};
pub use crate::body::{Body, BodyFactory};
pub use crate::client::{Client, ClientBuilder};
pub use crate::config::{ClientProfile, ProfileDefaults};
pub use crate::context::{Context, ContextError};
pub use crate::error::{BoxError, Error, ErrorCode, HookStage, TransportErrorKind};
pub use crate::global::{global_client, set_global_client};
pub use crate::hooks::{AfterResponseHook, BeforeRequestHook};
pub use crate::limiter::{Limiter, UrlPatternLimiter};
pub use crate::rate_limit::{RateLimitPolicy, TokenBucketLimiter};
pub use crate::request::{Request, RequestBuilder};
pub use crate::response::{Response, ResponseBody};
pub use crate::retry::{RetryPolicy, RetryTrigger, triggers};
pub use crate::tls::TlsOptions;
pub use crate::transport::{HyperTransport, HyperTransportBuilder, Transport};

pub type Result<T> = std::result::Result<T, Error>;

/// Top-level helpers backed by the client installed with [`set_global_client`].
pub use crate::global::{delete, get, head, patch, post, put};

pub mod prelude {
    pub use crate::{
        Backoff, BackoffStrategy, Body, Client, ClientBuilder, ClientProfile, Context, Error,
        ErrorCode, Limiter, RateLimitPolicy, Request, Response, Result, RetryPolicy,
        TokenBucketLimiter, Transport, UrlPatternLimiter, triggers,
    };
}
