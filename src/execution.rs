use std::sync::Arc;
use std::time::Duration;

use http::HeaderMap;
use tracing::{Instrument, debug, info_span, warn};

use crate::body::prepare_replay;
use crate::context::{Context, ContextError};
use crate::error::{BoxError, Error};
use crate::hooks::{AfterResponseHook, BeforeRequestHook, run_after_response, run_before_request};
use crate::limiter::Limiter;
use crate::request::Request;
use crate::response::Response;
use crate::retry::RetryPolicy;
use crate::transport::Transport;
use crate::util::ensure_accept_encoding;

enum Admission {
    Context(ContextError),
    Rejected(BoxError),
}

/// Collaborators shared by every exchange of a client.
pub(crate) struct Pipeline {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) limiter: Option<Arc<dyn Limiter>>,
    pub(crate) before_request: Vec<Arc<dyn BeforeRequestHook>>,
    pub(crate) after_response: Vec<Arc<dyn AfterResponseHook>>,
    pub(crate) retry_policy: Option<Arc<RetryPolicy>>,
    pub(crate) attempt_timeout: Option<Duration>,
    pub(crate) auto_decompress: bool,
    pub(crate) max_decoded_body_bytes: usize,
    pub(crate) default_headers: HeaderMap,
}

impl Pipeline {
    /// Drives one exchange to a terminal state: hooks, admission, attempts,
    /// backoff between them, then the after-response hooks.
    pub(crate) async fn execute(&self, request: Request) -> Response {
        let retry_policy = request
            .retry_policy()
            .cloned()
            .or_else(|| self.retry_policy.clone());
        let max_attempts = retry_policy
            .as_ref()
            .map_or(1, |policy| policy.max_attempts());
        let span = info_span!(
            "reqloop.request",
            method = %request.method(),
            uri = %request.redacted_uri(),
            max_attempts = max_attempts
        );
        self.run(request, retry_policy).instrument(span).await
    }

    async fn run(&self, mut request: Request, retry_policy: Option<Arc<RetryPolicy>>) -> Response {
        request.apply_default_headers(&self.default_headers);
        if self.decompresses(&request) {
            ensure_accept_encoding(request.headers_mut());
        }

        if let Err(error) = run_before_request(&self.before_request, &mut request) {
            return Response::failed(error);
        }

        let retrying = retry_policy.filter(|policy| !policy.is_disabled());
        if retrying.is_some()
            && let Err(error) = prepare_replay(&mut request).await
        {
            return Response::failed(error);
        }

        let context = request.context().clone();
        let admitted = match &self.limiter {
            Some(limiter) if !limiter.allow(&request) => self.admit(&context).await,
            _ => Ok(()),
        };
        match admitted {
            Ok(()) => {}
            Err(Admission::Context(error)) => {
                return Response::failed(request.context_error(error));
            }
            Err(Admission::Rejected(source)) => {
                return Response::failed(Error::Admission {
                    method: request.method().clone(),
                    uri: request.redacted_uri(),
                    source,
                });
            }
        }

        let mut attempt = 0_usize;
        let mut response = loop {
            let response = self.attempt(&mut request, &context, attempt).await;
            let Some(policy) = retrying.as_deref() else {
                break response;
            };
            if context.is_done()
                || attempt + 1 >= policy.max_attempts()
                || !policy.should_retry(&response)
            {
                break response;
            }

            if let Err(source) = request.regenerate_body() {
                break Response::failed(Error::BodyReplay {
                    method: request.method().clone(),
                    uri: request.redacted_uri(),
                    source,
                });
            }

            let delay = policy.backoff().wait_time(attempt, Some(&response));
            match (response.status(), response.error()) {
                (_, Some(error)) => warn!(
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "retrying request after error"
                ),
                (Some(status), None) => warn!(
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    status = status.as_u16(),
                    "retrying request after response"
                ),
                (None, None) => {}
            }
            drop(response);

            if let Err(error) = context.sleep(delay).await {
                break Response::failed(request.context_error(error));
            }
            attempt += 1;
        };

        run_after_response(&self.after_response, &mut response);
        response
    }

    fn decompresses(&self, request: &Request) -> bool {
        self.auto_decompress && request.decompress()
    }

    /// Request bodies are not `Sync`, so nothing borrowed from the request is
    /// held across an await here.
    async fn admit(&self, context: &Context) -> std::result::Result<(), Admission> {
        let Some(limiter) = &self.limiter else {
            return Ok(());
        };
        debug!("waiting for rate limiter");
        match context.run(limiter.wait(context)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => match context.err() {
                Some(error) => Err(Admission::Context(error)),
                None => Err(Admission::Rejected(source)),
            },
            Err(error) => Err(Admission::Context(error)),
        }
    }

    async fn attempt(
        &self,
        request: &mut Request,
        context: &Context,
        attempt: usize,
    ) -> Response {
        debug!(attempt = attempt + 1, "sending request");
        let http_request = match request.to_http_request() {
            Ok(http_request) => http_request,
            Err(error) => return Response::failed(error),
        };
        let method = request.method().clone();
        let uri = request.redacted_uri();
        let sent = self.transport.send(http_request);

        let outcome = match self.attempt_timeout {
            Some(timeout) => context
                .run(tokio::time::timeout(timeout, sent))
                .await
                .map(|result| {
                    result.unwrap_or_else(|_| {
                        Err(Error::Timeout {
                            timeout_ms: timeout.as_millis(),
                            method: method.clone(),
                            uri: uri.clone(),
                        })
                    })
                }),
            None => context.run(sent).await,
        };

        match outcome {
            Ok(Ok(response)) => {
                debug!(status = response.status().as_u16(), "received response");
                let decode_limit = self
                    .decompresses(request)
                    .then_some(self.max_decoded_body_bytes);
                Response::from_transport(response, &method, uri, decode_limit)
            }
            Ok(Err(error)) => {
                debug!(error = %error, "attempt failed");
                Response::failed(error)
            }
            Err(error) => Response::failed(request.context_error(error)),
        }
    }
}
