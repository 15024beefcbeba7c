use std::sync::Arc;

use http::StatusCode;
use http::header::{AUTHORIZATION, HeaderName, HeaderValue};
use tracing::debug;

use crate::Result;
use crate::error::{BoxError, Error, HookStage};
use crate::request::Request;
use crate::response::Response;
use crate::util::{parse_header_name, parse_header_value};

/// Runs once per exchange, before admission and the first attempt.
pub trait BeforeRequestHook: Send + Sync {
    fn before_request(&self, request: &mut Request) -> std::result::Result<(), BoxError>;
}

impl<F> BeforeRequestHook for F
where
    F: Fn(&mut Request) -> std::result::Result<(), BoxError> + Send + Sync,
{
    fn before_request(&self, request: &mut Request) -> std::result::Result<(), BoxError> {
        self(request)
    }
}

/// Runs once per exchange, after the final attempt, and only when that attempt
/// produced no error.
pub trait AfterResponseHook: Send + Sync {
    fn after_response(&self, response: &mut Response) -> std::result::Result<(), BoxError>;
}

impl<F> AfterResponseHook for F
where
    F: Fn(&mut Response) -> std::result::Result<(), BoxError> + Send + Sync,
{
    fn after_response(&self, response: &mut Response) -> std::result::Result<(), BoxError> {
        self(response)
    }
}

pub(crate) fn run_before_request(
    hooks: &[Arc<dyn BeforeRequestHook>],
    request: &mut Request,
) -> Result<()> {
    for (index, hook) in hooks.iter().enumerate() {
        if let Err(source) = hook.before_request(request) {
            debug!(hook = index, error = %source, "before-request hook aborted the exchange");
            return Err(Error::Hook {
                stage: HookStage::BeforeRequest,
                source,
            });
        }
    }
    Ok(())
}

pub(crate) fn run_after_response(hooks: &[Arc<dyn AfterResponseHook>], response: &mut Response) {
    if response.error().is_some() {
        return;
    }
    for (index, hook) in hooks.iter().enumerate() {
        if let Err(source) = hook.after_response(response) {
            debug!(hook = index, error = %source, "after-response hook rejected the response");
            response.record_error(Error::Hook {
                stage: HookStage::AfterResponse,
                source,
            });
            return;
        }
    }
}

/// Rejects any response outside the 2xx range with [`Error::HttpStatus`].
pub fn ensure_status_2xx() -> impl AfterResponseHook + 'static {
    |response: &mut Response| -> std::result::Result<(), BoxError> {
        response.check_status_2xx()?;
        Ok(())
    }
}

pub fn ensure_status(expected: StatusCode) -> impl AfterResponseHook + 'static {
    move |response: &mut Response| -> std::result::Result<(), BoxError> {
        response.check_status(expected)?;
        Ok(())
    }
}

/// Sets `Authorization: Bearer <token>` on every request.
pub fn bearer_token(token: &str) -> Result<impl BeforeRequestHook + 'static> {
    let mut value = parse_header_value(AUTHORIZATION.as_str(), &format!("Bearer {token}"))?;
    value.set_sensitive(true);
    Ok(header_hook(AUTHORIZATION, value))
}

/// Sets a fixed header on every request, replacing any value already present.
pub fn set_header(name: &str, value: &str) -> Result<impl BeforeRequestHook + 'static> {
    let name = parse_header_name(name)?;
    let value = parse_header_value(name.as_str(), value)?;
    Ok(header_hook(name, value))
}

fn header_hook(name: HeaderName, value: HeaderValue) -> impl BeforeRequestHook + 'static {
    move |request: &mut Request| -> std::result::Result<(), BoxError> {
        request.headers_mut().insert(name.clone(), value.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use http::header::AUTHORIZATION;
    use http::{HeaderMap, Method, StatusCode};

    use super::{
        AfterResponseHook, BeforeRequestHook, bearer_token, ensure_status, ensure_status_2xx,
        run_after_response, run_before_request, set_header,
    };
    use crate::error::{BoxError, Error, HookStage};
    use crate::request::Request;
    use crate::response::Response;

    fn request() -> Request {
        Request::new(Method::GET, "https://api.example.com/v1").expect("valid uri")
    }

    #[test]
    fn before_hooks_stop_at_first_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let hooks: Vec<Arc<dyn BeforeRequestHook>> = vec![
            Arc::new(
                |_: &mut Request| -> Result<(), BoxError> { Err("missing credentials".into()) },
            ),
            Arc::new(move |_: &mut Request| -> Result<(), BoxError> {
                counted.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        ];

        let error = run_before_request(&hooks, &mut request()).expect_err("first hook fails");
        assert!(matches!(
            error,
            Error::Hook {
                stage: HookStage::BeforeRequest,
                ..
            }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn stock_header_hooks_set_values() {
        let hooks: Vec<Arc<dyn BeforeRequestHook>> = vec![
            Arc::new(bearer_token("abc").expect("valid token")),
            Arc::new(set_header("x-trace", "on").expect("valid header")),
        ];
        let mut request = request();
        run_before_request(&hooks, &mut request).expect("hooks succeed");
        assert_eq!(request.headers()[AUTHORIZATION], "Bearer abc");
        assert_eq!(request.headers()["x-trace"], "on");
        assert!(set_header("bad header", "x").is_err());
    }

    #[test]
    fn ensure_status_hooks_record_errors() {
        let hooks: Vec<Arc<dyn AfterResponseHook>> = vec![Arc::new(ensure_status_2xx())];
        let mut response =
            Response::from_parts(StatusCode::SERVICE_UNAVAILABLE, HeaderMap::new(), "");
        run_after_response(&hooks, &mut response);
        assert!(matches!(
            response.error(),
            Some(Error::Hook {
                stage: HookStage::AfterResponse,
                ..
            })
        ));

        let hooks: Vec<Arc<dyn AfterResponseHook>> =
            vec![Arc::new(ensure_status(StatusCode::CREATED))];
        let mut response = Response::from_parts(StatusCode::CREATED, HeaderMap::new(), "");
        run_after_response(&hooks, &mut response);
        assert!(response.error().is_none());
    }

    #[test]
    fn after_hooks_skip_failed_responses() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let hooks: Vec<Arc<dyn AfterResponseHook>> =
            vec![Arc::new(move |_: &mut Response| -> Result<(), BoxError> {
                counted.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })];
        let mut response = Response::failed(Error::GlobalClientUnset);
        run_after_response(&hooks, &mut response);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
