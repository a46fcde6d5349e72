//! Logging middleware
//!
//! Logs HTTP request/response information using tracing.

use crate::request_id::RequestIdValue;
use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::future::{ready, Ready};
use std::time::Instant;

/// Middleware that logs HTTP requests and responses
///
/// Register it inside [`crate::RequestId`] (i.e. `.wrap(Logging)` before
/// `.wrap(RequestId::new())`) so the request id is available.
#[derive(Clone, Default)]
pub struct Logging;

impl<S, B> Transform<S, ServiceRequest> for Logging
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = LoggingService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(LoggingService { service }))
    }
}

pub struct LoggingService<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for LoggingService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start = Instant::now();
        let method = req.method().clone();
        let path = req.path().to_string();
        let request_id = req
            .extensions()
            .get::<RequestIdValue>()
            .map(|v| v.0.clone())
            .unwrap_or_default();

        tracing::debug!(
            method = %method,
            path = %path,
            request_id = %request_id,
            "HTTP request started"
        );

        let fut = self.service.call(req);

        Box::pin(async move {
            let res = fut.await;
            let elapsed_ms = start.elapsed().as_millis() as u64;

            match &res {
                Ok(res) => tracing::info!(
                    method = %method,
                    path = %path,
                    request_id = %request_id,
                    status = res.status().as_u16(),
                    duration_ms = elapsed_ms,
                    "HTTP request completed"
                ),
                Err(err) => tracing::warn!(
                    method = %method,
                    path = %path,
                    request_id = %request_id,
                    status = err.as_response_error().status_code().as_u16(),
                    duration_ms = elapsed_ms,
                    "HTTP request failed"
                ),
            }

            res
        })
    }
}
