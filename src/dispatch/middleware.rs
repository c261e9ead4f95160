//! Post-response middleware.
//!
//! Middleware runs after a network round trip (never on cache hits), in
//! registration order, one at a time. It sees the request payload and the
//! envelope as JSON and may rewrite the envelope in place. There is no veto:
//! returning an error fails the call with `UnexpectedError`.

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::request::HttpMethod;
use crate::response::ApiResponse;

pub type MiddlewareError = Box<dyn std::error::Error + Send + Sync>;

/// What a middleware gets to look at.
pub struct MiddlewareContext<'a> {
    pub request_id: Uuid,
    pub method: HttpMethod,
    pub endpoint: &'a str,
    /// The request payload, serialized.
    pub request: &'a Value,
    /// The decoded envelope, mutable.
    pub response: &'a mut ApiResponse<Value>,
}

#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, ctx: &mut MiddlewareContext<'_>) -> Result<(), MiddlewareError>;
}

/// Logs every completed call.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMiddleware;

#[async_trait]
impl Middleware for TracingMiddleware {
    async fn handle(&self, ctx: &mut MiddlewareContext<'_>) -> Result<(), MiddlewareError> {
        match &ctx.response.error {
            None => tracing::info!(
                request_id = %ctx.request_id,
                method = %ctx.method,
                endpoint = ctx.endpoint,
                "Call succeeded"
            ),
            Some(err) => tracing::info!(
                request_id = %ctx.request_id,
                method = %ctx.method,
                endpoint = ctx.endpoint,
                code = err.code,
                title = %err.title,
                "Call returned an API error"
            ),
        }
        Ok(())
    }
}
