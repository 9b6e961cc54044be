//! `RequestPlugin` wiring for the coordinator

use std::future::Future;
use std::pin::Pin;

use pipeline::{BeforeRequest, ErrorAction, RequestPlugin, ResponseErrorContext};

use crate::coordinator::TokenRefreshCoordinator;

impl RequestPlugin for TokenRefreshCoordinator {
    fn id(&self) -> &str {
        "token-refresh"
    }

    fn on_before_request<'a>(
        &'a self,
        ctx: BeforeRequest<'a>,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(self.before_request(ctx.access_token))
    }

    fn on_response_error<'a>(
        &'a self,
        ctx: ResponseErrorContext<'a>,
    ) -> Pin<Box<dyn Future<Output = ErrorAction> + Send + 'a>> {
        Box::pin(self.after_error(ctx.error, ctx.retry, ctx.access_token))
    }
}
