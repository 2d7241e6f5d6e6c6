//! Middleware pipeline — composable before/after request handler logic.
//!
//! Each middleware wraps the next layer and may pass the request through,
//! short-circuit with its own response, or decorate the downstream response.
//! The response cache is a middleware: a hit short-circuits, a miss forwards
//! to [`Next::run`] and inspects what comes back.
//!
//! ## Core types
//!
//! - [`Middleware`] — trait implemented by all middleware.
//! - [`Next`] — cursor into the remaining middleware chain.
//! - [`MiddlewareHandler`] — type-erased, cheaply-cloneable middleware function.
//! - [`from_middleware`] — converts a [`Middleware`] into a [`MiddlewareHandler`].
//! - [`endpoint`] — converts a terminal async handler into a [`MiddlewareHandler`].

use std::{future::Future, pin::Pin, sync::Arc};

use crate::{Response, StatusCode, context::Context};

/// Boxed, sendable response future returned by every pipeline stage.
pub type BoxResponseFuture = Pin<Box<dyn Future<Output = Response> + Send>>;

/// A cursor into the remaining middleware chain for a single request.
///
/// Calling [`Next::run`] advances the cursor by one position and invokes the
/// next middleware, or returns a fallback `500` response when the chain is
/// exhausted without any stage producing a response.
///
/// `Next` is consumed by [`run`](Self::run), so a middleware can forward a
/// request at most once.
///
/// # Examples
///
/// ```
/// use rttp_cache::{Context, Method, Request, Response, StatusCode};
/// use rttp_cache::middleware::{Next, endpoint};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let stack = vec![endpoint(|_ctx| async { Response::new(StatusCode::Ok).body("hi") })];
/// let ctx = Context::new(Request::new(Method::Get, "/"));
/// let response = Next::new(stack).run(ctx).await;
/// assert_eq!(response.body_ref(), b"hi");
/// # }
/// ```
#[derive(Clone)]
pub struct Next {
    middlewares: Arc<[MiddlewareHandler]>,
    // Tracks which middleware to invoke on the next `run` call.
    index: usize,
}

/// A type-erased, reference-counted middleware function.
pub type MiddlewareHandler = Arc<dyn Fn(Context, Next) -> BoxResponseFuture + Send + Sync + 'static>;

/// Converts a [`Middleware`] implementation into a [`MiddlewareHandler`].
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: Context, next: Next| middleware.handle(ctx, next))
}

/// Converts a terminal async handler into a [`MiddlewareHandler`].
///
/// The handler never sees `next`; it ends the chain with its own response.
pub fn endpoint<H, F>(handler: H) -> MiddlewareHandler
where
    H: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    Arc::new(move |ctx: Context, _next: Next| Box::pin(handler(ctx)))
}

impl Next {
    /// Creates a new `Next` positioned at the start of the given middleware stack.
    pub fn new(middlewares: Vec<MiddlewareHandler>) -> Self {
        Self {
            middlewares: middlewares.into(),
            index: 0,
        }
    }

    /// Invokes the next middleware in the chain and returns its response.
    pub async fn run(mut self, ctx: Context) -> Response {
        match self.middlewares.get(self.index).cloned() {
            Some(handler) => {
                self.index += 1;
                handler(ctx, self).await
            }
            None => Response::new(StatusCode::InternalServerError)
                .body("No response generated by middleware pipeline"),
        }
    }
}

/// The core trait for all middleware.
///
/// Implementors receive a [`Context`] and a [`Next`] cursor. They may:
///
/// - **Pass through** — call `next.run(ctx).await` without modification.
/// - **Short-circuit** — return a [`Response`] directly without calling `next`.
/// - **Decorate** — call `next.run(ctx).await`, inspect the response, and return
///   it or a modified copy.
///
/// Implementations must be `Send + Sync` because middleware is shared across
/// Tokio tasks, and must not hold `&mut` references to shared state across an
/// `.await` point.
pub trait Middleware: Send + Sync {
    /// Handle the request and optionally delegate to the next middleware.
    fn handle(&self, ctx: Context, next: Next) -> BoxResponseFuture;
}
