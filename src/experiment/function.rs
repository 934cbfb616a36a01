//! # Function-backed experiment body (`ExperimentFn`)
//!
//! [`ExperimentFn`] wraps a closure `F: Fn(ParamsetContext, Params) -> Fut`,
//! producing a fresh future per paramset. The closure is shared by every worker
//! behind an `Arc`, so it must be `Fn + Send + Sync`; shared state goes into an
//! explicit `Arc<...>` captured by the closure.
//!
//! ## Example
//! ```rust
//! use expvisor::{ExperimentBody, ExperimentFn, ExperimentError, ParamsetContext, Params};
//!
//! let body = ExperimentFn::new(|_ctx: ParamsetContext, params: Params| async move {
//!     let a: i64 = params.get("a")?;
//!     Ok::<_, ExperimentError>(serde_json::json!(a * 2))
//! });
//! let _shared: std::sync::Arc<dyn ExperimentBody> = std::sync::Arc::new(body);
//! ```

use std::future::Future;
use std::pin::Pin;

use crate::core::ParamsetContext;
use crate::error::ExperimentError;

use super::paramset::Params;

/// Boxed future returned by an experiment body.
pub type BoxBodyFuture =
    Pin<Box<dyn Future<Output = Result<serde_json::Value, ExperimentError>> + Send + 'static>>;

/// The code executed once per paramset.
pub trait ExperimentBody: Send + Sync + 'static {
    fn call(&self, ctx: ParamsetContext, params: Params) -> BoxBodyFuture;
}

/// Closure-backed experiment body.
#[derive(Debug)]
pub struct ExperimentFn<F> {
    f: F,
}

impl<F> ExperimentFn<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F, Fut> ExperimentBody for ExperimentFn<F>
where
    F: Fn(ParamsetContext, Params) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<serde_json::Value, ExperimentError>> + Send + 'static,
{
    fn call(&self, ctx: ParamsetContext, params: Params) -> BoxBodyFuture {
        Box::pin((self.f)(ctx, params))
    }
}
