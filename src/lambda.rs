//! Catch-all error handling for Lambda handlers.
//!
//! ```rust,no_run
//! use amplify_aws_utils::lambda::{CatchAll, CatchAllOptions};
//!
//! # async fn run() -> amplify_aws_utils::Result<()> {
//! let handler = CatchAll::new(
//!     |event: serde_json::Value, _ctx: ()| async move { Ok::<_, anyhow::Error>(event) },
//!     CatchAllOptions::default().raise_exception(false),
//! );
//! let response = handler.call(serde_json::json!({"foo": "bar"}), ()).await?;
//! # Ok(())
//! # }
//! ```

use crate::{Error, Result};
use std::future::Future;

/// How a failed handler is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatchAllOptions {
    /// Log the failure with its full cause chain at error level.
    pub log_exception: bool,
    /// Return [`Error::CatchAll`]; otherwise the failure is swallowed and the
    /// handler answers `None`.
    pub raise_exception: bool,
}

impl CatchAllOptions {
    pub fn log_exception(mut self, enable: bool) -> Self {
        self.log_exception = enable;
        self
    }

    pub fn raise_exception(mut self, enable: bool) -> Self {
        self.raise_exception = enable;
        self
    }
}

impl Default for CatchAllOptions {
    fn default() -> Self {
        Self {
            log_exception: true,
            raise_exception: true,
        }
    }
}

/// Run `handler` once, converting any failure according to `options`.
pub async fn catchall<T, F, Fut>(options: CatchAllOptions, handler: F) -> Result<Option<T>>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    match handler().await {
        Ok(response) => Ok(Some(response)),
        Err(err) => {
            if options.log_exception {
                tracing::error!(error = ?err, "Catchall exception logging");
            }
            if options.raise_exception {
                return Err(Error::CatchAll(format!("{:#}", err)));
            }
            Ok(None)
        }
    }
}

/// A Lambda handler `(event, context) -> response` wrapped with [`catchall`].
pub struct CatchAll<H> {
    handler: H,
    options: CatchAllOptions,
}

impl<H> CatchAll<H> {
    pub fn new(handler: H, options: CatchAllOptions) -> Self {
        Self { handler, options }
    }

    pub async fn call<E, C, T, Fut>(&self, event: E, context: C) -> Result<Option<T>>
    where
        H: Fn(E, C) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        catchall(self.options, || (self.handler)(event, context)).await
    }
}
