/*
 * This file is part of the lifecycle-supervisor distribution.
 *
 * Licensed under the MIT license. See LICENSE file in the project root for details.
 */

use crate::backoff::{ReadyCheckBackoff, default_backoff};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A trivial two-method logging sink, kept deliberately minimal.
///
/// The crate's own internal diagnostics always go through `tracing` regardless of which
/// `Logger` is configured here; this trait exists for callers who want a lightweight sink they
/// can bridge to whatever logging stack their application already uses.
pub trait Logger: Send + Sync {
    /// Logs an informational message.
    fn info(&self, message: &str);
    /// Logs an error message.
    fn error(&self, message: &str);
}

/// A [`Logger`] that discards everything. The default.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn info(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
}

/// A [`Logger`] that forwards to the `tracing` crate at `info!`/`error!`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn info(&self, message: &str) {
        tracing::info!("{message}");
    }

    fn error(&self, message: &str) {
        tracing::error!("{message}");
    }
}

/// A one-shot hook invoked after every component's Probe has succeeded.
#[async_trait]
pub trait ReadyCallback: Send + Sync {
    /// Runs the readiness hook.
    ///
    /// # Errors
    ///
    /// Returning an error terminates the run with [`crate::ExitCode::Internal`].
    async fn ready(&self, token: CancellationToken) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> ReadyCallback for F
where
    F: Fn(CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn ready(&self, token: CancellationToken) -> anyhow::Result<()> {
        self(token).await
    }
}

struct NoopReady;

#[async_trait]
impl ReadyCallback for NoopReady {
    async fn ready(&self, _token: CancellationToken) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Immutable configuration for a [`crate::Supervisor`], built through [`ConfigBuilder`].
#[derive(Clone)]
pub struct Config {
    pub(crate) logger: Arc<dyn Logger>,
    pub(crate) root_token: CancellationToken,
    pub(crate) setup_timeout: Option<Duration>,
    pub(crate) start_timeout: Option<Duration>,
    pub(crate) close_timeout: Duration,
    pub(crate) ready_callback: Arc<dyn ReadyCallback>,
    pub(crate) ready_check_backoff: Arc<dyn ReadyCheckBackoff>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logger: Arc::new(TracingLogger),
            root_token: CancellationToken::new(),
            setup_timeout: None,
            start_timeout: None,
            close_timeout: Duration::from_secs(10),
            ready_callback: Arc::new(NoopReady),
            ready_check_backoff: default_backoff().into(),
        }
    }
}

/// A closure-based option, applied to a [`Config`] while building a [`crate::Supervisor`].
///
/// Mirrors the teacher ecosystem's "functional options" pattern: each option is a boxed closure
/// that mutates the config in place.
pub struct Option_(Box<dyn FnOnce(&mut Config)>);

impl Option_ {
    fn new(apply: impl FnOnce(&mut Config) + 'static) -> Self {
        Self(Box::new(apply))
    }
}

/// Configures the [`Logger`] sink used for phase and error traces.
#[must_use]
pub fn with_logger(logger: impl Logger + 'static) -> Option_ {
    Option_::new(move |cfg| cfg.logger = Arc::new(logger))
}

/// Disables logging entirely (the default is [`TracingLogger`], not this).
#[must_use]
pub fn with_noop_logger() -> Option_ {
    with_logger(NoopLogger)
}

/// Configures the parent cancellation token the run token is derived from.
///
/// Defaults to a token that never fires on its own; the caller must still arrange for
/// cancellation via a [`crate::Wire`] or this token.
#[must_use]
pub fn with_root_token(token: CancellationToken) -> Option_ {
    Option_::new(move |cfg| cfg.root_token = token)
}

/// Bounds the aggregate wall-clock time for the Setup stage. `None` (the default) disables the
/// bound.
#[must_use]
pub fn with_setup_timeout(timeout: Duration) -> Option_ {
    Option_::new(move |cfg| cfg.setup_timeout = Some(timeout))
}

/// Bounds the wall-clock time for the Probe stage to reach readiness. `None` (the default)
/// disables the bound.
#[must_use]
pub fn with_start_timeout(timeout: Duration) -> Option_ {
    Option_::new(move |cfg| cfg.start_timeout = Some(timeout))
}

/// Bounds the wall-clock time for the Close stage. Defaults to 10 seconds.
#[must_use]
pub fn with_close_timeout(timeout: Duration) -> Option_ {
    Option_::new(move |cfg| cfg.close_timeout = timeout)
}

/// Configures the one-shot hook invoked after every Probe succeeds. Defaults to a no-op.
#[must_use]
pub fn with_ready_callback(callback: impl ReadyCallback + 'static) -> Option_ {
    Option_::new(move |cfg| cfg.ready_callback = Arc::new(callback))
}

/// Configures the retry policy consulted after every failed Probe. Defaults to
/// [`crate::LinearBackoff`] at 100 ms per attempt.
#[must_use]
pub fn with_ready_check_backoff(backoff: impl ReadyCheckBackoff + 'static) -> Option_ {
    Option_::new(move |cfg| cfg.ready_check_backoff = Arc::new(backoff))
}

pub(crate) fn build_config(options: Vec<Option_>) -> Config {
    let mut cfg = Config::default();
    for option in options {
        (option.0)(&mut cfg);
    }
    cfg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_table() {
        let cfg = build_config(vec![]);
        assert_eq!(cfg.setup_timeout, None);
        assert_eq!(cfg.start_timeout, None);
        assert_eq!(cfg.close_timeout, Duration::from_secs(10));
    }

    #[test]
    fn options_apply_in_order() {
        let cfg = build_config(vec![
            with_close_timeout(Duration::from_secs(1)),
            with_setup_timeout(Duration::from_millis(50)),
        ]);
        assert_eq!(cfg.close_timeout, Duration::from_secs(1));
        assert_eq!(cfg.setup_timeout, Some(Duration::from_millis(50)));
    }
}
