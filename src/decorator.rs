/*
 * This file is part of the lifecycle-supervisor distribution.
 *
 * Licensed under the MIT license. See LICENSE file in the project root for details.
 */

use crate::component::{Component, ComponentError, Phase};
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// The minimum time that must elapse after Start is entered before Probe is allowed to observe
/// a ready state. Probes launched in parallel with Start would otherwise race Start's initial
/// side effects.
const PROBE_DELAY: std::time::Duration = std::time::Duration::from_millis(15);

/// A [`Component`] normalised into a uniform, panic-safe five-operation record.
///
/// Every call the supervisor makes into user code goes through a `DecoratedComponent` rather
/// than the raw [`Component`] trait object, so that a panicking callback is converted into a
/// [`ComponentError::Panicked`] instead of unwinding into the supervisor's own tasks.
pub(crate) struct DecoratedComponent {
    inner: Arc<dyn Component>,
    name: String,
    started_at_millis: AtomicI64,
    epoch: Instant,
}

/// Wraps `component` for supervisor use, capturing its name at the monomorphized call site.
///
/// Capturing the name here (rather than inside `DecoratedComponent`, which only ever sees the
/// trait object) is what lets the empty-name fallback use the component's *concrete* type, the
/// same trick the teacher's own optional lifecycle hooks use for their default names.
pub(crate) fn decorate<C>(component: C) -> DecoratedComponent
where
    C: Component + 'static,
{
    let raw_name = component.name();
    let name = if raw_name.is_empty() {
        std::any::type_name::<C>().to_string()
    } else {
        raw_name.into_owned()
    };

    DecoratedComponent {
        inner: Arc::new(component),
        name,
        started_at_millis: AtomicI64::new(0),
        epoch: Instant::now(),
    }
}

impl DecoratedComponent {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) async fn setup(&self, token: CancellationToken) -> Result<(), ComponentError> {
        self.call(Phase::Setup, self.inner.setup(token)).await
    }

    pub(crate) async fn start(&self, token: CancellationToken) -> Result<(), ComponentError> {
        self.started_at_millis
            .store(self.epoch.elapsed().as_millis() as i64 + 1, Ordering::SeqCst);
        self.call(Phase::Start, self.inner.start(token)).await
    }

    pub(crate) async fn close(&self, token: CancellationToken) -> Result<(), ComponentError> {
        self.call(Phase::Close, self.inner.close(token)).await
    }

    pub(crate) async fn probe(&self, token: CancellationToken) -> Result<(), ComponentError> {
        if !self.probe_is_ready() {
            return Err(ComponentError::NotStarted {
                name: self.name.clone(),
            });
        }

        self.call(Phase::Probe, self.inner.probe(token)).await
    }

    /// `true` once Start has been entered and at least [`PROBE_DELAY`] has elapsed since.
    ///
    /// `started_at_millis` stores `elapsed_ms + 1` so that `0` unambiguously means "Start has
    /// not been entered yet" — the Rust equivalent of Go's "non-zero timestamp" sentinel.
    fn probe_is_ready(&self) -> bool {
        let started = self.started_at_millis.load(Ordering::SeqCst);
        if started == 0 {
            return false;
        }

        let started_at = started - 1;
        let now = self.epoch.elapsed().as_millis() as i64;
        now.saturating_sub(started_at) >= PROBE_DELAY.as_millis() as i64
    }

    async fn call<F>(&self, phase: Phase, fut: F) -> Result<(), ComponentError>
    where
        F: Future<Output = anyhow::Result<()>> + Send,
    {
        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(ComponentError::Failed {
                name: self.name.clone(),
                phase,
                source,
            }),
            Err(panic) => Err(ComponentError::Panicked {
                name: self.name.clone(),
                phase,
                message: panic_message(&panic),
            }),
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
