/*
 * This file is part of the lifecycle-supervisor distribution.
 *
 * Licensed under the MIT license. See LICENSE file in the project root for details.
 */

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// The external arbiter that decides when a [`crate::Supervisor`] is permitted to stop.
///
/// Given the supervisor's root cancellation token, a `Wire` derives a run token that it MUST
/// cancel when the process should shut down, plus a release handle the supervisor guarantees to
/// invoke exactly once before [`crate::Supervisor::run`] returns.
#[async_trait]
pub trait Wire: Send + Sync {
    /// Derives a run token from `parent` and returns it alongside a release handle.
    async fn wire(&self, parent: CancellationToken) -> (CancellationToken, WireRelease);
}

/// A handle released by the supervisor once a run has finished.
///
/// Must be idempotent: the supervisor may call it exactly once, but implementations should not
/// assume anything stronger than "at most once" of any single release handle, since a caller
/// driving the `Wire` trait directly (outside the supervisor) could invoke it more than once.
pub struct WireRelease(Box<dyn FnMut() + Send>);

impl WireRelease {
    /// Wraps a closure as a release handle.
    #[must_use]
    pub fn new(release: impl FnMut() + Send + 'static) -> Self {
        Self(Box::new(release))
    }

    /// A release handle that does nothing.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(|| {})
    }

    /// Invokes the release action.
    pub fn release(&mut self) {
        (self.0)();
    }
}

/// A [`Wire`] that cancels the run token when `ctrl_c` (or, on unix, `SIGTERM`) is received.
///
/// The signal listener is spawned once per call to [`Wire::wire`] and is released by dropping
/// the listener task's handle; the release handle aborts it so repeated `wire` calls on the same
/// process (primarily useful in tests) don't accumulate listeners.
#[derive(Clone, Copy, Debug, Default)]
pub struct SignalWire;

#[async_trait]
impl Wire for SignalWire {
    async fn wire(&self, parent: CancellationToken) -> (CancellationToken, WireRelease) {
        let run_token = parent.child_token();

        let handle = tokio::spawn({
            let run_token = run_token.clone();
            async move {
                #[cfg(unix)]
                {
                    let mut sigterm =
                        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                            Ok(sigterm) => sigterm,
                            Err(err) => {
                                tracing::error!(%err, "failed to install SIGTERM handler");
                                return;
                            }
                        };

                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = sigterm.recv() => {}
                        () = run_token.cancelled() => { return; }
                    }
                }

                #[cfg(not(unix))]
                {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        () = run_token.cancelled() => { return; }
                    }
                }

                tracing::info!("shutdown signal received, cancelling run token");
                run_token.cancel();
            }
        });

        (run_token, WireRelease::new(move || handle.abort()))
    }
}

/// A [`Wire`] that cancels the run token once a supplied async closure completes.
///
/// The Rust analogue of wrapping a `testing.M.Run()` call: useful for embedding a supervisor
/// inside a broader async test harness that should drive its own shutdown.
pub struct TestingWire<F> {
    run: std::sync::Mutex<Option<F>>,
}

impl<F, Fut> TestingWire<F>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    /// Wraps a harness-completion future `run` as a [`Wire`].
    pub fn new(run: F) -> Self {
        Self {
            run: std::sync::Mutex::new(Some(run)),
        }
    }
}

#[async_trait]
impl<F, Fut> Wire for TestingWire<F>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn wire(&self, parent: CancellationToken) -> (CancellationToken, WireRelease) {
        let run_token = parent.child_token();
        let run = self.run.lock().expect("TestingWire::wire called more than once").take();

        let handle = tokio::spawn({
            let run_token = run_token.clone();
            async move {
                if let Some(run) = run {
                    run().await;
                }
                run_token.cancel();
            }
        });

        (run_token, WireRelease::new(move || handle.abort()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn testing_wire_cancels_when_the_harness_completes() {
        let wire = TestingWire::new(|| async {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        });
        let (token, mut release) = wire.wire(CancellationToken::new()).await;
        token.cancelled().await;
        release.release();
    }

    #[tokio::test]
    async fn run_token_is_a_child_of_the_parent() {
        let wire = TestingWire::new(|| async {
            std::future::pending::<()>().await;
        });
        let parent = CancellationToken::new();
        let (token, mut release) = wire.wire(parent.clone()).await;
        assert!(!token.is_cancelled());
        parent.cancel();
        token.cancelled().await;
        release.release();
    }
}
