/*
 * This file is part of the lifecycle-supervisor distribution.
 *
 * Licensed under the MIT license. See LICENSE file in the project root for details.
 */

use async_trait::async_trait;
use std::borrow::Cow;
use std::fmt;
use tokio_util::sync::CancellationToken;

/// One of the five phases a [`Component`] is driven through.
///
/// Used to tag errors and log events so a failure can be attributed to the point in the
/// lifecycle where it happened.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Phase {
    /// Prepares a component before any Start is entered.
    Setup,
    /// Runs a component's main body; may block until cancelled.
    Start,
    /// Queries readiness after Start, repeatedly until success.
    Probe,
    /// The one-shot hook invoked after every Probe has succeeded.
    Ready,
    /// Releases a component's resources in reverse Setup order.
    Close,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Setup => "setup",
            Self::Start => "start",
            Self::Probe => "probe",
            Self::Ready => "ready",
            Self::Close => "close",
        };
        f.write_str(name)
    }
}

/// An error crossing the decoration boundary: either a component callback returned an error, or
/// it panicked and was caught before the panic could unwind into the supervisor.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ComponentError {
    /// A component's phase callback returned an error.
    #[error("{phase} failed for component {name}: {source}")]
    Failed {
        /// The component's name.
        name: String,
        /// The phase in which the error occurred.
        phase: Phase,
        /// The user-supplied error.
        #[source]
        source: anyhow::Error,
    },

    /// A component's phase callback panicked; the panic was caught at the decoration boundary.
    #[error("{phase} panicked for component {name}: {message}")]
    Panicked {
        /// The component's name.
        name: String,
        /// The phase in which the panic occurred.
        phase: Phase,
        /// The panic payload, stringified on a best-effort basis.
        message: String,
    },

    /// A Probe was invoked before the 15 ms start-delay gate elapsed.
    #[error("component {name} is not started yet")]
    NotStarted {
        /// The component's name.
        name: String,
    },

    /// A `make_component`/`make_probe_component` factory did not produce a usable inner
    /// component (the Rust analogue of Go's nil-interface check).
    #[error("component {name}: factory did not produce a component")]
    NilComponent {
        /// The component's name.
        name: String,
    },
}

/// A unit of managed lifetime supplied to a [`crate::Supervisor`].
///
/// Only [`Component::start`] is required. The other phases default to no-ops, which is the
/// idiomatic Rust stand-in for Go's duck-typed "implements this optional interface or not":
/// a component "has" a capability exactly when it overrides the corresponding method. The
/// supervisor drives every component through the same five-phase sequence regardless of which
/// methods were overridden.
///
/// Implementations that don't need the cancellation token for Setup/Close may simply ignore it;
/// this collapses Go's separate `Setup()`/`Setup(ctx)` arities into one method.
#[async_trait]
pub trait Component: Send + Sync {
    /// Runs the component's main body.
    ///
    /// Expected to run until `token` is cancelled for components that represent an ongoing
    /// service (an HTTP server, a worker loop); components that merely perform a one-shot action
    /// may return immediately.
    ///
    /// # Errors
    ///
    /// Returning an error terminates the run with [`crate::ExitCode::Internal`] and cancels the
    /// sibling Start tasks.
    async fn start(&self, token: CancellationToken) -> anyhow::Result<()>;

    /// Prepares the component before any Start is entered. Runs sequentially, in registration
    /// order, before the component (or any other component) is started.
    ///
    /// # Errors
    ///
    /// Returning an error terminates the run with [`crate::ExitCode::SetupFailed`] without
    /// starting any component.
    async fn setup(&self, token: CancellationToken) -> anyhow::Result<()> {
        let _ = token;
        Ok(())
    }

    /// Releases the component's resources. Runs after Setup of this component succeeded,
    /// regardless of whether Start ever ran, in the exact reverse order Setup was invoked.
    ///
    /// Close errors are logged but never escalate the run's exit code (only a Close stage
    /// *timeout* does).
    ///
    /// # Errors
    ///
    /// Returning an error is logged with this component's name but otherwise ignored.
    async fn close(&self, token: CancellationToken) -> anyhow::Result<()> {
        let _ = token;
        Ok(())
    }

    /// Queries whether the component is ready, called repeatedly after Start until it succeeds.
    ///
    /// The supervisor enforces a fixed ~15 ms delay after Start before the first call reaches
    /// this method, regardless of whether it was overridden.
    ///
    /// # Errors
    ///
    /// Returning an error is treated as "not ready yet" and retried according to the configured
    /// [`crate::ReadyCheckBackoff`].
    async fn probe(&self, token: CancellationToken) -> anyhow::Result<()> {
        let _ = token;
        Ok(())
    }

    /// Returns this component's name, used in logs and error messages.
    ///
    /// Defaults to the component's concrete type name.
    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed(std::any::type_name::<Self>())
    }
}

/// Creates a component whose only action is a Setup closure.
///
/// Its Start, Probe, and Close are all no-ops. A convenience for one-shot preparation steps
/// (e.g. validating configuration) that don't need their own type.
pub fn setup_component<F>(name: impl Into<String>, setup: F) -> impl Component
where
    F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
{
    ClosureComponent {
        name: name.into(),
        setup: Some(Box::new(move |_token| setup())),
        close: None,
    }
}

/// Creates a component whose only action is a Close closure.
///
/// Its Setup, Start, and Probe are all no-ops. A convenience for registering a bare cleanup
/// action (e.g. flushing a buffer) without a type of its own.
pub fn close_component<F>(name: impl Into<String>, close: F) -> impl Component
where
    F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
{
    ClosureComponent {
        name: name.into(),
        setup: None,
        close: Some(Box::new(move |_token| close())),
    }
}

type PhaseFn = Box<dyn Fn(CancellationToken) -> anyhow::Result<()> + Send + Sync>;

struct ClosureComponent {
    name: String,
    setup: Option<PhaseFn>,
    close: Option<PhaseFn>,
}

#[async_trait]
impl Component for ClosureComponent {
    async fn start(&self, _token: CancellationToken) -> anyhow::Result<()> {
        Ok(())
    }

    async fn setup(&self, token: CancellationToken) -> anyhow::Result<()> {
        self.setup.as_ref().map_or(Ok(()), |f| f(token))
    }

    async fn close(&self, token: CancellationToken) -> anyhow::Result<()> {
        self.close.as_ref().map_or(Ok(()), |f| f(token))
    }

    fn name(&self) -> Cow<'static, str> {
        Cow::Owned(self.name.clone())
    }
}

/// Creates a component whose Setup invokes a factory to build an inner value, then delegates
/// every other phase to it.
///
/// Useful when the component's real type isn't needed as a reference elsewhere in the
/// application; only its lifecycle needs managing (e.g. a database pool built from config that
/// no other component touches directly).
///
/// # Errors
///
/// If the factory returns `Ok(None)`, Setup fails with [`ComponentError::NilComponent`] — the
/// Rust analogue of Go's nil-interface check on a factory result.
pub fn make_component<T, F>(name: impl Into<String>, factory: F) -> impl Component
where
    T: Component + 'static,
    F: Fn() -> anyhow::Result<Option<T>> + Send + Sync + 'static,
{
    MakeComponent {
        name: name.into(),
        factory: Box::new(factory),
        probe: None,
        inner: tokio::sync::RwLock::new(None),
    }
}

/// As [`make_component`], but with an explicit Probe function run against the constructed inner
/// component instead of the inner component's own (possibly absent) Probe.
pub fn make_probe_component<T, F, P>(name: impl Into<String>, factory: F, probe: P) -> impl Component
where
    T: Component + 'static,
    F: Fn() -> anyhow::Result<Option<T>> + Send + Sync + 'static,
    P: Fn(&T, CancellationToken) -> anyhow::Result<()> + Send + Sync + 'static,
{
    MakeComponent {
        name: name.into(),
        factory: Box::new(factory),
        probe: Some(Box::new(probe)),
        inner: tokio::sync::RwLock::new(None),
    }
}

type MakeFactory<T> = Box<dyn Fn() -> anyhow::Result<Option<T>> + Send + Sync>;
type MakeProbe<T> = Box<dyn Fn(&T, CancellationToken) -> anyhow::Result<()> + Send + Sync>;

struct MakeComponent<T> {
    name: String,
    factory: MakeFactory<T>,
    probe: Option<MakeProbe<T>>,
    // Holds an `Arc` rather than `T` directly so long-running calls (notably Start, which is
    // expected to block until cancelled) don't hold the lock and starve Probe/Close.
    inner: tokio::sync::RwLock<Option<std::sync::Arc<T>>>,
}

impl<T> MakeComponent<T>
where
    T: Component + 'static,
{
    async fn inner(&self) -> anyhow::Result<std::sync::Arc<T>> {
        self.inner
            .read()
            .await
            .clone()
            .ok_or_else(|| anyhow::Error::new(ComponentError::NilComponent { name: self.name.clone() }))
    }
}

#[async_trait]
impl<T> Component for MakeComponent<T>
where
    T: Component + 'static,
{
    async fn setup(&self, token: CancellationToken) -> anyhow::Result<()> {
        let built = (self.factory)()?.ok_or_else(|| {
            anyhow::Error::new(ComponentError::NilComponent {
                name: self.name.clone(),
            })
        })?;
        built.setup(token).await?;
        *self.inner.write().await = Some(std::sync::Arc::new(built));
        Ok(())
    }

    async fn start(&self, token: CancellationToken) -> anyhow::Result<()> {
        self.inner().await?.start(token).await
    }

    async fn close(&self, token: CancellationToken) -> anyhow::Result<()> {
        self.inner().await?.close(token).await
    }

    async fn probe(&self, token: CancellationToken) -> anyhow::Result<()> {
        let inner = self.inner().await?;
        match &self.probe {
            Some(probe) => probe(&inner, token),
            None => inner.probe(token).await,
        }
    }

    fn name(&self) -> Cow<'static, str> {
        Cow::Owned(self.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl Component for Noop {
        async fn start(&self, _token: CancellationToken) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn default_name_falls_back_to_the_type_name() {
        let c = Noop;
        assert!(c.name().contains("Noop"));
    }

    #[tokio::test]
    async fn setup_component_runs_only_its_closure() {
        let c = setup_component("probe-config", || Ok(()));
        assert_eq!(c.name(), "probe-config");
        c.setup(CancellationToken::new()).await.unwrap();
        c.start(CancellationToken::new()).await.unwrap();
        c.close(CancellationToken::new()).await.unwrap();
    }

    #[tokio::test]
    async fn make_component_delegates_to_the_factory_output() {
        struct Inner(std::sync::atomic::AtomicBool);

        #[async_trait]
        impl Component for Inner {
            async fn start(&self, _token: CancellationToken) -> anyhow::Result<()> {
                self.0.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok(())
            }
        }

        let c = make_component("db", || Ok(Some(Inner(std::sync::atomic::AtomicBool::new(false)))));
        c.setup(CancellationToken::new()).await.unwrap();
        c.start(CancellationToken::new()).await.unwrap();
    }

    #[tokio::test]
    async fn make_component_fails_setup_when_factory_yields_none() {
        let c = make_component::<Noop, _>("db", || Ok(None));
        let err = c.setup(CancellationToken::new()).await.unwrap_err();
        assert!(err.to_string().contains("did not produce"));
    }
}
