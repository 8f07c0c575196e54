/*
 * This file is part of the lifecycle-supervisor distribution.
 *
 * Licensed under the MIT license. See LICENSE file in the project root for details.
 */

use async_trait::async_trait;
use lifecycle_supervisor::{Component, ExitCode, Supervisor, TestingWire, close_component, setup_component};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn wire_closing_after(delay: Duration) -> TestingWire<impl FnOnce() -> std::pin::Pin<Box<dyn Future<Output = ()> + Send>> + Send + 'static> {
    TestingWire::new(move || Box::pin(tokio::time::sleep(delay)) as std::pin::Pin<Box<dyn Future<Output = ()> + Send>>)
}

struct Server {
    started: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl Component for Server {
    async fn start(&self, token: CancellationToken) -> anyhow::Result<()> {
        self.started.fetch_add(1, Ordering::SeqCst);
        token.cancelled().await;
        Ok(())
    }

    async fn close(&self, _token: CancellationToken) -> anyhow::Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn a_small_application_runs_to_completion_cleanly() {
    let started = Arc::new(AtomicUsize::new(0));
    let closed = Arc::new(AtomicUsize::new(0));

    let mut supervisor = Supervisor::new(wire_closing_after(Duration::from_millis(25)), []);
    supervisor
        .add(setup_component("load-config", || Ok(())))
        .add(Server {
            started: Arc::clone(&started),
            closed: Arc::clone(&closed),
        })
        .add(close_component("flush-metrics", || Ok(())));

    let code = supervisor.run().await;

    assert_eq!(code, ExitCode::Ok);
    assert_eq!(started.load(Ordering::SeqCst), 1);
    assert_eq!(closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn a_setup_failure_prevents_every_start() {
    struct RejectsSetup;

    #[async_trait]
    impl Component for RejectsSetup {
        async fn setup(&self, _token: CancellationToken) -> anyhow::Result<()> {
            anyhow::bail!("bad configuration")
        }

        async fn start(&self, _token: CancellationToken) -> anyhow::Result<()> {
            panic!("start must never be reached when setup fails");
        }
    }

    let mut supervisor = Supervisor::new(wire_closing_after(Duration::from_secs(30)), []);
    supervisor.add(RejectsSetup);

    let code = supervisor.run().await;

    assert_eq!(code, ExitCode::SetupFailed);
}

#[tokio::test]
async fn an_empty_supervisor_exits_ok_without_touching_the_wire() {
    let mut supervisor = Supervisor::new(wire_closing_after(Duration::from_secs(30)), []);
    let code = tokio::time::timeout(Duration::from_secs(1), supervisor.run())
        .await
        .expect("an empty supervisor must not wait on the wire");
    assert_eq!(code, ExitCode::Ok);
}
