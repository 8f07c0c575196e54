/*
 * This file is part of the lifecycle-supervisor distribution.
 *
 * Licensed under the MIT license. See LICENSE file in the project root for details.
 */

use crate::component::{Component, ComponentError};
use crate::config::{Config, Option_, build_config};
use crate::decorator::{DecoratedComponent, decorate};
use crate::exit_code::ExitCode;
use crate::wire::Wire;
use futures_util::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicIsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// The lifecycle state machine. Owns an ordered list of components and drives them through
/// Setup → Start → Ready → Close exactly once.
pub struct Supervisor {
    wire: Box<dyn Wire>,
    components: Vec<DecoratedComponent>,
    cfg: Config,
    running: AtomicBool,
}

/// Shared, immutable-after-construction state handed to every task spawned during a run.
///
/// Split out from [`Supervisor`] because [`Supervisor::run`] borrows `&mut self` for its whole
/// duration while the tasks it spawns need `'static`, independently-owned access to the
/// component list and configuration.
struct RunState {
    components: Vec<DecoratedComponent>,
    cfg: Config,
    /// Index of the last component whose Setup was attempted (inclusive); `-1` means none yet.
    /// Written by the Setup stage, then by the Close stage — the two never run concurrently.
    setup_cursor: AtomicIsize,
}

impl Supervisor {
    /// Creates a supervisor driven by `wire`, configured with `options`.
    pub fn new(wire: impl Wire + 'static, options: impl IntoIterator<Item = Option_>) -> Self {
        Self {
            wire: Box::new(wire),
            components: Vec::new(),
            cfg: build_config(options.into_iter().collect()),
            running: AtomicBool::new(false),
        }
    }

    /// Registers `component`, to be brought up in the order `add` was called.
    ///
    /// # Panics
    ///
    /// Panics if called after [`Supervisor::run`] has started — this is a programmer error, not
    /// a recoverable condition.
    pub fn add<C>(&mut self, component: C) -> &mut Self
    where
        C: Component + 'static,
    {
        assert!(
            !self.running.load(Ordering::SeqCst),
            "cannot add components after run() has started"
        );
        self.components.push(decorate(component));
        self
    }

    /// Executes the lifecycle exactly once, returning once the process is ready to exit.
    ///
    /// # Panics
    ///
    /// Panics if called more than once on the same supervisor.
    pub async fn run(&mut self) -> ExitCode {
        assert!(
            !self.running.swap(true, Ordering::SeqCst),
            "supervisor is already running"
        );

        if self.components.is_empty() {
            self.cfg.logger.info("no components registered; exiting immediately");
            tracing::debug!("run: no components registered, returning OK");
            return ExitCode::Ok;
        }

        let state = Arc::new(RunState {
            components: std::mem::take(&mut self.components),
            cfg: self.cfg.clone(),
            setup_cursor: AtomicIsize::new(-1),
        });

        let (run_token, mut release) = self.wire.wire(state.cfg.root_token.clone()).await;
        let (close_tx, close_rx) = tokio::sync::mpsc::channel(1);

        let watcher = tokio::spawn(run_watcher(Arc::clone(&state), run_token.clone(), close_rx));

        match run_setup_stage(&state, &run_token).await {
            Ok(()) => {
                tokio::spawn(run_start_stage(Arc::clone(&state), run_token.clone(), close_tx));
            }
            Err(code) => {
                let _ = close_tx.try_send(code);
            }
        }

        let code = watcher.await.unwrap_or(ExitCode::Internal);
        release.release();
        code
    }
}

/// Derives a child of `parent` that additionally cancels itself after `timeout` elapses, unless
/// `timeout` is `None` or zero (both mean "no bound").
fn derive_deadline_token(parent: &CancellationToken, timeout: Option<Duration>) -> CancellationToken {
    let token = parent.child_token();

    if let Some(timeout) = timeout.filter(|d| !d.is_zero()) {
        let timer_token = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(timeout) => timer_token.cancel(),
                () = timer_token.cancelled() => {}
            }
        });
    }

    token
}

#[tracing::instrument(name = "supervisor.setup", skip_all)]
async fn run_setup_stage(state: &Arc<RunState>, run_token: &CancellationToken) -> Result<(), ExitCode> {
    let timeout_token = derive_deadline_token(run_token, state.cfg.setup_timeout);

    for index in 0..state.components.len() {
        state.setup_cursor.store(index as isize, Ordering::SeqCst);

        let task_state = Arc::clone(state);
        let call_token = run_token.clone();
        let mut handle = tokio::spawn(async move { task_state.components[index].setup(call_token).await });

        tokio::select! {
            result = &mut handle => {
                let name = state.components[index].name();
                match result {
                    Ok(Ok(())) => {
                        state.cfg.logger.info(&format!("setup succeeded for component {name}"));
                        tracing::debug!(component = name, "setup succeeded");
                    }
                    Ok(Err(err)) => {
                        state.cfg.logger.error(&format!("setup failed for component {name}: {err}"));
                        tracing::error!(component = name, %err, "setup failed");
                        return Err(ExitCode::SetupFailed);
                    }
                    Err(join_err) => {
                        state.cfg.logger.error(&format!("setup helper task failed for component {name}: {join_err}"));
                        tracing::error!(component = name, %join_err, "setup helper task failed");
                        return Err(ExitCode::SetupFailed);
                    }
                }
            }
            () = timeout_token.cancelled() => {
                let name = state.components[index].name();
                state.cfg.logger.error("setup stage timed out");
                tracing::error!(component = name, "setup stage timed out");
                return Err(ExitCode::Interrupted);
            }
        }
    }

    Ok(())
}

#[tracing::instrument(name = "supervisor.close", skip_all)]
async fn run_close_stage(state: Arc<RunState>) -> ExitCode {
    let timeout_token = derive_deadline_token(&CancellationToken::new(), Some(state.cfg.close_timeout));

    loop {
        let index = state.setup_cursor.load(Ordering::SeqCst);
        if index < 0 {
            return ExitCode::Ok;
        }
        let index = index as usize;

        let task_state = Arc::clone(&state);
        let close_token = timeout_token.clone();
        let mut handle = tokio::spawn(async move { task_state.components[index].close(close_token).await });

        tokio::select! {
            result = &mut handle => {
                let name = state.components[index].name();
                match result {
                    Ok(Ok(())) => {
                        state.cfg.logger.info(&format!("closed component {name}"));
                        tracing::debug!(component = name, "close succeeded");
                    }
                    Ok(Err(err)) => {
                        state.cfg.logger.error(&format!("close failed for component {name}: {err}"));
                        tracing::error!(component = name, %err, "close failed, continuing");
                    }
                    Err(join_err) => {
                        state.cfg.logger.error(&format!("close helper task failed for component {name}: {join_err}"));
                        tracing::error!(component = name, %join_err, "close helper task failed, continuing");
                    }
                }
                state.setup_cursor.fetch_sub(1, Ordering::SeqCst);
            }
            () = timeout_token.cancelled() => {
                state.cfg.logger.error("close stage timed out");
                tracing::error!("close stage timed out");
                return ExitCode::Interrupted;
            }
        }
    }
}

#[tracing::instrument(name = "supervisor.watch", skip_all)]
async fn run_watcher(
    state: Arc<RunState>,
    run_token: CancellationToken,
    mut close_rx: tokio::sync::mpsc::Receiver<ExitCode>,
) -> ExitCode {
    let trigger = tokio::select! {
        () = run_token.cancelled() => ExitCode::Ok,
        received = close_rx.recv() => received.unwrap_or(ExitCode::Ok),
    };

    let close_code = run_close_stage(state).await;
    trigger.max_severity(close_code)
}

#[tracing::instrument(name = "supervisor.start", skip_all)]
async fn run_start_stage(
    state: Arc<RunState>,
    run_token: CancellationToken,
    close_tx: tokio::sync::mpsc::Sender<ExitCode>,
) {
    let probe_token = derive_deadline_token(&run_token, state.cfg.start_timeout);
    let start_token = run_token.child_token();

    let mut probe_tasks: FuturesUnordered<_> = (0..state.components.len())
        .map(|index| {
            let state = Arc::clone(&state);
            let token = probe_token.clone();
            tokio::spawn(run_probe_loop(state, index, token))
        })
        .collect();

    let mut start_tasks: FuturesUnordered<_> = (0..state.components.len())
        .map(|index| {
            let state = Arc::clone(&state);
            let token = start_token.clone();
            tokio::spawn(async move {
                let result = state.components[index].start(token).await;
                (index, result)
            })
        })
        .collect();

    let probes_and_ready = async {
        while let Some(joined) = probe_tasks.next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(code)) => return Err(code),
                Err(_join_err) => return Err(ExitCode::Internal),
            }
        }

        match state.cfg.ready_callback.ready(run_token.clone()).await {
            Ok(()) => Ok(()),
            Err(err) => {
                state.cfg.logger.error(&format!("ready callback failed: {err}"));
                tracing::error!(%err, "ready callback failed");
                Err(ExitCode::Internal)
            }
        }
    }
    .await;

    if let Err(code) = probes_and_ready {
        start_token.cancel();
        let _ = close_tx.try_send(code);
        return;
    }

    state.cfg.logger.info("all components are ready");
    tracing::info!("ready callback succeeded, all probes passed");

    let mut any_failed = false;
    while let Some(joined) = start_tasks.next().await {
        match joined {
            Ok((index, Ok(()))) => {
                let name = state.components[index].name();
                state.cfg.logger.info(&format!("component exited: {name}"));
                tracing::info!(component = name, "start task exited");
            }
            Ok((index, Err(err))) => {
                let name = state.components[index].name();
                state.cfg.logger.error(&format!("start failed for component {name}: {err}"));
                tracing::error!(component = name, %err, "start failed");
                any_failed = true;
                start_token.cancel();
            }
            Err(join_err) => {
                state.cfg.logger.error(&format!("start helper task failed: {join_err}"));
                tracing::error!(%join_err, "start helper task failed");
                any_failed = true;
                start_token.cancel();
            }
        }
    }

    let _ = close_tx.try_send(if any_failed { ExitCode::Internal } else { ExitCode::Ok });
}

async fn run_probe_loop(state: Arc<RunState>, index: usize, token: CancellationToken) -> Result<(), ExitCode> {
    let mut attempt: u32 = 0;

    loop {
        if token.is_cancelled() {
            return Err(ExitCode::Internal);
        }

        match state.components[index].probe(token.clone()).await {
            Ok(()) => {
                let name = state.components[index].name();
                tracing::debug!(component = name, "probe succeeded");
                return Ok(());
            }
            Err(ComponentError::Panicked { name, phase, message }) => {
                tracing::error!(component = %name, %phase, %message, "probe panicked, abandoning readiness wait");
                state
                    .cfg
                    .logger
                    .error(&format!("probe panicked for component {name}: {message}"));
                return Err(ExitCode::Internal);
            }
            Err(err) => {
                attempt += 1;
                let name = state.components[index].name();
                tracing::debug!(component = name, %err, attempt, "probe failed, consulting backoff");

                match state.cfg.ready_check_backoff.next_delay(&token, attempt) {
                    Ok(delay) => {
                        tokio::select! {
                            () = tokio::time::sleep(delay) => {}
                            () = token.cancelled() => return Err(ExitCode::Internal),
                        }
                    }
                    Err(backoff_err) => {
                        state.cfg.logger.error(&format!("readiness backoff gave up for {name}: {backoff_err}"));
                        tracing::error!(component = name, %backoff_err, "readiness backoff gave up");
                        return Err(ExitCode::Internal);
                    }
                }
            }
        }
    }
}
