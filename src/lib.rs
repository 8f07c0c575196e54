/*
 * This file is part of the lifecycle-supervisor distribution.
 *
 * Licensed under the MIT license. See LICENSE file in the project root for details.
 */

//! A component lifecycle supervisor.
//!
//! A [`Supervisor`] brings up a registered list of [`Component`]s through an ordered Setup
//! stage, runs their Start bodies concurrently, gates on a readiness [`Probe`](Phase::Probe) of
//! every component plus a one-shot ready callback, and tears everything down again in reverse
//! Setup order once a [`Wire`] says to stop. See each module for the stage it owns:
//!
//! - [`component`] — the [`Component`] trait and the factory helpers built on it.
//! - [`supervisor`] — [`Supervisor`] itself and the Run algorithm.
//! - [`config`] — functional-options configuration, the [`Logger`] and [`ReadyCallback`] seams.
//! - [`backoff`] — retry policies consulted by the Probe stage.
//! - [`exit_code`] — the process-facing [`ExitCode`].
//! - [`wire`] — the [`Wire`] trait deciding when a run stops.
//! - [`singleton`] — a memoising once-cell, independent of the supervisor core.
//! - [`env`] — a small `.env`-style loader, independent of the supervisor core.

mod backoff;
mod component;
mod config;
mod decorator;
mod exit_code;
mod supervisor;
mod wire;

pub mod env;
pub mod singleton;

pub use backoff::{BackoffError, ExponentialBackoff, FixedBackoff, LinearBackoff, ReadyCheckBackoff, default_backoff};
pub use component::{
    Component, ComponentError, Phase, close_component, make_component, make_probe_component, setup_component,
};
pub use config::{
    Logger, NoopLogger, Option_, ReadyCallback, TracingLogger, with_close_timeout, with_logger, with_noop_logger,
    with_ready_callback, with_ready_check_backoff, with_root_token, with_setup_timeout, with_start_timeout,
};
pub use exit_code::ExitCode;
pub use supervisor::Supervisor;
pub use wire::{SignalWire, TestingWire, Wire, WireRelease};
