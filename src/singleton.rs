/*
 * This file is part of the lifecycle-supervisor distribution.
 *
 * Licensed under the MIT license. See LICENSE file in the project root for details.
 */

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU8, Ordering};

/// Memoises the first call to a fallible factory.
///
/// Subsequent calls to [`Singleton::get`] return the cached value without re-invoking the
/// factory. If the factory fails (or panics), that failure is cached too — every later call
/// re-raises it as a panic. This is meant for application-wiring contexts where a construction
/// failure is always fatal and a panic is an acceptable way to surface it.
///
/// The single-assignment state machine (`Uninit` / `Busy` / `Init`) is the same shape used
/// elsewhere in this crate's ecosystem for a thread-safe once-cell; this type adds a poisoned
/// terminal state for the failure case.
pub struct Singleton<T, F> {
    state: AtomicU8,
    value: UnsafeCell<Option<T>>,
    poison: UnsafeCell<Option<String>>,
    factory: UnsafeCell<Option<F>>,
}

#[repr(u8)]
enum State {
    Uninit = 0,
    Busy = 1,
    Init = 2,
    Poisoned = 3,
}

// SAFETY: access to `value`/`poison`/`factory` is gated by the `state` compare-exchange below,
// which guarantees at most one thread ever holds the `Busy` state and that all other threads
// only read after observing `Init`/`Poisoned` (acquire/release pair).
unsafe impl<T: Send, F: Send> Send for Singleton<T, F> {}
unsafe impl<T: Sync + Send, F: Send> Sync for Singleton<T, F> {}

impl<T, F> Singleton<T, F>
where
    F: FnOnce() -> anyhow::Result<T>,
{
    /// Creates a singleton over `factory`, not yet invoked.
    pub fn new(factory: F) -> Self {
        Self {
            state: AtomicU8::new(State::Uninit as u8),
            value: UnsafeCell::new(None),
            poison: UnsafeCell::new(None),
            factory: UnsafeCell::new(Some(factory)),
        }
    }

    /// Returns the memoised value, computing it on the first call.
    ///
    /// # Panics
    ///
    /// Panics if the factory returned an error or panicked on this or any earlier call.
    pub fn get(&self) -> &T
    where
        T: std::panic::UnwindSafe,
        F: std::panic::UnwindSafe,
    {
        loop {
            match self.state.compare_exchange(
                State::Uninit as u8,
                State::Busy as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.initialize();
                    continue;
                }
                Err(observed) if observed == State::Busy as u8 => {
                    std::hint::spin_loop();
                    continue;
                }
                Err(observed) if observed == State::Init as u8 => {
                    // SAFETY: `Init` is only ever stored after `value` is written, with a
                    // release store paired with the acquire load above.
                    return unsafe { &*self.value.get() }.as_ref().expect("Init implies a value");
                }
                Err(_) => {
                    // SAFETY: `Poisoned` is only ever stored after `poison` is written.
                    let message = unsafe { &*self.poison.get() }
                        .as_deref()
                        .unwrap_or("singleton factory failed")
                        .to_string();
                    panic!("{message}");
                }
            }
        }
    }

    fn initialize(&self) {
        // SAFETY: only the thread that won the `Uninit -> Busy` transition reaches here, and it
        // is the sole writer until it stores `Init`/`Poisoned`.
        let factory = unsafe { &mut *self.factory.get() }
            .take()
            .expect("factory consumed exactly once, guarded by the Busy state");

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(factory));

        match result {
            Ok(Ok(value)) => {
                // SAFETY: see above.
                unsafe { *self.value.get() = Some(value) };
                self.state.store(State::Init as u8, Ordering::Release);
            }
            Ok(Err(err)) => {
                // SAFETY: see above.
                unsafe { *self.poison.get() = Some(err.to_string()) };
                self.state.store(State::Poisoned as u8, Ordering::Release);
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "singleton factory panicked".to_string());
                // SAFETY: see above.
                unsafe { *self.poison.get() = Some(message) };
                self.state.store(State::Poisoned as u8, Ordering::Release);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn computes_the_value_exactly_once() {
        let calls = AtomicUsize::new(0);
        let singleton = Singleton::new(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(42)
        });

        assert_eq!(*singleton.get(), 42);
        assert_eq!(*singleton.get(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn a_failing_factory_poisons_every_later_call() {
        let singleton: Singleton<i32, _> = Singleton::new(|| anyhow::bail!("construction failed"));

        let first = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| singleton.get()));
        assert!(first.is_err());

        let second = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| singleton.get()));
        assert!(second.is_err());
    }
}
