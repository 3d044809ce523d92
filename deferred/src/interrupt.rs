use std::{
    error::Error,
    fmt::Display,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use deferred_core::{ErrorValue, Value};

/// The secondary signal that long-running deferred work checks to emulate
/// cancellation: a deferred itself cannot be cancelled once constructed.
#[derive(Clone, Debug, Default)]
pub struct InterruptState {
    interrupted: Arc<AtomicBool>,
}

#[derive(Clone, Debug)]
pub struct InterruptedError {}
impl Display for InterruptedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "interrupted")
    }
}
impl Error for InterruptedError {}

impl InterruptState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_interrupted(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    pub fn check_interrupted(&self) -> anyhow::Result<()> {
        if self.is_interrupted() {
            Err(InterruptedError {}.into())
        } else {
            Ok(())
        }
    }

    /// Like [`InterruptState::check_interrupted`], as a rejection reason.
    pub fn check_interrupted_value(&self) -> Result<(), Value> {
        if self.is_interrupted() {
            Err(ErrorValue::interrupted().into())
        } else {
            Ok(())
        }
    }
}

fn set_process_interrupt_handler(interrupted: &InterruptState) {
    let interrupted = interrupted.clone();
    ctrlc::set_handler(move || {
        tracing::info!("interrupt received; finishing outstanding timers");
        interrupted.set_interrupted();
    })
    .expect("Error setting interrupt handler");
}

pub fn set_up_process_interrupt_handler() -> InterruptState {
    let interrupt_state = InterruptState::new();
    set_process_interrupt_handler(&interrupt_state);
    interrupt_state
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interruption_is_shared_between_clones() {
        let state = InterruptState::new();
        let clone = state.clone();
        assert!(state.check_interrupted().is_ok());
        clone.set_interrupted();
        assert!(state.is_interrupted());
        assert_eq!(state.check_interrupted().unwrap_err().to_string(), "interrupted");
        assert_eq!(
            state.check_interrupted_value(),
            Err(ErrorValue::interrupted().into())
        );
    }
}
