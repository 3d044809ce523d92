//! Timer-backed deferreds.
use std::time::Duration;

use deferred_core::{Deferred, Value};

use crate::host::Host;

/// A deferred fulfilled with `value` once `duration` has elapsed.
///
/// Rejects with an interruption error instead if the host was interrupted in
/// the meantime.
pub fn delay(host: &Host, duration: Duration, value: Value) -> Deferred {
    let host2 = host.clone();
    Deferred::new(&host.scheduler(), move |fulfill, reject| {
        let interrupt_state = host2.interrupt_state().clone();
        host2.set_timeout(duration, move || {
            match interrupt_state.check_interrupted_value() {
                Ok(()) => fulfill.call(value),
                Err(reason) => reject.call(reason),
            }
        });
        Ok(())
    })
}

/// A deferred rejected with `reason` once `duration` has elapsed.
pub fn delay_reject(host: &Host, duration: Duration, reason: Value) -> Deferred {
    let host2 = host.clone();
    Deferred::new(&host.scheduler(), move |_, reject| {
        host2.set_timeout(duration, move || reject.call(reason));
        Ok(())
    })
}
