//! Target-mode emulation loop: `TgInitAsTarget` → loop over (`TgGetData` →
//! dispatch → `TgSetData`) → re-arm on disconnect, until cancelled.
//!
//! Cancellation is cooperative: a shared atomic boolean is checked at the
//! top of both loops and between every command, mirroring the "no
//! preemptive kill" cancellation model `dfu/protocol.rs`'s staged upload
//! uses for its own progress callback checks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::commands::{set_parameters, tg_get_data, tg_init_as_target, tg_set_data, EMULATION_PARAMETERS_FLAG};
use crate::config::TGGET_MAX_CONSECUTIVE_TIMEOUTS;
use crate::dispatch::Dispatcher;
use crate::error::Pn532Error;
use crate::transport::Transport;

/// Shared cancellation flag handed to [`run`] and held by the caller's
/// [`crate::driver::EmulationHandle`].
#[derive(Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs the emulation loop until `cancel` is observed. Intended to run on
/// its own worker thread, holding the transport's lock for its entire
/// active lifetime (§5's "the emulation loop runs in its own worker,
/// holding the lock the entire time it is active").
pub fn run(transport: &mut Transport, mut dispatcher: Dispatcher, cancel: &CancelToken) -> Result<(), Pn532Error> {
    if !transport.is_open() {
        transport.open()?;
    }
    transport.wake_up()?;
    crate::commands::sam_configuration_with_recovery(transport)?;
    crate::commands::tune_rf_for_target_mode_peer(transport)?;
    set_parameters(transport, EMULATION_PARAMETERS_FLAG)?;

    while !cancel.is_cancelled() {
        let Some(_init_response) = tg_init_as_target(transport) else {
            continue;
        };

        let mut consecutive_timeouts = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }

            let Some(get_data_response) = tg_get_data(transport) else {
                consecutive_timeouts += 1;
                if consecutive_timeouts >= TGGET_MAX_CONSECUTIVE_TIMEOUTS {
                    break;
                }
                continue;
            };
            consecutive_timeouts = 0;

            if get_data_response.len() < 3 {
                break;
            }
            let status = get_data_response[2];
            if status != 0x00 {
                // 0x29 ("released by initiator") and any other non-zero
                // status both mean this session is over.
                break;
            }

            let c_apdu = &get_data_response[3..];
            let r_apdu = dispatcher.handle_apdu(c_apdu);

            let Some(set_data_response) = tg_set_data(transport, &r_apdu) else {
                break;
            };
            if set_data_response.len() >= 3 && set_data_response[2] != 0x00 {
                break;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_reflects_store_across_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
