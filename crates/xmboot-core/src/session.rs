//! Boot session - high-level orchestrator for firmware update attempts.
//!
//! Reproduces the bootloader's outer shell: prompt the sender, erase the
//! image region, run one Xmodem transfer, and either hand the verified
//! vector table to the caller or notify and retry.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::config::BootConfig;
use crate::events::{BootEvent, BootObserver, TracingObserver};
use crate::flash::{FlashControl, FlashEngine, FlashError};
use crate::handoff::VectorTable;
use crate::state::{TransferOutcome, XmodemReceiver};
use crate::transport::{SerialTransport, TransportError};

/// Prompt transmitted before each transfer attempt.
pub const PROMPT_SEND: &[u8] =
    b"\n\rPlease send a new binary file with the Xmodem protocol to update the firmware.\n\r";

/// Notice transmitted after a failed attempt.
pub const PROMPT_RETRY: &[u8] = b"\n\rFailed... Please try again.\n\r";

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("All {attempts} transfer attempts failed (last outcome: {last})")]
    AttemptsExhausted {
        attempts: u32,
        last: TransferOutcome,
    },

    #[error(transparent)]
    Flash(#[from] FlashError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Orchestrates whole-transfer attempts over one transport/flash pair.
pub struct BootSession<T, F, O>
where
    T: SerialTransport,
    F: FlashControl,
    O: BootObserver,
{
    transport: T,
    flash: FlashEngine<F>,
    observer: Arc<O>,
    config: BootConfig,
}

impl<T, F> BootSession<T, F, TracingObserver>
where
    T: SerialTransport,
    F: FlashControl,
{
    /// Create a session with the default tracing observer.
    pub fn new(transport: T, flash: FlashEngine<F>, config: BootConfig) -> Self {
        Self::with_observer(transport, flash, config, Arc::new(TracingObserver))
    }
}

impl<T, F, O> BootSession<T, F, O>
where
    T: SerialTransport,
    F: FlashControl,
    O: BootObserver,
{
    /// Create a session with a custom observer.
    pub fn with_observer(
        transport: T,
        flash: FlashEngine<F>,
        config: BootConfig,
        observer: Arc<O>,
    ) -> Self {
        Self {
            transport,
            flash,
            observer,
            config,
        }
    }

    /// The flash engine, e.g. to inspect a simulated image after `run`.
    pub fn flash(&self) -> &FlashEngine<F> {
        &self.flash
    }

    /// Run transfer attempts until one succeeds or the attempt budget is
    /// spent. On success the transport is deinitialized and the verified
    /// vector table returned; the caller performs the actual handoff.
    #[instrument(skip(self))]
    pub fn run(&mut self) -> Result<VectorTable, SessionError> {
        let mut last = TransferOutcome::Timeout;

        for attempt in 1..=self.config.max_attempts {
            self.observer.on_event(&BootEvent::AttemptStarted {
                attempt,
                mode: self.config.mode,
            });

            self.transport.send_all(PROMPT_SEND)?;
            self.flash.erase(self.flash.app_start())?;

            let receiver_config = self.config.receiver_config();
            let outcome = XmodemReceiver::new(
                &mut self.transport,
                &mut self.flash,
                self.observer.as_ref(),
                receiver_config,
            )
            .receive();

            match outcome {
                TransferOutcome::Success => {
                    let vectors = VectorTable::read_from(&self.flash);
                    self.observer.on_event(&BootEvent::HandoffReady { vectors });
                    info!(attempt, "Firmware update complete");
                    self.transport.deinit()?;
                    return Ok(vectors);
                }
                other => {
                    warn!(attempt, outcome = %other, "Transfer attempt failed");
                    last = other;
                    self.transport.send_all(PROMPT_RETRY)?;
                    self.observer
                        .on_event(&BootEvent::RetryNoticeSent { attempt });
                }
            }
        }

        Err(SessionError::AttemptsExhausted {
            attempts: self.config.max_attempts,
            last,
        })
    }
}
