//! Receiver state machine module.

pub mod machine;
pub mod receiver;

pub use machine::{ProtocolState, RejectReason, TransferOutcome, TransferSession};
pub use receiver::{ReceiverConfig, XmodemReceiver};
