//! XmBoot-Core: Xmodem firmware bootloader engine in Rust.
//!
//! This crate implements the receiving side of an Xmodem/Xmodem-1K firmware
//! update: packet framing and validation, word-by-word flash programming
//! with readback verification, and the vector-table handoff to the freshly
//! written application.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Wire constants, frame model, checksum/CRC-16 trailers
//! - **Transport**: Serial communication abstraction (serialport, mock)
//! - **Flash**: Controller capabilities, erase/program/verify engine,
//!   simulated controller
//! - **State**: Receiver state machine and per-transfer session
//! - **Events**: Observer pattern for UI decoupling
//! - **Session**: High-level orchestrator with whole-transfer retries
//! - **Handoff**: Vector-table record and the irreversible jump
//!
//! # Example
//!
//! ```no_run
//! use xmboot_core::config::BootConfig;
//! use xmboot_core::flash::{FlashEngine, SimFlash};
//! use xmboot_core::session::BootSession;
//! use xmboot_core::transport::SerialPortTransport;
//!
//! let config = BootConfig::default();
//! let transport = SerialPortTransport::open("/dev/ttyUSB0", config.baud)
//!     .expect("serial port");
//! let flash = FlashEngine::new(SimFlash::new(config.memory_region().unwrap()));
//!
//! let mut session = BootSession::new(transport, flash, config);
//! let vectors = session.run().expect("firmware update failed");
//! println!("image entry at {:#010x}", vectors.reset_vector);
//! ```

pub mod config;
pub mod events;
pub mod flash;
pub mod handoff;
pub mod protocol;
pub mod session;
pub mod state;
pub mod transport;

// Re-exports for convenience
pub use config::BootConfig;
pub use events::{BootEvent, BootObserver, NullObserver, TracingObserver};
pub use flash::{FlashControl, FlashEngine, FlashError, MemoryRegion, SimFlash, WriteStatus};
pub use handoff::{Handoff, VectorTable};
pub use protocol::TransferMode;
pub use session::{BootSession, SessionError};
pub use state::{ProtocolState, ReceiverConfig, TransferOutcome, XmodemReceiver};
pub use transport::{MockSerial, SerialPortTransport, SerialTransport, TransportError};
