//! Transport layer module.

pub mod mock;
pub mod serial;
pub mod traits;

pub use mock::MockSerial;
pub use serial::SerialPortTransport;
pub use traits::{SerialTransport, TransportError};
