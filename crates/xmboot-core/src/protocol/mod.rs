//! Xmodem protocol layer: wire constants, frame model, trailer arithmetic.

pub mod constants;
pub mod crc;
pub mod packet;

pub use crc::{additive_checksum, crc16_xmodem};
pub use packet::{FrameHeader, Packet, PacketKind, TransferMode, sequence_complement};
