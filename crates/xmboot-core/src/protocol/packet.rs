//! Typed view of Xmodem frames.
//!
//! The receiver reads frames byte-by-byte under a deadline, so parsing is
//! split into small pieces: header classification, payload sizing and
//! trailer validation.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::constants::{CAN, CRC_HANDSHAKE, EOT, NAK, SOH, SOH_PAYLOAD_LEN, STX, STX_PAYLOAD_LEN};
use super::crc::{additive_checksum, crc16_xmodem};

/// Data packet flavor, determined solely by the header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    /// 128-byte payload.
    Soh,
    /// 1024-byte payload (Xmodem-1K).
    Stx,
}

impl PacketKind {
    /// Payload length implied by the header byte.
    pub fn payload_len(&self) -> usize {
        match self {
            PacketKind::Soh => SOH_PAYLOAD_LEN,
            PacketKind::Stx => STX_PAYLOAD_LEN,
        }
    }
}

/// Classification of the first byte of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameHeader {
    /// `SOH` or `STX`: a data packet follows.
    Data(PacketKind),
    /// End of transmission.
    Eot,
    /// Sender-side cancel.
    Cancel,
    /// Anything else on the line.
    Unknown(u8),
}

impl FrameHeader {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            SOH => FrameHeader::Data(PacketKind::Soh),
            STX => FrameHeader::Data(PacketKind::Stx),
            EOT => FrameHeader::Eot,
            CAN => FrameHeader::Cancel,
            other => FrameHeader::Unknown(other),
        }
    }
}

/// Negotiated trailer mode for the whole transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    /// CRC-16/XMODEM trailer, requested with `'C'`.
    #[default]
    Crc,
    /// Additive 8-bit checksum trailer, requested with `NAK`.
    Checksum,
}

impl TransferMode {
    /// Byte transmitted while soliciting the first packet.
    pub fn handshake_byte(&self) -> u8 {
        match self {
            TransferMode::Crc => CRC_HANDSHAKE,
            TransferMode::Checksum => NAK,
        }
    }

    /// Trailer length on the wire.
    pub fn trailer_len(&self) -> usize {
        match self {
            TransferMode::Crc => 2,
            TransferMode::Checksum => 1,
        }
    }

    /// Validate a received trailer against the payload.
    ///
    /// The trailer is passed as up to two wire bytes; CRC trailers arrive
    /// big-endian.
    pub fn trailer_matches(&self, payload: &[u8], trailer: &[u8]) -> bool {
        match self {
            TransferMode::Crc => {
                trailer.len() == 2
                    && crc16_xmodem(payload) == u16::from_be_bytes([trailer[0], trailer[1]])
            }
            TransferMode::Checksum => {
                trailer.len() == 1 && additive_checksum(payload) == trailer[0]
            }
        }
    }
}

impl fmt::Display for TransferMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferMode::Crc => write!(f, "crc"),
            TransferMode::Checksum => write!(f, "checksum"),
        }
    }
}

/// Sequence complement carried in byte 3 of a data packet.
pub fn sequence_complement(sequence: u8) -> u8 {
    255 - sequence
}

/// One fully read and trailer-validated data frame.
#[derive(Debug, Clone)]
pub struct Packet {
    pub kind: PacketKind,
    pub sequence: u8,
    pub payload: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::CAN;

    #[test]
    fn header_classification() {
        assert_eq!(
            FrameHeader::from_byte(SOH),
            FrameHeader::Data(PacketKind::Soh)
        );
        assert_eq!(
            FrameHeader::from_byte(STX),
            FrameHeader::Data(PacketKind::Stx)
        );
        assert_eq!(FrameHeader::from_byte(EOT), FrameHeader::Eot);
        assert_eq!(FrameHeader::from_byte(CAN), FrameHeader::Cancel);
        assert_eq!(FrameHeader::from_byte(0x7F), FrameHeader::Unknown(0x7F));
    }

    #[test]
    fn payload_len_by_kind() {
        assert_eq!(PacketKind::Soh.payload_len(), 128);
        assert_eq!(PacketKind::Stx.payload_len(), 1024);
    }

    #[test]
    fn crc_trailer_is_big_endian() {
        let payload = b"123456789";
        // 0x31C3 split across two wire bytes, most significant first.
        assert!(TransferMode::Crc.trailer_matches(payload, &[0x31, 0xC3]));
        assert!(!TransferMode::Crc.trailer_matches(payload, &[0xC3, 0x31]));
    }

    #[test]
    fn checksum_trailer() {
        let payload = [1u8, 2, 3];
        assert!(TransferMode::Checksum.trailer_matches(&payload, &[6]));
        assert!(!TransferMode::Checksum.trailer_matches(&payload, &[7]));
    }

    #[test]
    fn complement_pairs() {
        assert_eq!(sequence_complement(1), 0xFE);
        assert_eq!(sequence_complement(0), 0xFF);
        assert_eq!(sequence_complement(0xFF), 0);
    }
}
