//! Xmodem wire constants.
//!
//! Byte values follow the classic Xmodem/Xmodem-1K framing; the CRC
//! handshake byte (`'C'`) selects CRC-16 trailers instead of the additive
//! checksum.

// ============================================================================
// Frame header bytes (sender -> receiver)
// ============================================================================

/// Start of a 128-byte data packet.
pub const SOH: u8 = 0x01;

/// Start of a 1024-byte data packet (Xmodem-1K).
pub const STX: u8 = 0x02;

/// End of transmission.
pub const EOT: u8 = 0x04;

/// Cancel, sent by either side to abort the transfer.
pub const CAN: u8 = 0x18;

// ============================================================================
// Control bytes (receiver -> sender)
// ============================================================================

/// Positive acknowledgement.
pub const ACK: u8 = 0x06;

/// Negative acknowledgement, also the checksum-mode handshake byte.
pub const NAK: u8 = 0x15;

/// CRC-mode handshake byte.
pub const CRC_HANDSHAKE: u8 = 0x43; // 'C'

// ============================================================================
// Framing sizes
// ============================================================================

/// Payload length of an `SOH` packet.
pub const SOH_PAYLOAD_LEN: usize = 128;

/// Payload length of an `STX` packet.
pub const STX_PAYLOAD_LEN: usize = 1024;

/// First data packet carries this sequence number; it wraps modulo 256.
pub const FIRST_SEQUENCE: u8 = 1;

/// Number of `CAN` bytes sent when the receiver aborts a transfer.
pub const CAN_ABORT_COUNT: usize = 2;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_bytes_are_distinct_from_headers() {
        // A handshake byte echoed back by a confused sender must never parse
        // as a valid frame header.
        for b in [ACK, NAK, CRC_HANDSHAKE] {
            assert!(![SOH, STX, EOT, CAN].contains(&b));
        }
    }
}
