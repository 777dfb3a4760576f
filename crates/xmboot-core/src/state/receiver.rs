//! Xmodem receiver: packet framing, sequence tracking, trailer validation,
//! retry/cancel policy, streaming validated payloads into the flash engine.
//!
//! Acknowledgement ordering is the one hard rule here: a payload is durably
//! written to flash before its ACK goes out, so a crash between the two can
//! never silently truncate the image.

use std::time::Duration;

use crate::events::{BootEvent, BootObserver};
use crate::flash::{FlashControl, FlashEngine};
use crate::protocol::constants::{ACK, CAN, CAN_ABORT_COUNT, NAK};
use crate::protocol::{FrameHeader, Packet, PacketKind, TransferMode, sequence_complement};
use crate::transport::{SerialTransport, TransportError};

use super::machine::{ProtocolState, RejectReason, TransferOutcome, TransferSession};

/// Tunable bounds of the receiver.
#[derive(Debug, Clone, Copy)]
pub struct ReceiverConfig {
    pub mode: TransferMode,
    /// Deadline for every single received byte, handshake included.
    pub byte_timeout: Duration,
    /// Start-of-transfer control bytes sent before giving up.
    pub handshake_retries: u32,
    /// Consecutive rejected frames tolerated before cancelling.
    pub packet_retries: u32,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            mode: TransferMode::default(),
            byte_timeout: Duration::from_secs(1),
            handshake_retries: 16,
            packet_retries: 10,
        }
    }
}

/// How one received frame was classified.
enum FrameDisposition {
    Accepted(Packet),
    Duplicate { sequence: u8 },
    Rejected(RejectReason),
}

/// Drives one Xmodem transfer over a serial transport into a flash engine.
///
/// The receiver exclusively owns the transport handle and the session state
/// for the duration of the transfer.
pub struct XmodemReceiver<'a, T, F, O>
where
    T: SerialTransport,
    F: FlashControl,
    O: BootObserver,
{
    transport: &'a mut T,
    flash: &'a mut FlashEngine<F>,
    observer: &'a O,
    cfg: ReceiverConfig,
    session: TransferSession,
}

impl<'a, T, F, O> XmodemReceiver<'a, T, F, O>
where
    T: SerialTransport,
    F: FlashControl,
    O: BootObserver,
{
    pub fn new(
        transport: &'a mut T,
        flash: &'a mut FlashEngine<F>,
        observer: &'a O,
        cfg: ReceiverConfig,
    ) -> Self {
        let session = TransferSession::new(flash.app_start());
        Self {
            transport,
            flash,
            observer,
            cfg,
            session,
        }
    }

    /// Payload bytes durably written by this transfer so far.
    pub fn bytes_written(&self) -> u32 {
        self.session.bytes_written()
    }

    /// Run one complete transfer.
    pub fn receive(&mut self) -> TransferOutcome {
        self.session.reset(self.flash.app_start());
        let outcome = match self.solicit() {
            Ok(first_header) => self.run(first_header),
            Err(outcome) => outcome,
        };
        self.observer.on_event(&BootEvent::TransferFinished {
            outcome,
            bytes_written: self.session.bytes_written(),
        });
        outcome
    }

    /// Send the start-of-transfer control byte until the sender answers.
    fn solicit(&mut self) -> Result<u8, TransferOutcome> {
        let handshake = self.cfg.mode.handshake_byte();
        for attempt in 1..=self.cfg.handshake_retries {
            if self.transport.send(handshake).is_err() {
                return Err(self.fail(TransferOutcome::Aborted));
            }
            self.observer.on_event(&BootEvent::HandshakeSent { attempt });
            match self.transport.recv_byte(self.cfg.byte_timeout) {
                Ok(byte) => return Ok(byte),
                Err(TransportError::Timeout { .. }) => continue,
                Err(_) => return Err(self.fail(TransferOutcome::Aborted)),
            }
        }
        Err(self.fail(TransferOutcome::Timeout))
    }

    fn run(&mut self, mut header_byte: u8) -> TransferOutcome {
        loop {
            match FrameHeader::from_byte(header_byte) {
                FrameHeader::Cancel => {
                    // Sender-initiated abort: no further acknowledgement.
                    return self.fail(TransferOutcome::Aborted);
                }
                FrameHeader::Eot => {
                    if self.session.state() == ProtocolState::Receiving {
                        let _ = self.transport.send(ACK);
                        self.session.goto_state(ProtocolState::Done);
                        return TransferOutcome::Success;
                    }
                    // EOT with no preceding data is invalid.
                    if let Some(outcome) = self.reject(RejectReason::UnexpectedEot) {
                        return outcome;
                    }
                }
                FrameHeader::Data(kind) => match self.read_packet(kind) {
                    FrameDisposition::Accepted(packet) => {
                        let address = self.session.write_cursor();
                        let status = self.flash.write(address, &packet.payload);
                        if !status.is_ok() {
                            // Accepting further packets after a write failure
                            // would build a known-corrupt image.
                            self.observer.on_event(&BootEvent::FlashDegraded { status });
                            self.cancel_transfer();
                            return self.fail(TransferOutcome::Aborted);
                        }
                        self.session.accept(packet.payload.len() as u32);
                        self.observer.on_event(&BootEvent::PacketAccepted {
                            sequence: packet.sequence,
                            length: packet.payload.len(),
                            address,
                        });
                        // Written and verified; only now acknowledge.
                        if self.transport.send(ACK).is_err() {
                            return self.fail(TransferOutcome::Aborted);
                        }
                    }
                    FrameDisposition::Duplicate { sequence } => {
                        // Already flushed to flash; the sender just lost our
                        // ACK. Re-acknowledge, discard the payload.
                        self.observer
                            .on_event(&BootEvent::DuplicateAcknowledged { sequence });
                        if self.transport.send(ACK).is_err() {
                            return self.fail(TransferOutcome::Aborted);
                        }
                    }
                    FrameDisposition::Rejected(reason) => {
                        if let Some(outcome) = self.reject(reason) {
                            return outcome;
                        }
                    }
                },
                FrameHeader::Unknown(byte) => {
                    if let Some(outcome) = self.reject(RejectReason::UnknownHeader(byte)) {
                        return outcome;
                    }
                }
            }

            header_byte = match self.next_header() {
                Ok(byte) => byte,
                Err(outcome) => return outcome,
            };
        }
    }

    /// Wait for the next frame header, NAKing timeouts until the retry
    /// budget runs out.
    fn next_header(&mut self) -> Result<u8, TransferOutcome> {
        loop {
            match self.transport.recv_byte(self.cfg.byte_timeout) {
                Ok(byte) => return Ok(byte),
                Err(TransportError::Timeout { .. }) => {
                    if let Some(outcome) = self.reject(RejectReason::Timeout) {
                        return Err(outcome);
                    }
                }
                Err(_) => return Err(self.fail(TransferOutcome::Aborted)),
            }
        }
    }

    /// Read sequence, complement, payload and trailer of a data packet and
    /// classify the frame.
    fn read_packet(&mut self, kind: PacketKind) -> FrameDisposition {
        let Ok(sequence) = self.recv() else {
            return FrameDisposition::Rejected(RejectReason::Timeout);
        };
        let Ok(complement) = self.recv() else {
            return FrameDisposition::Rejected(RejectReason::Timeout);
        };

        let mut payload = vec![0u8; kind.payload_len()];
        for slot in payload.iter_mut() {
            match self.recv() {
                Ok(byte) => *slot = byte,
                Err(_) => return FrameDisposition::Rejected(RejectReason::Timeout),
            }
        }

        let mut trailer = [0u8; 2];
        let trailer_len = self.cfg.mode.trailer_len();
        for slot in trailer.iter_mut().take(trailer_len) {
            match self.recv() {
                Ok(byte) => *slot = byte,
                Err(_) => return FrameDisposition::Rejected(RejectReason::Timeout),
            }
        }

        if !self.cfg.mode.trailer_matches(&payload, &trailer[..trailer_len]) {
            return FrameDisposition::Rejected(RejectReason::BadChecksum);
        }
        if complement != sequence_complement(sequence) {
            return FrameDisposition::Rejected(RejectReason::BadComplement);
        }
        if self.session.is_duplicate(sequence) {
            return FrameDisposition::Duplicate { sequence };
        }
        if sequence != self.session.expected_sequence() {
            return FrameDisposition::Rejected(RejectReason::BadSequence);
        }
        FrameDisposition::Accepted(Packet {
            kind,
            sequence,
            payload,
        })
    }

    fn recv(&mut self) -> Result<u8, TransportError> {
        self.transport.recv_byte(self.cfg.byte_timeout)
    }

    /// NAK a bad frame; once the consecutive-failure budget is exhausted,
    /// cancel the transfer.
    fn reject(&mut self, reason: RejectReason) -> Option<TransferOutcome> {
        let _ = self.transport.send(NAK);
        self.session.bump_retry();
        self.observer.on_event(&BootEvent::FrameRejected {
            reason,
            retries: self.session.retry_count(),
        });
        if self.session.retry_count() > self.cfg.packet_retries {
            self.cancel_transfer();
            return Some(self.fail(TransferOutcome::Timeout));
        }
        None
    }

    fn cancel_transfer(&mut self) {
        for _ in 0..CAN_ABORT_COUNT {
            let _ = self.transport.send(CAN);
        }
    }

    fn fail(&mut self, outcome: TransferOutcome) -> TransferOutcome {
        self.session.goto_state(ProtocolState::Failed);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::recording::RecordingObserver;
    use crate::flash::{FlashEngine, MemoryRegion, SimFlash};
    use crate::protocol::constants::{CRC_HANDSHAKE, EOT, SOH, STX};
    use crate::protocol::{additive_checksum, crc16_xmodem};
    use crate::transport::MockSerial;

    const APP_START: u32 = 0x0800_1000;
    const FLASH_END: u32 = 0x0800_3000;
    const PAGE: u32 = 0x800;

    fn engine() -> FlashEngine<SimFlash> {
        let region = MemoryRegion::new(APP_START, FLASH_END, PAGE).unwrap();
        let mut engine = FlashEngine::new(SimFlash::new(region));
        engine.erase(APP_START).unwrap();
        engine
    }

    fn cfg(mode: TransferMode) -> ReceiverConfig {
        ReceiverConfig {
            mode,
            byte_timeout: Duration::from_millis(10),
            handshake_retries: 3,
            packet_retries: 4,
        }
    }

    /// Frame one data packet the way a sender would.
    fn frame(mode: TransferMode, sequence: u8, payload: &[u8]) -> Vec<u8> {
        let header = match payload.len() {
            128 => SOH,
            1024 => STX,
            other => panic!("bad payload length {other}"),
        };
        let mut out = vec![header, sequence, 255 - sequence];
        out.extend_from_slice(payload);
        match mode {
            TransferMode::Crc => out.extend_from_slice(&crc16_xmodem(payload).to_be_bytes()),
            TransferMode::Checksum => out.push(additive_checksum(payload)),
        }
        out
    }

    fn receive(
        mock: &mut MockSerial,
        engine: &mut FlashEngine<SimFlash>,
        mode: TransferMode,
    ) -> (TransferOutcome, u32, Vec<BootEvent>) {
        let observer = RecordingObserver::default();
        let mut receiver = XmodemReceiver::new(mock, engine, &observer, cfg(mode));
        let outcome = receiver.receive();
        let written = receiver.bytes_written();
        (outcome, written, observer.events.into_inner())
    }

    #[test]
    fn single_packet_transfer_succeeds() {
        // Scenario A: one SOH packet (sequence 1), then EOT.
        let payload = [0x5Au8; 128];
        let mut mock = MockSerial::new();
        mock.feed(&frame(TransferMode::Crc, 1, &payload));
        mock.feed(&[EOT]);

        let mut engine = engine();
        let (outcome, written, _) = receive(&mut mock, &mut engine, TransferMode::Crc);

        assert_eq!(outcome, TransferOutcome::Success);
        assert_eq!(written, 128);
        // Handshake, then one ACK for the packet and one for EOT.
        assert_eq!(mock.sent(), &[CRC_HANDSHAKE, ACK, ACK]);
        assert_eq!(mock.remaining(), 0);
        assert_eq!(engine.read_word(APP_START), 0x5A5A_5A5A);
        assert_eq!(engine.read_word(APP_START + 124), 0x5A5A_5A5A);
    }

    #[test]
    fn mid_transfer_silence_exhausts_the_retry_budget() {
        let payload = [0x64u8; 128];
        let mut mock = MockSerial::new();
        mock.feed(&frame(TransferMode::Crc, 1, &payload));
        // The sender goes quiet; each expired deadline costs one retry.
        mock.feed_timeouts(8);

        let mut engine = engine();
        let (outcome, written, _) = receive(&mut mock, &mut engine, TransferMode::Crc);

        // The packet that did arrive stays written.
        assert_eq!(outcome, TransferOutcome::Timeout);
        assert_eq!(written, 128);
        let sent = mock.sent();
        assert_eq!(&sent[sent.len() - 2..], &[CAN, CAN]);
    }

    #[test]
    fn checksum_mode_uses_nak_handshake() {
        let payload = [0x11u8; 128];
        let mut mock = MockSerial::new();
        mock.feed(&frame(TransferMode::Checksum, 1, &payload));
        mock.feed(&[EOT]);

        let mut engine = engine();
        let (outcome, _, _) = receive(&mut mock, &mut engine, TransferMode::Checksum);

        assert_eq!(outcome, TransferOutcome::Success);
        assert_eq!(mock.sent(), &[NAK, ACK, ACK]);
    }

    #[test]
    fn stx_packets_carry_1k_payloads() {
        let payload: Vec<u8> = (0..1024).map(|i| (i % 251) as u8).collect();
        let mut mock = MockSerial::new();
        mock.feed(&frame(TransferMode::Crc, 1, &payload));
        mock.feed(&[EOT]);

        let mut engine = engine();
        let (outcome, written, _) = receive(&mut mock, &mut engine, TransferMode::Crc);

        assert_eq!(outcome, TransferOutcome::Success);
        assert_eq!(written, 1024);
        let expected = u32::from_le_bytes([0, 1, 2, 3]);
        assert_eq!(engine.read_word(APP_START), expected);
    }

    #[test]
    fn out_of_order_sequence_is_nakked_without_write() {
        // Scenario B: sequence 2 arrives while 1 is expected.
        let payload = [0x33u8; 128];
        let mut mock = MockSerial::new();
        mock.feed(&frame(TransferMode::Crc, 2, &payload));

        let mut engine = engine();
        let (outcome, written, events) = receive(&mut mock, &mut engine, TransferMode::Crc);

        // The wrong packet was NAKed...
        assert!(mock.sent().contains(&NAK));
        assert!(events.iter().any(|e| matches!(
            e,
            BootEvent::FrameRejected {
                reason: RejectReason::BadSequence,
                ..
            }
        )));
        // ...nothing was written, and the silent line eventually times out.
        assert_eq!(written, 0);
        assert_eq!(outcome, TransferOutcome::Timeout);
        assert!(engine.controller().program_log().is_empty());
    }

    #[test]
    fn cancel_after_handshake_aborts_silently() {
        // Scenario C: CAN right after the handshake.
        let mut mock = MockSerial::new();
        mock.feed(&[CAN]);

        let mut engine = engine();
        let (outcome, written, _) = receive(&mut mock, &mut engine, TransferMode::Crc);

        assert_eq!(outcome, TransferOutcome::Aborted);
        assert_eq!(written, 0);
        // Only the handshake byte went out; no ACK, NAK or CAN followed.
        assert_eq!(mock.sent(), &[CRC_HANDSHAKE]);
        assert!(engine.controller().program_log().is_empty());
    }

    #[test]
    fn duplicate_retransmit_is_reacked_without_second_write() {
        let payload = [0xA5u8; 128];
        let next = [0xC3u8; 128];
        let mut mock = MockSerial::new();
        mock.feed(&frame(TransferMode::Crc, 1, &payload));
        // ACK got lost: the sender retransmits packet 1.
        mock.feed(&frame(TransferMode::Crc, 1, &payload));
        mock.feed(&frame(TransferMode::Crc, 2, &next));
        mock.feed(&[EOT]);

        let mut engine = engine();
        let (outcome, written, events) = receive(&mut mock, &mut engine, TransferMode::Crc);

        assert_eq!(outcome, TransferOutcome::Success);
        assert_eq!(written, 256);
        assert!(events
            .iter()
            .any(|e| matches!(e, BootEvent::DuplicateAcknowledged { sequence: 1 })));
        // Each flash word was programmed exactly once: 32 words per packet.
        assert_eq!(engine.controller().program_log().len(), 64);
        // Packet 2 landed directly after packet 1, not after a duplicate.
        assert_eq!(engine.read_word(APP_START + 128), 0xC3C3_C3C3);
    }

    #[test]
    fn writes_are_monotonic_and_gap_free_across_retries() {
        let first = [0x01u8; 128];
        let second = [0x02u8; 128];
        let mut corrupted = frame(TransferMode::Crc, 2, &second);
        corrupted[5] ^= 0x40; // payload bit flip

        let mut mock = MockSerial::new();
        mock.feed(&frame(TransferMode::Crc, 1, &first));
        mock.feed(&corrupted);
        mock.feed(&frame(TransferMode::Crc, 2, &second));
        mock.feed(&[EOT]);

        let mut engine = engine();
        let (outcome, written, _) = receive(&mut mock, &mut engine, TransferMode::Crc);

        assert_eq!(outcome, TransferOutcome::Success);
        assert_eq!(written, 256);
        let log = engine.controller().program_log();
        assert_eq!(log.len(), 64);
        for (i, &addr) in log.iter().enumerate() {
            assert_eq!(addr, APP_START + 4 * i as u32);
        }
    }

    #[test]
    fn corrupted_trailer_is_rejected_in_both_modes() {
        for mode in [TransferMode::Crc, TransferMode::Checksum] {
            let payload = [0x7Eu8; 128];
            let mut bad = frame(mode, 1, &payload);
            let last = bad.len() - 1;
            bad[last] ^= 0x01; // trailer bit flip

            let mut mock = MockSerial::new();
            mock.feed(&bad);

            let mut engine = engine();
            let (_, written, events) = receive(&mut mock, &mut engine, mode);

            assert_eq!(written, 0);
            assert!(events.iter().any(|e| matches!(
                e,
                BootEvent::FrameRejected {
                    reason: RejectReason::BadChecksum,
                    ..
                }
            )));
        }
    }

    #[test]
    fn bad_complement_is_rejected() {
        let payload = [0x42u8; 128];
        let mut bad = frame(TransferMode::Crc, 1, &payload);
        bad[2] = 0x00; // complement of 1 is 0xFE

        let mut mock = MockSerial::new();
        mock.feed(&bad);

        let mut engine = engine();
        let (_, written, events) = receive(&mut mock, &mut engine, TransferMode::Crc);

        assert_eq!(written, 0);
        assert!(events.iter().any(|e| matches!(
            e,
            BootEvent::FrameRejected {
                reason: RejectReason::BadComplement,
                ..
            }
        )));
    }

    #[test]
    fn retry_budget_exhaustion_cancels_with_double_can() {
        let payload = [0x10u8; 128];
        let mut bad = frame(TransferMode::Crc, 1, &payload);
        bad[10] ^= 0x01;

        let mut mock = MockSerial::new();
        // More bad frames than the budget of 4 allows.
        for _ in 0..6 {
            mock.feed(&bad);
        }

        let mut engine = engine();
        let (outcome, written, _) = receive(&mut mock, &mut engine, TransferMode::Crc);

        assert_eq!(outcome, TransferOutcome::Timeout);
        assert_eq!(written, 0);
        let sent = mock.sent();
        assert_eq!(&sent[sent.len() - 2..], &[CAN, CAN]);
    }

    #[test]
    fn handshake_exhaustion_times_out() {
        let mut mock = MockSerial::new();
        // Nothing ever arrives.
        let mut engine = engine();
        let (outcome, written, _) = receive(&mut mock, &mut engine, TransferMode::Crc);

        assert_eq!(outcome, TransferOutcome::Timeout);
        assert_eq!(written, 0);
        // One handshake byte per configured retry, nothing else.
        assert_eq!(mock.sent(), &[CRC_HANDSHAKE; 3]);
    }

    #[test]
    fn eot_before_any_data_is_rejected() {
        let payload = [0x99u8; 128];
        let mut mock = MockSerial::new();
        mock.feed(&[EOT]);
        mock.feed(&frame(TransferMode::Crc, 1, &payload));
        mock.feed(&[EOT]);

        let mut engine = engine();
        let (outcome, written, events) = receive(&mut mock, &mut engine, TransferMode::Crc);

        // Premature EOT was NAKed, then the real transfer went through.
        assert_eq!(outcome, TransferOutcome::Success);
        assert_eq!(written, 128);
        assert!(events.iter().any(|e| matches!(
            e,
            BootEvent::FrameRejected {
                reason: RejectReason::UnexpectedEot,
                ..
            }
        )));
    }

    #[test]
    fn flash_failure_aborts_with_double_can() {
        let region = MemoryRegion::new(APP_START, FLASH_END, PAGE).unwrap();
        let mut sim = SimFlash::new(region);
        sim.fail_program_at(APP_START + 8);
        let mut engine = FlashEngine::new(sim);
        engine.erase(APP_START).unwrap();

        let payload = [0x77u8; 128];
        let mut mock = MockSerial::new();
        mock.feed(&frame(TransferMode::Crc, 1, &payload));

        let (outcome, _, events) = receive(&mut mock, &mut engine, TransferMode::Crc);

        assert_eq!(outcome, TransferOutcome::Aborted);
        assert!(events
            .iter()
            .any(|e| matches!(e, BootEvent::FlashDegraded { .. })));
        let sent = mock.sent();
        // No ACK for the poisoned packet, just the cancel pair.
        assert!(!sent.contains(&ACK));
        assert_eq!(&sent[sent.len() - 2..], &[CAN, CAN]);
    }

    #[test]
    fn ack_is_sent_only_after_the_flash_write() {
        // The program log must already hold the packet's words by the time
        // the first ACK appears on the wire.
        let payload = [0xEEu8; 128];
        let mut mock = MockSerial::new();
        mock.feed(&frame(TransferMode::Crc, 1, &payload));
        mock.feed(&[EOT]);

        let mut engine = engine();
        let (outcome, _, _) = receive(&mut mock, &mut engine, TransferMode::Crc);

        assert_eq!(outcome, TransferOutcome::Success);
        assert_eq!(engine.controller().program_log().len(), 32);
        assert_eq!(engine.read_word(APP_START), 0xEEEE_EEEE);
    }

    #[test]
    fn sequence_wraps_through_zero_on_long_transfers() {
        // 256 packets: sequences 1..=255 then 0.
        let mut mock = MockSerial::new();
        let payload = [0xABu8; 128];
        let mut seq: u8 = 1;
        for _ in 0..256 {
            mock.feed(&frame(TransferMode::Crc, seq, &payload));
            seq = seq.wrapping_add(1);
        }
        mock.feed(&[EOT]);

        // 256 * 128 = 32 KiB image region.
        let region = MemoryRegion::new(0x0800_0000, 0x0800_8000, 0x800).unwrap();
        let mut engine = FlashEngine::new(SimFlash::new(region));
        engine.erase(0x0800_0000).unwrap();

        let (outcome, written, _) = receive(&mut mock, &mut engine, TransferMode::Crc);
        assert_eq!(outcome, TransferOutcome::Success);
        assert_eq!(written, 256 * 128);
    }
}
