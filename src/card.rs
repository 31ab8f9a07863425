//! Storage-device protocol engine for SD-class devices in SPI mode.
//!
//! This module provides [`CardDriver`], which brings the device from
//! power-on to a readable state and then services single-block read
//! requests, using the byte-transfer engine
//! ([`ByteTransfer`](crate::spi::ByteTransfer)) as its only I/O path.
//!
//! ## Handshake
//!
//! After a quiet period with chip-select released, the driver walks the
//! fixed initialization sequence: software reset, interface-condition
//! query (with its four-byte trailing payload), then app-command prefix
//! plus initialization operation, repeated while the device reports busy.
//! Each command is six bytes: index, four argument bytes, checksum. The
//! exact bytes are listed in [`crate::consts`].
//!
//! Response polling keeps the clock running with all-ones filler bytes;
//! the first non-filler byte received is the response. Unexpected response
//! codes branch back to an earlier handshake step, as older or
//! still-initializing devices require.
//!
//! ## Reads
//!
//! From the ready state a read request sends the single-block read
//! command, waits for the acknowledgment and the start-of-block token,
//! then forwards exactly 512 payload bytes one per tick, followed by two
//! CRC bytes which are consumed and, unless strict mode is enabled,
//! ignored.
//!
//! ## Bounded waits
//!
//! Every polling wait and retry loop is bounded by [`CardConfig`];
//! exhausting a bound moves the driver to a terminal faulted state
//! carrying a [`CardError`] instead of spinning forever against an
//! unresponsive device.

use crate::consts::{
    CMD_APP_PREFIX, CMD_DUMMY_CRC, CMD_IF_COND, CMD_IF_COND_CRC, CMD_INIT_OP, CMD_LEN,
    CMD_READ_BLOCK, CMD_RESET, CMD_RESET_CRC, DATA_TOKEN, FILLER, IF_COND_ARG, IF_COND_ECHO,
    IF_COND_PAYLOAD_LEN, IF_COND_VOLTAGE_OK, INIT_OP_ARG, R1_IDLE, R1_READY, SECTOR_CRC_LEN,
    SECTOR_LEN,
};
use crate::crc::crc16_xmodem_update;
use crate::decoder::SectorSource;
use crate::spi::ByteTransfer;
use thiserror::Error;

/// Protocol faults. The original always-retry behavior is preserved up to
/// the configured budgets; past them the driver parks in a faulted state
/// and reports why.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CardError {
    /// The device stopped answering within the configured polling budget.
    #[error("device stopped responding")]
    Stalled,
    /// The handshake kept branching back past the configured retry budget.
    #[error("initialization retries exhausted")]
    RetriesExhausted,
    /// A sector payload failed its CRC check (strict mode only).
    #[error("sector payload failed CRC check")]
    Crc,
}

/// Tunable limits for the protocol engine.
#[derive(Debug, Clone, Copy)]
pub struct CardConfig {
    /// Ticks to hold chip-select inactive after power-up, before the first
    /// command. Devices need a minimum idle period here.
    pub powerup_ticks: u16,
    /// Filler bytes to clock while waiting for a command response before
    /// declaring a stall.
    pub max_response_polls: u16,
    /// Filler bytes to clock while waiting for the start-of-block token.
    /// Cards can take a long time to fetch a sector, so this is much
    /// larger than the response budget.
    pub max_token_polls: u16,
    /// Handshake fallbacks tolerated before giving up.
    pub max_retries: u8,
    /// Busy rounds of the initialization operation tolerated before giving
    /// up.
    pub max_init_rounds: u16,
    /// Verify the 16-bit CRC trailing each sector payload. Off by default:
    /// payload integrity is trusted, matching permissive-mode deployments.
    pub validate_crc: bool,
}

impl Default for CardConfig {
    fn default() -> Self {
        Self {
            powerup_ticks: 256,
            max_response_polls: 64,
            max_token_polls: 10_000,
            max_retries: 8,
            max_init_rounds: 1024,
            validate_crc: false,
        }
    }
}

/// Protocol-engine state.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
pub enum CardState {
    /// Holding chip-select inactive for the post-power-on quiet period.
    #[default]
    PowerUpWait,
    /// Sending the software-reset command.
    SendReset,
    /// Polling for the reset acknowledgment.
    AwaitResetAck,
    /// Sending the interface-condition query.
    SendIfCond,
    /// Polling for the interface-condition acknowledgment.
    AwaitIfCondAck,
    /// Collecting the four payload bytes that trail the
    /// interface-condition acknowledgment.
    ReadIfCondPayload,
    /// Sending the app-command prefix.
    SendAppPrefix,
    /// Polling for the app-command prefix acknowledgment.
    AwaitAppPrefixAck,
    /// Sending the initialization operation.
    SendInitOp,
    /// Polling for the initialization-operation acknowledgment.
    AwaitInitOpAck,
    /// Initialized and idle. Block-read requests are accepted here.
    Ready,
    /// Sending the single-block read command.
    SendReadCmd,
    /// Polling for the read acknowledgment.
    AwaitReadAck,
    /// Polling for the start-of-block token.
    AwaitDataToken,
    /// Forwarding the 512 payload bytes of the current sector.
    StreamData,
    /// Consuming the CRC bytes that trail the payload.
    StreamCrc,
    /// Unrecoverable fault; see [`CardDriver::fault`].
    Faulted,
}

/// Driver state machine for the storage device.
///
/// Advance it once per tick with [`tick()`](CardDriver::tick), passing the
/// byte-transfer engine it owns the link through. The driver observes link
/// bytes completed on the previous tick, so composing it with the shifter
/// in a fixed per-tick order preserves the one-tick handshake latency the
/// protocol timing expects.
#[derive(Debug)]
pub struct CardDriver {
    state: CardState,
    config: CardConfig,
    initialized: bool,
    sector: u32,
    frame: [u8; CMD_LEN],
    frame_sent: u8,
    wait_ticks: u16,
    polls: u16,
    retries: u8,
    init_rounds: u16,
    payload: [u8; IF_COND_PAYLOAD_LEN as usize],
    payload_got: u8,
    stream_count: u16,
    crc_got: u8,
    crc_hi: u8,
    running_crc: u16,
    stream_byte: Option<u8>,
    fault: Option<CardError>,
}

impl CardDriver {
    /// Creates a driver in the power-up wait state.
    pub fn new(config: CardConfig) -> Self {
        Self {
            state: CardState::PowerUpWait,
            config,
            initialized: false,
            sector: 0,
            frame: [0; CMD_LEN],
            frame_sent: 0,
            wait_ticks: 0,
            polls: 0,
            retries: 0,
            init_rounds: 0,
            payload: [0; IF_COND_PAYLOAD_LEN as usize],
            payload_got: 0,
            stream_count: 0,
            crc_got: 0,
            crc_hi: 0,
            running_crc: 0,
            stream_byte: None,
            fault: None,
        }
    }

    /// Current engine state, for diagnostics.
    pub fn state(&self) -> CardState {
        self.state
    }

    /// Whether the initialization handshake has completed.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Whether a read request would be accepted this tick.
    pub fn is_ready(&self) -> bool {
        self.state == CardState::Ready
    }

    /// Whether a block read is currently in flight.
    pub fn is_streaming(&self) -> bool {
        matches!(
            self.state,
            CardState::SendReadCmd
                | CardState::AwaitReadAck
                | CardState::AwaitDataToken
                | CardState::StreamData
                | CardState::StreamCrc
        )
    }

    /// The fault that parked the driver, if any.
    pub fn fault(&self) -> Option<CardError> {
        self.fault
    }

    /// Ask for one sector. Accepted only in the ready state; at most one
    /// request is outstanding at a time.
    pub fn request_read(&mut self, sector: u32) -> bool {
        if self.state != CardState::Ready {
            return false;
        }
        self.sector = sector;
        self.arm(CardState::SendReadCmd);
        true
    }

    /// Advance the protocol engine by one tick.
    pub fn tick<L: ByteTransfer>(&mut self, link: &mut L) {
        self.stream_byte = None;
        match self.state {
            CardState::PowerUpWait => {
                self.wait_ticks += 1;
                if self.wait_ticks >= self.config.powerup_ticks {
                    self.retries = 0;
                    self.init_rounds = 0;
                    self.arm(CardState::SendReset);
                }
            }
            CardState::SendReset => self.push_frame(link, CardState::AwaitResetAck),
            CardState::AwaitResetAck => {
                if let Some(code) = self.poll_response(link) {
                    if code == R1_IDLE {
                        self.arm(CardState::SendIfCond);
                    } else {
                        self.fall_back(CardState::SendReset);
                    }
                }
            }
            CardState::SendIfCond => self.push_frame(link, CardState::AwaitIfCondAck),
            CardState::AwaitIfCondAck => {
                if let Some(code) = self.poll_response(link) {
                    if code == R1_IDLE {
                        self.payload_got = 0;
                        self.state = CardState::ReadIfCondPayload;
                    } else {
                        // a device generation that predates the query
                        // sends no payload; start the handshake over
                        self.fall_back(CardState::SendReset);
                    }
                }
            }
            CardState::ReadIfCondPayload => {
                if let Some(byte) = link.take_received() {
                    self.payload[self.payload_got as usize] = byte;
                    self.payload_got += 1;
                    if self.payload_got >= IF_COND_PAYLOAD_LEN {
                        if self.payload[2] == IF_COND_VOLTAGE_OK
                            && self.payload[3] == IF_COND_ECHO
                        {
                            self.arm(CardState::SendAppPrefix);
                        } else {
                            self.fall_back(CardState::SendReset);
                        }
                    }
                }
                if self.state == CardState::ReadIfCondPayload && link.ready() {
                    link.send(FILLER);
                }
            }
            CardState::SendAppPrefix => self.push_frame(link, CardState::AwaitAppPrefixAck),
            CardState::AwaitAppPrefixAck => {
                if let Some(code) = self.poll_response(link) {
                    if code == R1_IDLE {
                        self.arm(CardState::SendInitOp);
                    } else {
                        self.fall_back(CardState::SendAppPrefix);
                    }
                }
            }
            CardState::SendInitOp => self.push_frame(link, CardState::AwaitInitOpAck),
            CardState::AwaitInitOpAck => {
                if let Some(code) = self.poll_response(link) {
                    match code {
                        R1_READY => {
                            self.initialized = true;
                            self.retries = 0;
                            link.set_fast_mode();
                            self.state = CardState::Ready;
                            #[cfg(feature = "log")]
                            log::debug!("storage device initialized");
                        }
                        R1_IDLE => {
                            // still busy initializing; repeat the
                            // prefix + init-operation pair
                            self.init_rounds += 1;
                            if self.init_rounds >= self.config.max_init_rounds {
                                self.fail(CardError::Stalled);
                            } else {
                                self.arm(CardState::SendAppPrefix);
                            }
                        }
                        _ => self.fall_back(CardState::SendReset),
                    }
                }
            }
            CardState::Ready => {
                let _ = link.take_received();
            }
            CardState::SendReadCmd => self.push_frame(link, CardState::AwaitReadAck),
            CardState::AwaitReadAck => {
                if let Some(code) = self.poll_response(link) {
                    if code == R1_READY {
                        self.polls = 0;
                        self.state = CardState::AwaitDataToken;
                    } else {
                        // rejected; the requester decides whether to ask
                        // again
                        self.state = CardState::Ready;
                    }
                }
            }
            CardState::AwaitDataToken => {
                if let Some(byte) = link.take_received() {
                    if byte == DATA_TOKEN {
                        self.stream_count = 0;
                        self.running_crc = 0;
                        self.state = CardState::StreamData;
                    }
                }
                if self.state == CardState::AwaitDataToken && link.ready() {
                    if self.polls >= self.config.max_token_polls {
                        self.fail(CardError::Stalled);
                    } else {
                        link.send(FILLER);
                        self.polls += 1;
                    }
                }
            }
            CardState::StreamData => {
                if let Some(byte) = link.take_received() {
                    self.running_crc = crc16_xmodem_update(self.running_crc, byte);
                    self.stream_byte = Some(byte);
                    self.stream_count += 1;
                    if self.stream_count >= SECTOR_LEN {
                        self.crc_got = 0;
                        self.state = CardState::StreamCrc;
                    }
                }
                if self.state == CardState::StreamData && link.ready() {
                    link.send(FILLER);
                }
            }
            CardState::StreamCrc => {
                if let Some(byte) = link.take_received() {
                    self.crc_got += 1;
                    if self.crc_got == 1 {
                        self.crc_hi = byte;
                    } else if self.crc_got >= SECTOR_CRC_LEN {
                        let trailer = ((self.crc_hi as u16) << 8) | byte as u16;
                        if self.config.validate_crc && trailer != self.running_crc {
                            self.fail(CardError::Crc);
                        } else {
                            self.state = CardState::Ready;
                        }
                    }
                }
                if self.state == CardState::StreamCrc && link.ready() {
                    link.send(FILLER);
                }
            }
            CardState::Faulted => {
                let _ = link.take_received();
            }
        }
        // hold chip-select across the polling gaps of a command burst
        link.force_select(!matches!(
            self.state,
            CardState::PowerUpWait | CardState::Ready | CardState::Faulted
        ));
    }

    // Load the six-byte frame for `target` and enter it. Send states own
    // the frame; await states own the poll counter.
    fn arm(&mut self, target: CardState) {
        let (cmd, arg, crc) = match target {
            CardState::SendReset => (CMD_RESET, 0, CMD_RESET_CRC),
            CardState::SendIfCond => (CMD_IF_COND, IF_COND_ARG, CMD_IF_COND_CRC),
            CardState::SendAppPrefix => (CMD_APP_PREFIX, 0, CMD_DUMMY_CRC),
            CardState::SendInitOp => (CMD_INIT_OP, INIT_OP_ARG, CMD_DUMMY_CRC),
            CardState::SendReadCmd => (CMD_READ_BLOCK, self.sector, CMD_DUMMY_CRC),
            _ => return,
        };
        self.frame = [
            cmd,
            (arg >> 24) as u8,
            (arg >> 16) as u8,
            (arg >> 8) as u8,
            arg as u8,
            crc,
        ];
        self.frame_sent = 0;
        self.state = target;
    }

    fn push_frame<L: ByteTransfer>(&mut self, link: &mut L, next: CardState) {
        // exchange bytes clocked under the outgoing command are garbage
        let _ = link.take_received();
        if link.ready() {
            link.send(self.frame[self.frame_sent as usize]);
            self.frame_sent += 1;
            if self.frame_sent as usize >= CMD_LEN {
                self.polls = 0;
                self.state = next;
            }
        }
    }

    // Clock fillers until the device answers with a non-filler byte.
    fn poll_response<L: ByteTransfer>(&mut self, link: &mut L) -> Option<u8> {
        if let Some(byte) = link.take_received() {
            if byte != FILLER {
                return Some(byte);
            }
        }
        if link.ready() {
            if self.polls >= self.config.max_response_polls {
                self.fail(CardError::Stalled);
            } else {
                link.send(FILLER);
                self.polls += 1;
            }
        }
        None
    }

    fn fall_back(&mut self, target: CardState) {
        if self.retries >= self.config.max_retries {
            self.fail(CardError::RetriesExhausted);
            return;
        }
        self.retries += 1;
        #[cfg(feature = "log")]
        log::trace!("handshake fallback, retry {}", self.retries);
        self.arm(target);
    }

    fn fail(&mut self, error: CardError) {
        self.state = CardState::Faulted;
        self.fault = Some(error);
        #[cfg(feature = "log")]
        log::warn!("storage protocol fault: {}", error);
    }
}

impl SectorSource for CardDriver {
    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn can_accept(&self) -> bool {
        self.state == CardState::Ready
    }

    fn request(&mut self, sector: u32) -> bool {
        self.request_read(sector)
    }

    fn take_byte(&mut self) -> Option<u8> {
        self.stream_byte.take()
    }

    fn fault(&self) -> Option<CardError> {
        self.fault
    }
}
