//! Scripted storage-device simulation for protocol and pipeline tests.
//!
//! [`FakeCard`] speaks the device side of the SPI-mode protocol one byte
//! exchange at a time: it frames six-byte commands off the outgoing line,
//! queues the scripted response (with a one-byte latency gap, as real
//! devices insert), and serves sector payloads from a byte image with real
//! or deliberately corrupted CRCs. Knobs select the failure scenarios the
//! protocol engine must recover from.
//!
//! [`FakeLink`] exposes a `FakeCard` through
//! [`ByteTransfer`](crate::spi::ByteTransfer), completing one exchange per
//! tick.

use crate::consts::{
    CMD_APP_PREFIX, CMD_IF_COND, CMD_INIT_OP, CMD_LEN, CMD_READ_BLOCK, CMD_RESET, DATA_TOKEN,
    FILLER, IF_COND_ECHO, IF_COND_VOLTAGE_OK, R1_IDLE, R1_READY,
};
use crate::crc::crc16_xmodem_update;
use crate::spi::ByteTransfer;
use std::collections::VecDeque;
use std::vec::Vec;

pub(crate) struct FakeCard {
    /// Byte image served to block reads, mapped from `base_sector`.
    pub image: Vec<u8>,
    /// Sector address of the first image byte.
    pub base_sector: u32,
    /// Respond to this many interface-condition queries with a wrong echo.
    pub bad_if_cond_echoes: u8,
    /// Report busy to this many initialization operations.
    pub init_busy_rounds: u8,
    /// Reject this many read commands.
    pub read_nacks: u8,
    /// Never answer read commands at all.
    pub read_silent: bool,
    /// Serve sector CRCs with a flipped low byte.
    pub corrupt_crc: bool,
    /// Never answer anything.
    pub silent: bool,
    /// Every complete command frame observed, in order.
    pub commands: Vec<[u8; CMD_LEN]>,
    cmd_buf: Vec<u8>,
    out: VecDeque<u8>,
}

impl FakeCard {
    pub fn new() -> Self {
        Self {
            image: Vec::new(),
            base_sector: 0,
            bad_if_cond_echoes: 0,
            init_busy_rounds: 0,
            read_nacks: 0,
            read_silent: false,
            corrupt_crc: false,
            silent: false,
            commands: Vec::new(),
            cmd_buf: Vec::new(),
            out: VecDeque::new(),
        }
    }

    /// One full-duplex byte exchange: consume the host byte, return the
    /// device byte.
    pub fn exchange(&mut self, mosi: u8) -> u8 {
        let reply = self.out.pop_front().unwrap_or(FILLER);
        if self.cmd_buf.is_empty() {
            // command frames start with 01 in the top bits; everything
            // else on an idle line is filler
            if (mosi & 0xC0) == 0x40 {
                self.cmd_buf.push(mosi);
            }
        } else {
            self.cmd_buf.push(mosi);
            if self.cmd_buf.len() == CMD_LEN {
                let mut frame = [0u8; CMD_LEN];
                frame.copy_from_slice(&self.cmd_buf);
                self.cmd_buf.clear();
                self.commands.push(frame);
                if !self.silent {
                    self.respond(frame);
                }
            }
        }
        reply
    }

    fn respond(&mut self, frame: [u8; CMD_LEN]) {
        // one filler of response latency before every reply
        self.out.push_back(FILLER);
        match frame[0] {
            CMD_RESET => self.out.push_back(R1_IDLE),
            CMD_IF_COND => {
                self.out.push_back(R1_IDLE);
                let echo = if self.bad_if_cond_echoes > 0 {
                    self.bad_if_cond_echoes -= 1;
                    0x55
                } else {
                    IF_COND_ECHO
                };
                self.out.extend([0x00, 0x00, IF_COND_VOLTAGE_OK, echo]);
            }
            CMD_APP_PREFIX => self.out.push_back(R1_IDLE),
            CMD_INIT_OP => {
                if self.init_busy_rounds > 0 {
                    self.init_busy_rounds -= 1;
                    self.out.push_back(R1_IDLE);
                } else {
                    self.out.push_back(R1_READY);
                }
            }
            CMD_READ_BLOCK => {
                if self.read_silent {
                    return;
                }
                if self.read_nacks > 0 {
                    self.read_nacks -= 1;
                    self.out.push_back(0x05);
                    return;
                }
                self.out.push_back(R1_READY);
                self.out.push_back(FILLER);
                self.out.push_back(DATA_TOKEN);
                let sector = u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]);
                let start = sector.saturating_sub(self.base_sector) as usize * 512;
                let mut crc = 0u16;
                for offset in 0..512 {
                    let byte = self.image.get(start + offset).copied().unwrap_or(0);
                    crc = crc16_xmodem_update(crc, byte);
                    self.out.push_back(byte);
                }
                if self.corrupt_crc {
                    crc ^= 0x00FF;
                }
                self.out.push_back((crc >> 8) as u8);
                self.out.push_back(crc as u8);
            }
            _ => self.out.push_back(0x05),
        }
    }
}

pub(crate) struct FakeLink {
    /// The simulated device on the other end of the link.
    pub card: FakeCard,
    /// Whether the fast bit clock has been selected.
    pub fast: bool,
    /// Whether chip-select is being forced active.
    pub selected: bool,
    pending: Option<u8>,
    received: Option<u8>,
}

impl FakeLink {
    pub fn new(card: FakeCard) -> Self {
        Self {
            card,
            fast: false,
            selected: false,
            pending: None,
            received: None,
        }
    }
}

impl ByteTransfer for FakeLink {
    fn ready(&self) -> bool {
        self.pending.is_none()
    }

    fn send(&mut self, byte: u8) {
        if self.pending.is_none() {
            self.pending = Some(byte);
        }
    }

    fn take_received(&mut self) -> Option<u8> {
        self.received.take()
    }

    fn set_fast_mode(&mut self) {
        self.fast = true;
    }

    fn force_select(&mut self, active: bool) {
        self.selected = active;
    }

    fn tick(&mut self) {
        self.received = None;
        if let Some(byte) = self.pending.take() {
            self.received = Some(self.card.exchange(byte));
        }
    }
}
