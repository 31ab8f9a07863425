//! Bit-level byte transfer over the 1-bit-wide serial link.
//!
//! This module provides [`SpiShifter`], a tick-driven SPI mode-0 master
//! built directly on `embedded-hal` digital pins, and [`ByteTransfer`],
//! the byte-wide face of the link that the protocol layer drives.
//!
//! The shifter converts an 8-bit value into a serial bit sequence
//! (most-significant bit first) while simultaneously sampling the incoming
//! line into a received byte. It has no notion of command framing: it
//! moves bytes, asserts chip-select while a burst is in flight, and
//! releases it when the caller stops supplying bytes. Framing, polling and
//! retries belong to the protocol layer.
//!
//! ## Timing
//!
//! The shifter advances one step per [`tick()`](SpiShifter::tick) call.
//! The serial-clock rate is set by a divisor counted in ticks per half
//! bit-period, switchable exactly once from a slow rate (used until the
//! storage device finishes initializing) to a fast rate. See
//! [`crate::timer`] for divisor calculators.
//!
//! ## Design Notes
//!
//! This layer cannot fail. Sending while not ready is ignored by
//! contract; the caller must honor [`ready()`](ByteTransfer::ready).

use embedded_hal::digital::{InputPin, OutputPin};

/// Clock-rate settings for the byte shifter, counted in ticks per half
/// bit-period.
#[derive(Debug, Clone, Copy)]
pub struct LinkConfig {
    /// Divisor used until the device finishes initializing.
    pub slow_divisor: u16,
    /// Divisor used once the protocol layer switches to fast mode.
    pub fast_divisor: u16,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            slow_divisor: 16,
            fast_divisor: 1,
        }
    }
}

/// Byte-wide view of the serial link, as driven by the protocol layer.
///
/// [`SpiShifter`] is the pin-level implementation; tests substitute a
/// scripted link. Exchanges are full duplex: every sent byte produces
/// exactly one received byte, reported for a single tick.
pub trait ByteTransfer {
    /// Whether a byte can be queued this tick. True in the idle state and
    /// while latching a finished byte, never mid-shift.
    fn ready(&self) -> bool;

    /// Queue one byte for exchange. Ignored when not
    /// [`ready`](ByteTransfer::ready).
    fn send(&mut self, byte: u8);

    /// Take the byte whose exchange completed on the previous tick, if
    /// any. The byte is reported exactly once.
    fn take_received(&mut self) -> Option<u8>;

    /// Switch to the fast bit clock. One-directional; there is no way
    /// back within a session.
    fn set_fast_mode(&mut self);

    /// Hold chip-select active across gaps between queued bytes, so a
    /// multi-byte command burst stays selected while the caller decides
    /// what to send next.
    fn force_select(&mut self, active: bool);

    /// Advance the link by one tick.
    fn tick(&mut self);
}

/// Transfer-engine state.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
pub enum ShiftState {
    /// No exchange in progress. Chip-select releases here unless forced.
    #[default]
    Idle,
    /// Eight bit periods: driving the outgoing line on the falling clock
    /// phase, sampling the incoming line on the rising phase.
    Transfer,
    /// Latch the received byte and report it for one tick, then chain
    /// into the next queued byte or fall back to idle.
    Finish,
}

/// A tick-driven SPI mode-0 byte shifter over four digital pins.
///
/// ## Type Parameters
///
/// - `SCK`, `MOSI`, `CS`: [`embedded_hal::digital::OutputPin`]s for the
///   serial clock, outgoing data, and active-low chip-select.
/// - `MISO`: an [`embedded_hal::digital::InputPin`] for incoming data.
///
/// The outgoing data line idles high between bytes, matching the
/// serial-flash idle convention the storage device expects.
#[derive(Debug)]
pub struct SpiShifter<SCK, MOSI, MISO, CS>
where
    SCK: OutputPin,
    MOSI: OutputPin,
    MISO: InputPin,
    CS: OutputPin,
{
    /// Serial-clock pin.
    pub sck: SCK,
    /// Outgoing data pin.
    pub mosi: MOSI,
    /// Incoming data pin.
    pub miso: MISO,
    /// Active-low chip-select pin.
    pub cs: CS,
    config: LinkConfig,
    state: ShiftState,
    fast: bool,
    div_count: u16,
    sck_high: bool,
    bits_done: u8,
    shift_out: u8,
    shift_in: u8,
    pending: Option<u8>,
    received: Option<u8>,
    cs_forced: bool,
    cs_active: bool,
}

impl<SCK, MOSI, MISO, CS> SpiShifter<SCK, MOSI, MISO, CS>
where
    SCK: OutputPin,
    MOSI: OutputPin,
    MISO: InputPin,
    CS: OutputPin,
{
    /// Creates a new shifter and drives all output pins to their idle
    /// levels: chip-select released, clock low, data high.
    pub fn new(sck: SCK, mosi: MOSI, miso: MISO, cs: CS, config: LinkConfig) -> Self {
        let mut sck = sck;
        let mut mosi = mosi;
        let mut cs = cs;
        let _ = cs.set_high();
        let _ = sck.set_low();
        let _ = mosi.set_high();
        Self {
            sck,
            mosi,
            miso,
            cs,
            config,
            state: ShiftState::Idle,
            fast: false,
            div_count: 0,
            sck_high: false,
            bits_done: 0,
            shift_out: 0,
            shift_in: 0,
            pending: None,
            received: None,
            cs_forced: false,
            cs_active: false,
        }
    }

    /// Current engine state, for diagnostics.
    pub fn state(&self) -> ShiftState {
        self.state
    }

    fn divisor(&self) -> u16 {
        let d = if self.fast {
            self.config.fast_divisor
        } else {
            self.config.slow_divisor
        };
        d.max(1)
    }

    fn drive_bit(&mut self, index: u8) {
        if self.shift_out & (1 << index) != 0 {
            let _ = self.mosi.set_high();
        } else {
            let _ = self.mosi.set_low();
        }
    }

    fn begin_byte(&mut self, byte: u8) {
        if !self.cs_active {
            self.cs_active = true;
            let _ = self.cs.set_low();
        }
        self.shift_out = byte;
        self.shift_in = 0;
        self.bits_done = 0;
        self.div_count = 0;
        self.sck_high = false;
        self.drive_bit(7);
        self.state = ShiftState::Transfer;
    }

    fn half_step(&mut self) {
        if self.sck_high {
            let _ = self.sck.set_low();
            self.sck_high = false;
            self.bits_done += 1;
            if self.bits_done >= 8 {
                self.state = ShiftState::Finish;
            } else {
                self.drive_bit(7 - self.bits_done);
            }
        } else {
            let _ = self.sck.set_high();
            self.sck_high = true;
            let sampled = self.miso.is_high().unwrap_or(false);
            self.shift_in = (self.shift_in << 1) | u8::from(sampled);
        }
    }
}

impl<SCK, MOSI, MISO, CS> ByteTransfer for SpiShifter<SCK, MOSI, MISO, CS>
where
    SCK: OutputPin,
    MOSI: OutputPin,
    MISO: InputPin,
    CS: OutputPin,
{
    fn ready(&self) -> bool {
        self.pending.is_none() && self.state != ShiftState::Transfer
    }

    fn send(&mut self, byte: u8) {
        if self.ready() {
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
        self.cs_forced = active;
    }

    fn tick(&mut self) {
        self.received = None;
        match self.state {
            ShiftState::Idle => {
                if let Some(byte) = self.pending.take() {
                    self.begin_byte(byte);
                } else if self.cs_active && !self.cs_forced {
                    self.cs_active = false;
                    let _ = self.cs.set_high();
                }
            }
            ShiftState::Transfer => {
                self.div_count += 1;
                if self.div_count >= self.divisor() {
                    self.div_count = 0;
                    self.half_step();
                }
            }
            ShiftState::Finish => {
                self.received = Some(self.shift_in);
                if let Some(byte) = self.pending.take() {
                    self.begin_byte(byte);
                } else {
                    self.state = ShiftState::Idle;
                    let _ = self.mosi.set_high();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::eh1::digital::{
        Mock as PinMock, State as PinState, Transaction as PinTransaction,
    };

    fn level(high: bool) -> PinState {
        if high { PinState::High } else { PinState::Low }
    }

    // Expected per-pin transactions for exchanging `bytes`, assuming the
    // caller queues each byte as soon as the previous one is reported.
    fn mosi_script(bytes: &[u8]) -> Vec<PinTransaction> {
        let mut v = vec![PinTransaction::set(PinState::High)];
        for &b in bytes {
            for i in (0..8).rev() {
                v.push(PinTransaction::set(level(b & (1 << i) != 0)));
            }
            v.push(PinTransaction::set(PinState::High));
        }
        v
    }

    fn sck_script(byte_count: usize) -> Vec<PinTransaction> {
        let mut v = vec![PinTransaction::set(PinState::Low)];
        for _ in 0..byte_count * 8 {
            v.push(PinTransaction::set(PinState::High));
            v.push(PinTransaction::set(PinState::Low));
        }
        v
    }

    fn miso_script(bytes: &[u8]) -> Vec<PinTransaction> {
        let mut v = Vec::new();
        for &b in bytes {
            for i in (0..8).rev() {
                v.push(PinTransaction::get(level(b & (1 << i) != 0)));
            }
        }
        v
    }

    fn cs_script() -> Vec<PinTransaction> {
        vec![
            PinTransaction::set(PinState::High),
            PinTransaction::set(PinState::Low),
            PinTransaction::set(PinState::High),
        ]
    }

    fn teardown(mut shifter: SpiShifter<PinMock, PinMock, PinMock, PinMock>) {
        shifter.sck.done();
        shifter.mosi.done();
        shifter.miso.done();
        shifter.cs.done();
    }

    // Run ticks until a received byte is reported, returning it and the
    // number of ticks taken.
    fn exchange(shifter: &mut SpiShifter<PinMock, PinMock, PinMock, PinMock>) -> (u8, u32) {
        let mut ticks = 0;
        loop {
            shifter.tick();
            ticks += 1;
            if let Some(byte) = shifter.take_received() {
                return (byte, ticks);
            }
            assert!(ticks < 1000, "exchange never completed");
        }
    }

    #[test]
    fn test_new_drives_idle_levels() {
        let sck = PinMock::new(&[PinTransaction::set(PinState::Low)]);
        let mosi = PinMock::new(&[PinTransaction::set(PinState::High)]);
        let miso = PinMock::new(&[]);
        let cs = PinMock::new(&[PinTransaction::set(PinState::High)]);

        let shifter = SpiShifter::new(sck, mosi, miso, cs, LinkConfig::default());
        assert_eq!(shifter.state(), ShiftState::Idle);
        assert!(shifter.ready());
        teardown(shifter);
    }

    #[test]
    fn test_exchange_single_byte_msb_first() {
        let config = LinkConfig {
            slow_divisor: 1,
            fast_divisor: 1,
        };
        let sck = PinMock::new(&sck_script(1));
        let mosi = PinMock::new(&mosi_script(&[0xA5]));
        let miso = PinMock::new(&miso_script(&[0x3C]));
        let cs = PinMock::new(&cs_script());

        let mut shifter = SpiShifter::new(sck, mosi, miso, cs, config);
        shifter.send(0xA5);
        let (byte, ticks) = exchange(&mut shifter);
        assert_eq!(byte, 0x3C);
        // one tick to leave idle, sixteen half-steps, one finish tick
        assert_eq!(ticks, 18);
        assert!(shifter.ready());

        // idle tick with nothing queued releases chip-select
        shifter.tick();
        teardown(shifter);
    }

    #[test]
    fn test_fast_mode_halves_bit_period_once() {
        let config = LinkConfig {
            slow_divisor: 2,
            fast_divisor: 1,
        };
        let sck = PinMock::new(&sck_script(2));
        let mosi = PinMock::new(&mosi_script(&[0xF0, 0x0F]));
        let miso = PinMock::new(&miso_script(&[0x81, 0x18]));
        let cs = PinMock::new(&cs_script());

        let mut shifter = SpiShifter::new(sck, mosi, miso, cs, config);
        shifter.send(0xF0);
        let (slow_byte, slow_ticks) = exchange(&mut shifter);
        assert_eq!(slow_byte, 0x81);
        assert_eq!(slow_ticks, 34);

        shifter.set_fast_mode();
        shifter.send(0x0F);
        let (fast_byte, fast_ticks) = exchange(&mut shifter);
        assert_eq!(fast_byte, 0x18);
        assert_eq!(fast_ticks, 18);

        shifter.tick();
        teardown(shifter);
    }

    #[test]
    fn test_send_while_shifting_is_ignored() {
        let config = LinkConfig {
            slow_divisor: 1,
            fast_divisor: 1,
        };
        let sck = PinMock::new(&sck_script(1));
        let mosi = PinMock::new(&mosi_script(&[0xAA]));
        let miso = PinMock::new(&miso_script(&[0x00]));
        let cs = PinMock::new(&cs_script());

        let mut shifter = SpiShifter::new(sck, mosi, miso, cs, config);
        shifter.send(0xAA);
        shifter.tick();
        shifter.tick();
        assert!(!shifter.ready());
        shifter.send(0x55);
        assert!(shifter.pending.is_none());

        let (byte, _) = exchange(&mut shifter);
        assert_eq!(byte, 0x00);
        shifter.tick();
        teardown(shifter);
    }

    #[test]
    fn test_forced_select_survives_idle_gaps() {
        let config = LinkConfig {
            slow_divisor: 1,
            fast_divisor: 1,
        };
        let sck = PinMock::new(&sck_script(1));
        let mosi = PinMock::new(&mosi_script(&[0xFF]));
        let miso = PinMock::new(&miso_script(&[0xFF]));
        // released only after the force is dropped
        let cs = PinMock::new(&cs_script());

        let mut shifter = SpiShifter::new(sck, mosi, miso, cs, config);
        shifter.force_select(true);
        shifter.send(0xFF);
        let (byte, _) = exchange(&mut shifter);
        assert_eq!(byte, 0xFF);

        shifter.tick();
        shifter.tick();
        assert!(shifter.cs_active);

        shifter.force_select(false);
        shifter.tick();
        assert!(!shifter.cs_active);
        teardown(shifter);
    }
}
