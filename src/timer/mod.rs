//! Tick scheduling helpers for the retrieval pipeline.
//!
//! The pipeline advances one step per tick; this module maps a tick rate
//! onto the two serial-clock rates and offers two ways to drive the tick:
//! a blocking delay loop (`delay-loop` feature) or a timer-interrupt
//! singleton protected by `critical_section` (`timer-isr` feature).
//!
//! Contains:
//! - `sck_divisor`: runtime divisor calculator
//! - `const_sck_divisor`: compile-time divisor calculator
//! - `link_config`: both divisors bundled for [`SpiShifter`](crate::spi::SpiShifter)
//! - `run_init_loop` / `run_load_loop`: blocking loops over `DelayNs`
//!   (feature `delay-loop`)
//! - `global_viewer_*` helpers and the `init_sd_viewer!` /
//!   `setup_sd_viewer!` / `tick_sd_viewer!` macros (feature `timer-isr`)
//!
//! Common tick rates: (for use with `sck_divisor` and `const_sck_divisor`)
//!
//! | Tick rate | Slow divisor | Fast divisor |
//! |-----------|--------------|--------------|
//! |     8 MHz |           10 |            1 |
//! |    16 MHz |           20 |            1 |
//! |    48 MHz |           60 |            2 |

use crate::spi::LinkConfig;
use libm::round;

#[cfg(feature = "delay-loop")]
mod delay;
#[cfg(feature = "delay-loop")]
pub use delay::*;

#[cfg(feature = "timer-isr")]
mod isr;
#[cfg(feature = "timer-isr")]
pub use isr::*;

#[cfg(feature = "timer-isr")]
mod macros;

/// Serial-clock rate used until the device finishes initializing.
/// Storage devices accept at most 400 kHz before the handshake completes.
pub const SLOW_SCK_HZ: u32 = 400_000;

/// Serial-clock rate used once initialization completes.
pub const FAST_SCK_HZ: u32 = 12_500_000;

/// Computes the tick divisor for one half bit-period of the serial clock.
///
/// # Arguments
/// - `tick_hz`: rate at which the pipeline is ticked
/// - `sck_hz`: desired serial-clock rate
///
/// # Returns
/// Ticks per half bit-period, rounded to nearest and clamped to at
/// least 1 (the serial clock can never outrun the tick).
pub fn sck_divisor(tick_hz: u32, sck_hz: u32) -> u16 {
    let ticks_per_half_bit = tick_hz as f64 / (2.0 * sck_hz as f64);
    let divisor = round(ticks_per_half_bit) as u16;
    divisor.max(1)
}

/// Compile-time divisor calculator. Truncates instead of rounding.
///
/// # Arguments
/// - `tick_hz`: rate at which the pipeline is ticked
/// - `sck_hz`: desired serial-clock rate
pub const fn const_sck_divisor(tick_hz: u32, sck_hz: u32) -> u16 {
    let divisor = (tick_hz / (2 * sck_hz)) as u16;
    if divisor == 0 { 1 } else { divisor }
}

/// Bundles both divisors for a tick rate, using the standard slow and
/// fast serial-clock rates.
pub fn link_config(tick_hz: u32) -> LinkConfig {
    LinkConfig {
        slow_divisor: sck_divisor(tick_hz, SLOW_SCK_HZ),
        fast_divisor: sck_divisor(tick_hz, FAST_SCK_HZ),
    }
}
