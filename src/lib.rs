//! # sdview
//!
//! A portable, no_std Rust driver for retrieving raw images from SD-class
//! storage devices in SPI mode and decoding them into an external pixel
//! store.
//!
//! The crate implements the three-stage retrieval pipeline of a small
//! image viewer:
//!
//! - a bit-level **byte shifter** over `embedded-hal` digital pins
//!   ([`spi`]), with a one-way slow-to-fast clock switch,
//! - a **protocol engine** ([`card`]) that drives the device through its
//!   initialization handshake and serves single-block (512-byte) reads,
//!   with bounded retries instead of the spin-forever behavior such
//!   devices otherwise invite, and
//! - a streaming **image decoder** ([`decoder`]) that parses an 8-byte
//!   header, converts grayscale or RGB samples to 12-bit pixels, and
//!   crosses sector boundaries on its own.
//!
//! Everything is tick-driven: each stage is a state machine advanced once
//! per tick, composed in a fixed order by [`viewer::SdImageViewer`] so
//! stage-to-stage latency stays at exactly one tick.
//!
//! ## Crate features
//! | Feature               | Description |
//! |-----------------------|-------------|
//! | `std`                 | Disables `#![no_std]` and replaces `heapless::Vec`s with `std::vec::Vec`s |
//! | `delay-loop`          | Blocking tick loops over `embedded_hal::delay::DelayNs` |
//! | `timer-isr` (default) | `critical_section`-protected global pipeline for timer ISRs |
//! | `defmt-0-3`           | Wires `defmt` support through the dependency tree |
//! | `log`                 | Emits `log` records at protocol milestones |
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sdview::card::CardConfig;
//! use sdview::spi::SpiShifter;
//! use sdview::store::VecStore;
//! use sdview::timer::link_config;
//! use sdview::viewer::SdImageViewer;
//!
//! let link = SpiShifter::new(sck, mosi, miso, cs, link_config(TICK_HZ));
//! let mut viewer = SdImageViewer::new(link, VecStore::new(), CardConfig::default());
//!
//! loop {
//!     viewer.tick(); // call at the configured tick rate
//!     // ...
//! }
//! ```
//!
//! Or let a blocking delay drive the ticks (`delay-loop` feature):
//!
//! ```rust,ignore
//! sdview::timer::run_init_loop(&mut viewer, &mut delay, 1)?;
//! viewer.load(IMAGE_SECTOR);
//! sdview::timer::run_load_loop(&mut viewer, &mut delay, 1)?;
//! ```
//!
//! ## Integration Notes
//!
//! - The serial link and the device are owned exclusively by the
//!   pipeline; nothing else may drive the pins.
//! - One read request is outstanding at a time and runs to completion;
//!   there is no cancellation.
//! - Display timing, pan/zoom arithmetic and input handling live outside
//!   this crate; the only contact points are the
//!   [`store::PixelSink`] write port and the [`viewer::Status`] snapshot.
//!
//! --
//! Designed for `#![no_std]` use in resource-constrained embedded
//! environments.

#![deny(
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    while_true,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results
)]
#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "timer-isr")]
pub use critical_section;

#[cfg(not(feature = "std"))]
pub use heapless;

pub mod card;
pub mod consts;
pub(crate) mod crc;
pub mod decoder;
pub mod pixel;
pub mod spi;
pub mod store;
#[cfg(test)]
mod testlink;
pub mod timer;
pub mod viewer;
