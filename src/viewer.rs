//! Top-level image-retrieval pipeline.
//!
//! [`SdImageViewer`] composes the three pipeline stages (byte-transfer
//! engine, storage-device protocol engine, image stream decoder) plus the
//! pixel-store write port, and advances them in a fixed order once per
//! tick. The protocol engine runs first so it observes the link byte
//! completed on the previous tick; the decoder runs next so it consumes
//! the stream byte the protocol engine produced this tick. That one-tick
//! stage latency is part of the handshake timing and is preserved by
//! construction.
//!
//! The outer application drives [`tick()`](SdImageViewer::tick) from its
//! timing source (see [`crate::timer`]), starts loads with
//! [`load()`](SdImageViewer::load), and watches
//! [`poll_done()`](SdImageViewer::poll_done) or the [`Status`] snapshot.
//!
//! ## Example
//!
//! ```rust,ignore
//! use sdview::card::CardConfig;
//! use sdview::spi::{LinkConfig, SpiShifter};
//! use sdview::store::VecStore;
//! use sdview::viewer::SdImageViewer;
//!
//! let link = SpiShifter::new(sck, mosi, miso, cs, LinkConfig::default());
//! let mut viewer = SdImageViewer::new(link, VecStore::new(), CardConfig::default());
//!
//! loop {
//!     viewer.tick(); // called from the timer tick
//!     if viewer.status().initialized {
//!         break;
//!     }
//! }
//! assert!(viewer.load(IMAGE_SECTOR));
//! let result = nb::block!(with_ticks(&mut viewer));
//! ```

use crate::card::{CardConfig, CardDriver};
use crate::decoder::{ImageDecoder, LoadError};
use crate::spi::ByteTransfer;
use crate::store::PixelSink;

/// Read-only snapshot of the pipeline for diagnostic display.
///
/// Observational only; nothing feeds back into the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    /// The device handshake has completed.
    pub initialized: bool,
    /// A block read is currently in flight.
    pub streaming: bool,
    /// The most recent load ran to completion.
    pub load_done: bool,
    /// Why the most recent load stopped short, if it did.
    pub error: Option<LoadError>,
}

/// The composed retrieval pipeline.
///
/// The link and the device are owned exclusively by this pipeline; no
/// other component may drive them.
#[derive(Debug)]
pub struct SdImageViewer<L, P>
where
    L: ByteTransfer,
    P: PixelSink,
{
    /// Byte-transfer engine for the serial link.
    pub link: L,
    /// Storage-device protocol engine.
    pub card: CardDriver,
    /// Image stream decoder.
    pub decoder: ImageDecoder,
    /// Pixel-store write port.
    pub sink: P,
}

impl<L, P> SdImageViewer<L, P>
where
    L: ByteTransfer,
    P: PixelSink,
{
    /// Composes a pipeline over `link` and `sink`.
    pub fn new(link: L, sink: P, config: CardConfig) -> Self {
        Self {
            link,
            card: CardDriver::new(config),
            decoder: ImageDecoder::new(),
            sink,
        }
    }

    /// Advance every stage by one tick, in fixed order.
    pub fn tick(&mut self) {
        self.card.tick(&mut self.link);
        self.decoder.tick(&mut self.card, &mut self.sink);
        self.link.tick();
    }

    /// Begin loading the image at `start_sector`.
    ///
    /// Sampled only while the protocol engine reports initialized; returns
    /// whether the load was accepted. A repeated load overwrites the pixel
    /// store from address zero.
    pub fn load(&mut self, start_sector: u32) -> bool {
        self.decoder.start(start_sector, &self.card)
    }

    /// Nonblocking completion poll for the current load.
    ///
    /// Returns `WouldBlock` while the load is in flight (or none was
    /// started), `Ok` once it completes, and the load error if it was
    /// abandoned.
    pub fn poll_done(&mut self) -> nb::Result<(), LoadError> {
        if let Some(error) = self.decoder.error() {
            return Err(nb::Error::Other(error));
        }
        if self.decoder.is_done() {
            Ok(())
        } else {
            Err(nb::Error::WouldBlock)
        }
    }

    /// Diagnostic snapshot of the pipeline.
    pub fn status(&self) -> Status {
        Status {
            initialized: self.card.is_initialized(),
            streaming: self.card.is_streaming(),
            load_done: self.decoder.is_done(),
            error: self
                .decoder
                .error()
                .or_else(|| self.card.fault().map(LoadError::Card)),
        }
    }
}
