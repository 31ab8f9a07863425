//! Image stream decoder.
//!
//! This module provides [`ImageDecoder`], which turns the protocol
//! engine's sector byte stream into pixel writes at sequential linear
//! addresses, requesting further sequential sectors as each one is
//! exhausted.
//!
//! A load starts at a caller-given sector. The first eight bytes are the
//! image header (width, height, format); the rest of the stream is pixel
//! samples, one byte per pixel for grayscale or three for RGB, packed with
//! no padding and spanning as many 512-byte sectors as needed. The decoder
//! crosses sector boundaries on its own: the caller triggers a load once
//! and the decoder issues every read request itself.
//!
//! Oversized or unknown-format images are abandoned, never retried: the
//! decoder parks in a failed state whose reason is available from
//! [`error()`](ImageDecoder::error), and the load-done flag never
//! asserts.
//!
//! The decoder talks to the protocol engine through [`SectorSource`] and
//! writes pixels through [`PixelSink`](crate::store::PixelSink), so it can
//! be exercised against scripted sources in tests.

use crate::card::CardError;
use crate::consts::{BPP_GRAY8, BPP_RGB24, HEADER_LEN, MAX_HEIGHT, MAX_WIDTH, SECTOR_LEN};
use crate::pixel::Rgb444;
use crate::store::PixelSink;
use thiserror::Error;

/// Why a load stopped short of completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LoadError {
    /// Declared dimensions exceed the fixed canvas.
    #[error("declared image dimensions exceed the canvas")]
    ImageTooLarge,
    /// The header's format tag named an unknown pixel encoding.
    #[error("unsupported pixel format tag")]
    UnsupportedFormat,
    /// The storage layer faulted mid-load.
    #[error("storage fault: {0}")]
    Card(#[from] CardError),
}

/// Sector-read interface the decoder drives. Implemented by
/// [`CardDriver`](crate::card::CardDriver); tests substitute scripted
/// sources.
pub trait SectorSource {
    /// Whether the device handshake has completed. Loads are only
    /// accepted afterwards.
    fn is_initialized(&self) -> bool;

    /// Whether a read request would be accepted this tick.
    fn can_accept(&self) -> bool;

    /// Ask for one sector. Returns false if the request was not accepted.
    fn request(&mut self, sector: u32) -> bool;

    /// Take the stream byte produced this tick, if any.
    fn take_byte(&mut self) -> Option<u8>;

    /// The fault that parked the storage layer, if any.
    fn fault(&self) -> Option<CardError>;
}

/// Parsed fixed-size image header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImageHeader {
    /// Image width in pixels.
    pub width: u16,
    /// Image height in pixels.
    pub height: u16,
    /// Bits per pixel: 8 for grayscale, 24 for RGB.
    pub bits_per_pixel: u8,
}

impl ImageHeader {
    // Byte order: two little-endian 16-bit fields, the format byte, then
    // three reserved bytes.
    fn parse(raw: &[u8; HEADER_LEN as usize]) -> Self {
        Self {
            width: u16::from_le_bytes([raw[0], raw[1]]),
            height: u16::from_le_bytes([raw[2], raw[3]]),
            bits_per_pixel: raw[4],
        }
    }

    /// Total number of pixels the image declares.
    pub fn pixel_count(&self) -> u32 {
        u32::from(self.width) * u32::from(self.height)
    }
}

/// Decoder state.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
pub enum DecodeState {
    /// Waiting for a load request.
    #[default]
    Idle,
    /// Consuming the eight header bytes.
    ReadHeader,
    /// Converting payload bytes into pixel writes.
    ReadPixels,
    /// Load finished; every pixel has been written.
    Done,
    /// Load abandoned; see [`ImageDecoder::error`].
    Failed,
}

/// Streaming image decoder.
///
/// Advance it once per tick with [`tick()`](ImageDecoder::tick) after the
/// sector source has been advanced, so it consumes the byte the source
/// produced this tick. One pixel write is issued per emitted pixel, at
/// strictly sequential addresses starting from zero; re-starting a load
/// rewinds the address counter and overwrites from the beginning.
#[derive(Debug)]
pub struct ImageDecoder {
    /// Header of the current load. Valid once the eight header bytes have
    /// been consumed.
    pub header: ImageHeader,
    state: DecodeState,
    raw_header: [u8; HEADER_LEN as usize],
    header_got: u8,
    sector: u32,
    sector_bytes: u16,
    requested: bool,
    rgb: [u8; 3],
    rgb_got: u8,
    pixel_addr: u32,
    error: Option<LoadError>,
}

impl ImageDecoder {
    /// Creates an idle decoder.
    pub fn new() -> Self {
        Self {
            header: ImageHeader::default(),
            state: DecodeState::Idle,
            raw_header: [0; HEADER_LEN as usize],
            header_got: 0,
            sector: 0,
            sector_bytes: 0,
            requested: false,
            rgb: [0; 3],
            rgb_got: 0,
            pixel_addr: 0,
            error: None,
        }
    }

    /// Current decoder state, for diagnostics.
    pub fn state(&self) -> DecodeState {
        self.state
    }

    /// Whether the most recent load ran to completion.
    pub fn is_done(&self) -> bool {
        self.state == DecodeState::Done
    }

    /// Why the most recent load was abandoned, if it was.
    pub fn error(&self) -> Option<LoadError> {
        self.error
    }

    /// Begin loading the image stored at `start_sector`.
    ///
    /// Accepted only once the storage device reports initialized; returns
    /// whether the load was accepted. Restarting is idempotent: counters
    /// rewind and the pixel store is overwritten from address zero.
    pub fn start<S: SectorSource>(&mut self, start_sector: u32, source: &S) -> bool {
        if !source.is_initialized() {
            return false;
        }
        self.header = ImageHeader::default();
        self.state = DecodeState::ReadHeader;
        self.raw_header = [0; HEADER_LEN as usize];
        self.header_got = 0;
        self.sector = start_sector;
        self.sector_bytes = 0;
        self.requested = false;
        self.rgb = [0; 3];
        self.rgb_got = 0;
        self.pixel_addr = 0;
        self.error = None;
        true
    }

    /// Advance the decoder by one tick.
    pub fn tick<S: SectorSource, P: PixelSink>(&mut self, source: &mut S, sink: &mut P) {
        if !matches!(self.state, DecodeState::ReadHeader | DecodeState::ReadPixels) {
            return;
        }
        if let Some(fault) = source.fault() {
            self.abandon(LoadError::Card(fault));
            return;
        }
        let byte = source.take_byte();
        if !self.requested {
            // stale bytes from an abandoned stream drain here, undecoded
            if source.can_accept() && source.request(self.sector) {
                self.requested = true;
            }
        } else if let Some(byte) = byte {
            self.consume(byte, sink);
        } else if source.can_accept() {
            // the read was rejected at the protocol level; ask again
            let _ = source.request(self.sector);
        }
    }

    fn consume<P: PixelSink>(&mut self, byte: u8, sink: &mut P) {
        match self.state {
            DecodeState::ReadHeader => {
                self.raw_header[self.header_got as usize] = byte;
                self.header_got += 1;
                if self.header_got >= HEADER_LEN {
                    self.finish_header();
                }
            }
            DecodeState::ReadPixels => self.pixel_byte(byte, sink),
            _ => {}
        }
        self.sector_bytes += 1;
        if self.sector_bytes >= SECTOR_LEN {
            // the image continues in the next sequential sector
            self.sector_bytes = 0;
            self.sector += 1;
            self.requested = false;
        }
    }

    fn finish_header(&mut self) {
        self.header = ImageHeader::parse(&self.raw_header);
        if self.header.width > MAX_WIDTH || self.header.height > MAX_HEIGHT {
            self.abandon(LoadError::ImageTooLarge);
            return;
        }
        if self.header.bits_per_pixel != BPP_GRAY8 && self.header.bits_per_pixel != BPP_RGB24 {
            self.abandon(LoadError::UnsupportedFormat);
            return;
        }
        #[cfg(feature = "log")]
        log::debug!(
            "image header {}x{}, {} bpp",
            self.header.width,
            self.header.height,
            self.header.bits_per_pixel
        );
        if self.header.pixel_count() == 0 {
            self.state = DecodeState::Done;
        } else {
            self.state = DecodeState::ReadPixels;
        }
    }

    fn pixel_byte<P: PixelSink>(&mut self, byte: u8, sink: &mut P) {
        if self.header.bits_per_pixel == BPP_GRAY8 {
            self.emit(Rgb444::from_gray8(byte), sink);
        } else {
            self.rgb[self.rgb_got as usize] = byte;
            self.rgb_got += 1;
            if self.rgb_got >= 3 {
                self.rgb_got = 0;
                self.emit(
                    Rgb444::from_rgb888(self.rgb[0], self.rgb[1], self.rgb[2]),
                    sink,
                );
            }
        }
    }

    fn emit<P: PixelSink>(&mut self, pixel: Rgb444, sink: &mut P) {
        sink.write_pixel(self.pixel_addr, pixel);
        self.pixel_addr += 1;
        if self.pixel_addr >= self.header.pixel_count() {
            // trailing bytes of a partially consumed final sector are
            // left unprocessed
            self.state = DecodeState::Done;
        }
    }

    fn abandon(&mut self, error: LoadError) {
        self.state = DecodeState::Failed;
        self.error = Some(error);
        #[cfg(feature = "log")]
        log::warn!("image load abandoned: {}", error);
    }
}

impl Default for ImageDecoder {
    fn default() -> Self {
        Self::new()
    }
}
