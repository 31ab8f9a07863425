use crate::card::CardConfig;
use crate::spi::ByteTransfer;
use crate::store::PixelSink;
use crate::viewer::{SdImageViewer, Status};
use core::cell::RefCell;
use critical_section::Mutex;

/// Declares the empty global slot for a pipeline shared between the main
/// thread and a timer interrupt.
///
/// # Example
/// ```rust,ignore
/// use core::cell::RefCell;
/// use critical_section::Mutex;
/// use sdview::timer::global_viewer_init;
/// use sdview::viewer::SdImageViewer;
///
/// static SD_VIEWER: Mutex<RefCell<Option<SdImageViewer<MyLink, MyStore>>>> =
///     global_viewer_init::<MyLink, MyStore>();
/// ```
pub const fn global_viewer_init<L: ByteTransfer, P: PixelSink>()
-> Mutex<RefCell<Option<SdImageViewer<L, P>>>> {
    Mutex::new(RefCell::new(None))
}

/// Fills the global slot with a freshly composed pipeline.
///
/// # Arguments
/// - `global_viewer`: the static declared with [`global_viewer_init`]
/// - `link`: the byte-transfer engine
/// - `sink`: the pixel-store write port
/// - `config`: protocol-engine limits
///
/// # Example
/// ```rust,ignore
/// fn main() {
///     global_viewer_setup(&SD_VIEWER, link, store, CardConfig::default());
/// }
/// ```
pub fn global_viewer_setup<L: ByteTransfer, P: PixelSink>(
    global_viewer: &'static Mutex<RefCell<Option<SdImageViewer<L, P>>>>,
    link: L,
    sink: P,
    config: CardConfig,
) {
    critical_section::with(|cs| {
        let _ = global_viewer
            .borrow(cs)
            .replace(Some(SdImageViewer::new(link, sink, config)));
    });
}

/// Advances the global pipeline by one tick, if it has been set up.
///
/// Intended to be called from a timer interrupt service routine.
///
/// # Example
/// ```rust,ignore
/// #[interrupt]
/// fn TIM2() {
///     global_viewer_tick(&SD_VIEWER);
/// }
/// ```
pub fn global_viewer_tick<L: ByteTransfer, P: PixelSink>(
    global_viewer: &'static Mutex<RefCell<Option<SdImageViewer<L, P>>>>,
) {
    critical_section::with(|cs| {
        if let Some(viewer) = global_viewer.borrow(cs).borrow_mut().as_mut() {
            viewer.tick();
        }
    });
}

/// Snapshots the global pipeline's status from the main thread.
///
/// Returns `None` until the slot has been set up.
pub fn global_viewer_status<L: ByteTransfer, P: PixelSink>(
    global_viewer: &'static Mutex<RefCell<Option<SdImageViewer<L, P>>>>,
) -> Option<Status> {
    critical_section::with(|cs| {
        global_viewer
            .borrow(cs)
            .borrow()
            .as_ref()
            .map(|viewer| viewer.status())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::VecStore;
    use crate::testlink::{FakeCard, FakeLink};

    static VIEWER: Mutex<RefCell<Option<SdImageViewer<FakeLink, VecStore>>>> =
        global_viewer_init::<FakeLink, VecStore>();

    #[test]
    fn test_global_singleton_setup_and_tick() {
        assert!(global_viewer_status(&VIEWER).is_none());

        let config = CardConfig {
            powerup_ticks: 2,
            ..CardConfig::default()
        };
        global_viewer_setup(&VIEWER, FakeLink::new(FakeCard::new()), VecStore::new(), config);

        for _ in 0..500 {
            global_viewer_tick(&VIEWER);
        }

        let status = global_viewer_status(&VIEWER).expect("viewer was set up");
        assert!(status.initialized);
        assert!(!status.load_done);
    }
}
