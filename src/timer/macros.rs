/// Declares a static global `SD_VIEWER` pipeline protected by a
/// `critical_section` mutex.
///
/// Creates a `static` singleton suitable for interrupt-based
/// environments, where both the main thread and a timer ISR need safe
/// access to the shared pipeline.
///
/// # Arguments
/// - `$link`: the concrete byte-transfer type (implements
///   [`ByteTransfer`](crate::spi::ByteTransfer))
/// - `$sink`: the concrete pixel-store type (implements
///   [`PixelSink`](crate::store::PixelSink))
///
/// # Example
/// ```rust,ignore
/// sdview::init_sd_viewer!(MyLinkType, MyStoreType);
/// ```
#[macro_export]
macro_rules! init_sd_viewer {
    ( $link:ty, $sink:ty ) => {
        pub static SD_VIEWER: $crate::critical_section::Mutex<
            core::cell::RefCell<Option<$crate::viewer::SdImageViewer<$link, $sink>>>,
        > = $crate::critical_section::Mutex::new(core::cell::RefCell::new(None));
    };
}

/// Initializes the global `SD_VIEWER` singleton with a composed pipeline.
///
/// Requires `init_sd_viewer!` to have been used earlier in the same
/// scope.
///
/// # Arguments
/// - `$link`: the byte-transfer engine value
/// - `$sink`: the pixel-store value
/// - `$config`: a [`CardConfig`](crate::card::CardConfig)
///
/// # Example
/// ```rust,ignore
/// fn main() {
///     sdview::setup_sd_viewer!(link, store, CardConfig::default());
/// }
/// ```
#[macro_export]
macro_rules! setup_sd_viewer {
    ( $link:expr, $sink:expr, $config:expr ) => {
        $crate::critical_section::with(|cs| {
            let _ = SD_VIEWER
                .borrow(cs)
                .replace(Some($crate::viewer::SdImageViewer::new(
                    $link, $sink, $config,
                )));
        });
    };
}

/// Calls `tick()` on the global `SD_VIEWER` if it has been initialized.
///
/// Intended to be invoked from a timer ISR to advance the pipeline at
/// regular intervals. Silently does nothing if the pipeline has not been
/// set up yet.
///
/// # Example
/// ```rust,ignore
/// #[interrupt]
/// fn TIM2() {
///     sdview::tick_sd_viewer!();
/// }
/// ```
#[macro_export]
macro_rules! tick_sd_viewer {
    () => {
        $crate::critical_section::with(|cs| {
            if let Some(viewer) = SD_VIEWER.borrow(cs).borrow_mut().as_mut() {
                viewer.tick();
            }
        });
    };
}
