use crate::card::CardError;
use crate::decoder::LoadError;
use crate::spi::ByteTransfer;
use crate::store::PixelSink;
use crate::viewer::SdImageViewer;
use embedded_hal::delay::DelayNs;

/// Runs a blocking tick loop until the storage device initializes.
///
/// For environments without interrupts: drives the pipeline's timing
/// using a delay provider implementing
/// `embedded_hal::delay::DelayNs`.
///
/// # Arguments
/// - `viewer`: the composed pipeline.
/// - `delay`: a delay provider, typically from the HAL.
/// - `tick_us`: the delay between ticks, in microseconds.
///
/// # Returns
/// `Ok(())` once the handshake completes, or the protocol fault that
/// stopped it.
pub fn run_init_loop<D, L, P>(
    viewer: &mut SdImageViewer<L, P>,
    delay: &mut D,
    tick_us: u32,
) -> Result<(), CardError>
where
    D: DelayNs,
    L: ByteTransfer,
    P: PixelSink,
{
    loop {
        viewer.tick();
        if viewer.card.is_initialized() {
            return Ok(());
        }
        if let Some(fault) = viewer.card.fault() {
            return Err(fault);
        }
        delay.delay_us(tick_us);
    }
}

/// Runs a blocking tick loop until the pending load completes or fails.
///
/// Call after [`load()`](SdImageViewer::load) has been accepted; with no
/// load in flight this loop never returns.
///
/// # Arguments
/// - `viewer`: the composed pipeline.
/// - `delay`: a delay provider, typically from the HAL.
/// - `tick_us`: the delay between ticks, in microseconds.
pub fn run_load_loop<D, L, P>(
    viewer: &mut SdImageViewer<L, P>,
    delay: &mut D,
    tick_us: u32,
) -> Result<(), LoadError>
where
    D: DelayNs,
    L: ByteTransfer,
    P: PixelSink,
{
    loop {
        viewer.tick();
        match viewer.poll_done() {
            Ok(()) => return Ok(()),
            Err(nb::Error::Other(error)) => return Err(error),
            Err(nb::Error::WouldBlock) => {}
        }
        delay.delay_us(tick_us);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::CardConfig;
    use crate::store::VecStore;
    use crate::testlink::{FakeCard, FakeLink};
    use embedded_hal_mock::eh1::delay::NoopDelay;

    #[test]
    fn test_blocking_loops_initialize_and_load() {
        let mut fake = FakeCard::new();
        fake.image = vec![2, 0, 1, 0, 8, 0, 0, 0, 0x30, 0x40];
        let config = CardConfig {
            powerup_ticks: 2,
            ..CardConfig::default()
        };
        let mut viewer = SdImageViewer::new(FakeLink::new(fake), VecStore::new(), config);
        let mut delay = NoopDelay::new();

        assert_eq!(run_init_loop(&mut viewer, &mut delay, 1), Ok(()));
        assert!(viewer.load(0));
        assert_eq!(run_load_loop(&mut viewer, &mut delay, 1), Ok(()));
        assert_eq!(viewer.sink.get(0), Some(0x333));
        assert_eq!(viewer.sink.get(1), Some(0x444));
    }

    #[test]
    fn test_init_loop_reports_fault() {
        let mut fake = FakeCard::new();
        fake.silent = true;
        let config = CardConfig {
            powerup_ticks: 2,
            max_response_polls: 8,
            ..CardConfig::default()
        };
        let mut viewer = SdImageViewer::new(FakeLink::new(fake), VecStore::new(), config);
        let mut delay = NoopDelay::new();

        assert_eq!(
            run_init_loop(&mut viewer, &mut delay, 1),
            Err(CardError::Stalled)
        );
    }
}
