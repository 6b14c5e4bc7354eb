//! In-memory display used in desktop mode and by the tests.
//!
//! Every frame that reaches `show()` is recorded, along with how many
//! handles and `show()` calls were alive at the same time.

use super::{DetectionError, Display, DisplayError, DisplayProvider, PanelInfo};
use crate::image_proc::IndexedImage;
use crate::models::ColourPalette;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Default)]
struct Recorded {
    frames: Mutex<Vec<IndexedImage>>,
    border: Mutex<Option<u8>>,
    shows: AtomicUsize,
    in_show: AtomicUsize,
    max_in_show: AtomicUsize,
    open_handles: AtomicUsize,
    max_open_handles: AtomicUsize,
    fail_show: AtomicBool,
    fail_set_image: AtomicBool,
    show_delay: Mutex<Option<Duration>>,
}

/// Shared view of everything the mock panels did
#[derive(Debug, Clone, Default)]
pub struct MockRecorder {
    inner: Arc<Recorded>,
}

// Inspection helpers for tests
#[allow(dead_code)]
impl MockRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> Vec<IndexedImage> {
        self.inner.frames.lock().clone()
    }

    pub fn last_frame(&self) -> Option<IndexedImage> {
        self.inner.frames.lock().last().cloned()
    }

    pub fn show_count(&self) -> usize {
        self.inner.shows.load(Ordering::SeqCst)
    }

    /// Highest number of `show()` calls that overlapped
    pub fn max_concurrent_shows(&self) -> usize {
        self.inner.max_in_show.load(Ordering::SeqCst)
    }

    pub fn open_handles(&self) -> usize {
        self.inner.open_handles.load(Ordering::SeqCst)
    }

    /// Highest number of panel handles alive at once
    pub fn max_open_handles(&self) -> usize {
        self.inner.max_open_handles.load(Ordering::SeqCst)
    }

    pub fn border(&self) -> Option<u8> {
        *self.inner.border.lock()
    }

    /// Make every subsequent `show()` take `delay` instead of 5ms
    pub fn slow_show(&self, delay: Duration) {
        *self.inner.show_delay.lock() = Some(delay);
    }

    /// Make every subsequent `show()` fail
    pub fn fail_show(&self, fail: bool) {
        self.inner.fail_show.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `set_image()` fail
    pub fn fail_set_image(&self, fail: bool) {
        self.inner.fail_set_image.store(fail, Ordering::SeqCst);
    }
}

/// Mock panel handle
pub struct MockDisplay {
    panel: PanelInfo,
    staged: Option<IndexedImage>,
    recorder: MockRecorder,
}

impl MockDisplay {
    fn new(panel: PanelInfo, recorder: MockRecorder) -> Self {
        let open = recorder.inner.open_handles.fetch_add(1, Ordering::SeqCst) + 1;
        recorder
            .inner
            .max_open_handles
            .fetch_max(open, Ordering::SeqCst);

        Self {
            panel,
            staged: None,
            recorder,
        }
    }
}

impl Display for MockDisplay {
    fn resolution(&self) -> (u32, u32) {
        self.panel.display_type.resolution()
    }

    fn colour(&self) -> ColourPalette {
        self.panel
            .display_type
            .native_palette()
            .unwrap_or(self.panel.colour_palette)
    }

    fn set_border(&mut self, border: u8) {
        *self.recorder.inner.border.lock() = Some(border);
    }

    fn set_image(&mut self, image: &IndexedImage) -> Result<(), DisplayError> {
        if self.recorder.inner.fail_set_image.load(Ordering::SeqCst) {
            return Err(DisplayError::Io("simulated transfer failure".into()));
        }
        let expected = self.resolution();
        if image.dimensions() != expected {
            return Err(DisplayError::ResolutionMismatch {
                expected,
                actual: image.dimensions(),
            });
        }
        self.staged = Some(image.clone());
        Ok(())
    }

    fn show(&mut self) -> Result<(), DisplayError> {
        let inner = &self.recorder.inner;
        if inner.fail_show.load(Ordering::SeqCst) {
            return Err(DisplayError::Io("simulated refresh failure".into()));
        }
        let frame = self.staged.clone().ok_or(DisplayError::NoImage)?;

        let overlapping = inner.in_show.fetch_add(1, Ordering::SeqCst) + 1;
        inner.max_in_show.fetch_max(overlapping, Ordering::SeqCst);
        // long enough for an overlapping refresh to be observed
        let delay = inner.show_delay.lock().unwrap_or(Duration::from_millis(5));
        thread::sleep(delay);
        inner.frames.lock().push(frame);
        inner.shows.fetch_add(1, Ordering::SeqCst);
        inner.in_show.fetch_sub(1, Ordering::SeqCst);

        tracing::info!(
            "Running in a desktop environment, frame {} kept in memory",
            inner.shows.load(Ordering::SeqCst)
        );
        Ok(())
    }
}

impl Drop for MockDisplay {
    fn drop(&mut self) {
        self.recorder
            .inner
            .open_handles
            .fetch_sub(1, Ordering::SeqCst);
    }
}

/// Provider handing out [`MockDisplay`] panels
pub struct MockProvider {
    recorder: MockRecorder,
    detected: Result<Option<PanelInfo>, DetectionError>,
}

impl MockProvider {
    /// A provider that detects nothing
    pub fn new(recorder: MockRecorder) -> Self {
        Self {
            recorder,
            detected: Ok(None),
        }
    }

    #[allow(dead_code)]
    pub fn with_detected(mut self, detected: Result<Option<PanelInfo>, DetectionError>) -> Self {
        self.detected = detected;
        self
    }
}

impl DisplayProvider for MockProvider {
    fn detect(&self) -> Result<Option<PanelInfo>, DetectionError> {
        self.detected.clone()
    }

    fn open(&self, panel: &PanelInfo) -> Result<Box<dyn Display>, DisplayError> {
        Ok(Box::new(MockDisplay::new(*panel, self.recorder.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_proc::construct_palette;
    use crate::models::DisplayType;

    fn phat() -> PanelInfo {
        PanelInfo {
            display_type: DisplayType::Phat104,
            colour_palette: ColourPalette::Yellow,
        }
    }

    #[test]
    fn records_shown_frames() {
        let recorder = MockRecorder::new();
        let provider = MockProvider::new(recorder.clone());
        let mut display = provider.open(&phat()).unwrap();
        let palette = construct_palette(DisplayType::Phat104, display.colour());

        display
            .set_image(&IndexedImage::filled(212, 104, 2, palette))
            .unwrap();
        display.show().unwrap();

        assert_eq!(display.colour(), ColourPalette::Yellow);
        assert_eq!(recorder.show_count(), 1);
        assert_eq!(recorder.last_frame().unwrap().get(0, 0), 2);
        assert_eq!(recorder.max_concurrent_shows(), 1);
    }

    #[test]
    fn show_without_image_fails() {
        let provider = MockProvider::new(MockRecorder::new());
        let mut display = provider.open(&phat()).unwrap();

        assert!(matches!(display.show(), Err(DisplayError::NoImage)));
    }

    #[test]
    fn wrong_size_is_rejected() {
        let provider = MockProvider::new(MockRecorder::new());
        let mut display = provider.open(&phat()).unwrap();
        let palette = construct_palette(DisplayType::Phat104, ColourPalette::Yellow);

        let result = display.set_image(&IndexedImage::filled(10, 10, 0, palette));
        assert!(matches!(result, Err(DisplayError::ResolutionMismatch { .. })));
    }

    #[test]
    fn handles_are_counted_until_dropped() {
        let recorder = MockRecorder::new();
        let provider = MockProvider::new(recorder.clone());

        let first = provider.open(&phat()).unwrap();
        let second = provider.open(&phat()).unwrap();
        assert_eq!(recorder.open_handles(), 2);

        drop(first);
        drop(second);
        assert_eq!(recorder.open_handles(), 0);
        assert_eq!(recorder.max_open_handles(), 2);
    }
}
