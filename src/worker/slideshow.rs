//! Slideshow worker: cycles through the stored images.

use super::{DisplayArbiter, Job, Worker, WorkerError, WorkerKind, WorkerState};
use crate::display::DisplayProvider;
use crate::image_proc::base64_to_image;
use crate::models::{DisplaySettings, SlideshowConfiguration};
use async_trait::async_trait;
use image::DynamicImage;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Cyclic cursor over base64 encoded images
pub struct SlideshowJob {
    images: Vec<String>,
    next_image_index: usize,
    change_delay: Duration,
}

impl SlideshowJob {
    pub fn new(images: Vec<String>, change_delay: Duration) -> Self {
        Self {
            images,
            next_image_index: 0,
            change_delay,
        }
    }

    pub fn from_configuration(configuration: &SlideshowConfiguration) -> Self {
        Self::new(
            configuration.images.clone(),
            Duration::from_secs(configuration.change_delay),
        )
    }

    #[allow(dead_code)]
    pub fn next_image_index(&self) -> usize {
        self.next_image_index
    }
}

#[async_trait]
impl Job for SlideshowJob {
    async fn next_image(&mut self) -> Result<Option<DynamicImage>, WorkerError> {
        if self.images.is_empty() {
            return Ok(None);
        }

        let index = self.next_image_index;
        // advance before decoding so a broken image is skipped next time
        self.next_image_index = (index + 1) % self.images.len();
        tracing::debug!("Slideshow image {} of {}", index + 1, self.images.len());

        let encoded = self.images[index].clone();
        let image = tokio::task::spawn_blocking(move || base64_to_image(&encoded)).await??;
        Ok(Some(image))
    }

    fn delay(&self) -> Duration {
        self.change_delay
    }
}

pub struct SlideshowWorker {
    worker: Worker,
}

impl SlideshowWorker {
    pub fn new(
        provider: Arc<dyn DisplayProvider>,
        arbiter: Arc<DisplayArbiter>,
        debug_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            worker: Worker::new(WorkerKind::Slideshow, provider, arbiter, debug_dir),
        }
    }

    /// (Re)start from the first image
    pub async fn start_slideshow(
        &mut self,
        configuration: &SlideshowConfiguration,
        settings: &DisplaySettings,
    ) -> Result<(), WorkerError> {
        tracing::info!(
            "Starting slideshow with {} images, changing every {}s",
            configuration.images.len(),
            configuration.change_delay
        );
        let job = SlideshowJob::from_configuration(configuration);
        self.worker.start(Box::new(job), settings).await
    }

    pub async fn stop(&mut self) {
        self.worker.stop().await;
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    #[allow(dead_code)]
    pub fn state(&self) -> WorkerState {
        self.worker.state()
    }

    #[allow(dead_code)]
    pub fn get_current_image_in_base64(&self) -> Option<String> {
        self.worker.get_current_image_in_base64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::{MockProvider, MockRecorder};
    use crate::image_proc::codec::image_to_base64;
    use crate::worker::test_support::wait_for;
    use image::{Rgb, RgbImage};

    fn solid(colour: [u8; 3]) -> String {
        let img = RgbImage::from_pixel(212, 104, Rgb(colour));
        image_to_base64(&DynamicImage::ImageRgb8(img)).unwrap()
    }

    #[tokio::test]
    async fn cursor_wraps_around() {
        let mut job = SlideshowJob::new(
            vec![solid([255, 255, 255]), solid([0, 0, 0])],
            Duration::from_millis(1),
        );

        job.next_image().await.unwrap();
        job.next_image().await.unwrap();
        assert_eq!(job.next_image_index(), 0);
    }

    #[tokio::test]
    async fn broken_image_still_advances() {
        let mut job = SlideshowJob::new(
            vec!["not an image".into(), solid([0, 0, 0])],
            Duration::from_millis(1),
        );

        assert!(job.next_image().await.is_err());
        assert_eq!(job.next_image_index(), 1);
        assert!(job.next_image().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn empty_slideshow_has_nothing_to_show() {
        let mut job = SlideshowJob::new(Vec::new(), Duration::from_millis(1));
        assert!(job.next_image().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn shows_images_cyclically() {
        let recorder = MockRecorder::new();
        let mut worker = SlideshowWorker::new(
            Arc::new(MockProvider::new(recorder.clone())),
            Arc::new(DisplayArbiter::new()),
            None,
        );
        let images = vec![solid([255, 255, 255]), solid([0, 0, 0]), solid([255, 0, 0])];
        let n = images.len();
        let job = SlideshowJob::new(images, Duration::from_millis(10));

        worker
            .worker
            .start(Box::new(job), &DisplaySettings::default())
            .await
            .unwrap();
        assert!(wait_for(|| recorder.show_count() > n).await);
        worker.stop().await;

        let frames = recorder.frames();
        assert_eq!(frames[n], frames[0]);
        assert_ne!(frames[1], frames[0]);
        assert_eq!(frames[0].get(0, 0), 0);
        assert_eq!(frames[1].get(0, 0), 1);
        assert_eq!(frames[2].get(0, 0), 2);
    }

    #[tokio::test]
    async fn restart_begins_at_first_image() {
        let recorder = MockRecorder::new();
        let mut worker = SlideshowWorker::new(
            Arc::new(MockProvider::new(recorder.clone())),
            Arc::new(DisplayArbiter::new()),
            None,
        );
        let configuration = SlideshowConfiguration {
            change_delay: 3600,
            images: vec![solid([0, 0, 0]), solid([255, 255, 255])],
        };
        let settings = DisplaySettings::default();

        worker.start_slideshow(&configuration, &settings).await.unwrap();
        assert!(wait_for(|| recorder.show_count() == 1).await);
        worker.start_slideshow(&configuration, &settings).await.unwrap();
        assert!(wait_for(|| recorder.show_count() == 2).await);
        worker.stop().await;

        let frames = recorder.frames();
        assert_eq!(frames[0], frames[1]);
        assert_eq!(frames[1].get(0, 0), 1);
        assert!(worker.get_current_image_in_base64().is_some());
        assert_eq!(worker.state(), WorkerState::Stopped);
    }
}
