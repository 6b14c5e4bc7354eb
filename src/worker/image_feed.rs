//! Image feed worker: polls a URL and shows the image whenever it changes.

use super::{DisplayArbiter, Job, Worker, WorkerError, WorkerKind, WorkerState};
use crate::display::DisplayProvider;
use crate::image_proc::{decode_image, fetch_bytes};
use crate::models::{DisplaySettings, ImageFeedConfiguration};
use async_trait::async_trait;
use image::DynamicImage;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub struct ImageFeedJob {
    url: String,
    polling_interval: Duration,
    timeout: Duration,
    last_fetched: Option<DynamicImage>,
}

impl ImageFeedJob {
    pub fn new(url: impl Into<String>, polling_interval: Duration, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            polling_interval,
            timeout,
            last_fetched: None,
        }
    }

    async fn fetch(&self) -> Result<DynamicImage, WorkerError> {
        let bytes = fetch_bytes(&self.url, self.timeout).await?;
        let image = tokio::task::spawn_blocking(move || decode_image(&bytes)).await??;
        Ok(image)
    }
}

fn same_content(a: &DynamicImage, b: &DynamicImage) -> bool {
    a.width() == b.width()
        && a.height() == b.height()
        && a.color() == b.color()
        && a.as_bytes() == b.as_bytes()
}

#[async_trait]
impl Job for ImageFeedJob {
    async fn next_image(&mut self) -> Result<Option<DynamicImage>, WorkerError> {
        let image = self.fetch().await?;

        if self
            .last_fetched
            .as_ref()
            .is_some_and(|last| same_content(last, &image))
        {
            tracing::debug!("Image feed unchanged, skipping display update");
            return Ok(None);
        }

        tracing::info!("New image from feed ({}x{})", image.width(), image.height());
        self.last_fetched = Some(image.clone());
        Ok(Some(image))
    }

    fn delay(&self) -> Duration {
        self.polling_interval
    }

    fn render_failed(&mut self) {
        // show the same content again on the next poll
        self.last_fetched = None;
    }
}

pub struct ImageFeedWorker {
    worker: Worker,
    timeout: Duration,
}

impl ImageFeedWorker {
    /// `timeout` bounds each feed request
    pub fn new(
        provider: Arc<dyn DisplayProvider>,
        arbiter: Arc<DisplayArbiter>,
        debug_dir: Option<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            worker: Worker::new(WorkerKind::ImageFeed, provider, arbiter, debug_dir),
            timeout,
        }
    }

    pub async fn start_image_feed(
        &mut self,
        configuration: &ImageFeedConfiguration,
        settings: &DisplaySettings,
    ) -> Result<(), WorkerError> {
        tracing::info!(
            "Starting image feed from {}, polling every {}s",
            configuration.image_feed_url,
            configuration.polling_interval
        );
        let job = ImageFeedJob::new(
            configuration.image_feed_url.clone(),
            Duration::from_secs(configuration.polling_interval),
            self.timeout,
        );
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
    use crate::image_proc::codec::image_to_png;
    use crate::worker::test_support::wait_for;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;
    use image::{Rgb, RgbImage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn png(colour: [u8; 3]) -> Vec<u8> {
        let img = RgbImage::from_pixel(40, 30, Rgb(colour));
        image_to_png(&DynamicImage::ImageRgb8(img)).unwrap()
    }

    #[derive(Clone)]
    struct Feed {
        frames: Arc<Vec<Vec<u8>>>,
        hits: Arc<AtomicUsize>,
    }

    async fn serve_frame(State(feed): State<Feed>) -> Result<Vec<u8>, StatusCode> {
        let hit = feed.hits.fetch_add(1, Ordering::SeqCst);
        feed.frames
            .get(hit.min(feed.frames.len() - 1))
            .cloned()
            .ok_or(StatusCode::NOT_FOUND)
    }

    /// Serves `frames` in order, repeating the last one
    async fn serve(frames: Vec<Vec<u8>>) -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let feed = Feed {
            frames: Arc::new(frames),
            hits: hits.clone(),
        };
        let router = Router::new()
            .route("/feed.png", get(serve_frame))
            .route("/missing.png", get(|| async { StatusCode::NOT_FOUND }))
            .with_state(feed);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (format!("http://{addr}"), hits)
    }

    #[tokio::test]
    async fn identical_content_is_displayed_once() {
        let (base, hits) = serve(vec![png([0, 0, 0])]).await;
        let recorder = MockRecorder::new();
        let mut job = ImageFeedJob::new(
            format!("{base}/feed.png"),
            Duration::from_millis(20),
            Duration::from_secs(5),
        );
        let mut worker = Worker::new(
            WorkerKind::ImageFeed,
            Arc::new(MockProvider::new(recorder.clone())),
            Arc::new(DisplayArbiter::new()),
            None,
        );

        assert!(job.next_image().await.unwrap().is_some());
        assert!(job.next_image().await.unwrap().is_none());

        worker
            .start(Box::new(job), &DisplaySettings::default())
            .await
            .unwrap();
        assert!(wait_for(|| hits.load(Ordering::SeqCst) >= 4).await);
        worker.stop().await;

        // the job already saw this frame before the worker started
        assert_eq!(recorder.show_count(), 0);
    }

    #[tokio::test]
    async fn feed_worker_renders_only_on_change() {
        let (base, hits) = serve(vec![png([0, 0, 0]), png([0, 0, 0]), png([255, 0, 0])]).await;
        let recorder = MockRecorder::new();
        let mut worker = Worker::new(
            WorkerKind::ImageFeed,
            Arc::new(MockProvider::new(recorder.clone())),
            Arc::new(DisplayArbiter::new()),
            None,
        );
        let job = ImageFeedJob::new(
            format!("{base}/feed.png"),
            Duration::from_millis(20),
            Duration::from_secs(5),
        );

        worker
            .start(Box::new(job), &DisplaySettings::default())
            .await
            .unwrap();
        assert!(wait_for(|| hits.load(Ordering::SeqCst) >= 5).await);
        worker.stop().await;

        let frames = recorder.frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].get(106, 52), 1);
        assert_eq!(frames[1].get(106, 52), 2);
    }

    #[tokio::test]
    async fn content_is_offered_again_after_a_failed_render() {
        let (base, _) = serve(vec![png([0, 0, 0])]).await;
        let mut job = ImageFeedJob::new(
            format!("{base}/feed.png"),
            Duration::from_millis(20),
            Duration::from_secs(5),
        );

        assert!(job.next_image().await.unwrap().is_some());
        job.render_failed();
        assert!(job.next_image().await.unwrap().is_some());
        assert!(job.next_image().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn feed_retries_unchanged_content_until_it_is_shown() {
        let (base, hits) = serve(vec![png([255, 0, 0])]).await;
        let recorder = MockRecorder::new();
        recorder.fail_set_image(true);
        let mut worker = Worker::new(
            WorkerKind::ImageFeed,
            Arc::new(MockProvider::new(recorder.clone())),
            Arc::new(DisplayArbiter::new()),
            None,
        );
        let job = ImageFeedJob::new(
            format!("{base}/feed.png"),
            Duration::from_millis(20),
            Duration::from_secs(5),
        );

        worker
            .start(Box::new(job), &DisplaySettings::default())
            .await
            .unwrap();
        assert!(wait_for(|| hits.load(Ordering::SeqCst) >= 2).await);
        assert_eq!(recorder.show_count(), 0);

        recorder.fail_set_image(false);
        assert!(wait_for(|| recorder.show_count() == 1).await);
        worker.stop().await;

        assert_eq!(recorder.last_frame().unwrap().get(106, 52), 2);
    }

    #[tokio::test]
    async fn failed_fetch_keeps_polling() {
        let (base, _) = serve(vec![png([0, 0, 0])]).await;
        let mut job = ImageFeedJob::new(
            format!("{base}/missing.png"),
            Duration::from_millis(20),
            Duration::from_secs(5),
        );

        assert!(matches!(
            job.next_image().await,
            Err(WorkerError::Download(_))
        ));
        assert!(job.last_fetched.is_none());
    }

    #[tokio::test]
    async fn start_image_feed_uses_configuration() {
        let (base, _) = serve(vec![png([255, 0, 0])]).await;
        let recorder = MockRecorder::new();
        let mut worker = ImageFeedWorker::new(
            Arc::new(MockProvider::new(recorder.clone())),
            Arc::new(DisplayArbiter::new()),
            None,
            Duration::from_secs(5),
        );
        let configuration = ImageFeedConfiguration {
            polling_interval: 60,
            image_feed_url: format!("{base}/feed.png"),
        };

        worker
            .start_image_feed(&configuration, &DisplaySettings::default())
            .await
            .unwrap();
        assert!(wait_for(|| recorder.show_count() == 1).await);
        assert!(worker.is_running());
        worker.stop().await;

        assert!(!worker.is_running());
        assert!(worker.get_current_image_in_base64().is_some());
    }
}
