//! Single-flight capture queue.
//!
//! Requests are served strictly one at a time in arrival order by a single
//! worker task. Each request gets its own reply channel, so a failing or
//! timed out capture never affects the ones behind it.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::sync::{mpsc, oneshot};
use tracing::Instrument;

use super::{
    capture::{check_target, run_capture, CaptureTarget, ViewportCapture},
    PreviewError, PreviewOptions,
};
use crate::images::EncodedImage;

pub const DEFAULT_CAPTURE_TIMEOUT: Duration = Duration::from_secs(15);

type CaptureReply = oneshot::Sender<Result<EncodedImage, PreviewError>>;

struct CaptureJob {
    id: u64,
    target: Arc<dyn CaptureTarget>,
    options: PreviewOptions,
    reply: CaptureReply,
}

#[derive(Clone)]
pub struct CaptureQueue {
    tx: mpsc::UnboundedSender<CaptureJob>,
    next_id: Arc<AtomicU64>,
}

impl CaptureQueue {
    /// Starts the worker. Must be called from within a tokio runtime.
    pub fn spawn(capture: Arc<dyn ViewportCapture>, timeout: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(rx, capture, timeout));

        Self {
            tx,
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Queues a capture of `target` and waits for its result.
    ///
    /// A detached target or one without a drawable box is rejected here,
    /// without ever reaching the capture primitive.
    pub async fn submit(
        &self,
        target: Arc<dyn CaptureTarget>,
        options: PreviewOptions,
    ) -> Result<EncodedImage, PreviewError> {
        check_target(target.as_ref()).await?;

        let (reply, rx) = oneshot::channel();
        let job = CaptureJob {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            target,
            options,
            reply,
        };

        self.tx.send(job).map_err(|_| PreviewError::QueueClosed)?;
        rx.await.map_err(|_| PreviewError::QueueClosed)?
    }
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<CaptureJob>,
    capture: Arc<dyn ViewportCapture>,
    timeout: Duration,
) {
    while let Some(job) = rx.recv().await {
        let span = tracing::debug_span!("capture", id = job.id);

        let result = async {
            log::debug!("capture {} started", job.id);
            match tokio::time::timeout(timeout, run_capture(capture.as_ref(), job.target.as_ref(), job.options)).await {
                Ok(result) => result,
                Err(_) => Err(PreviewError::Timeout(timeout)),
            }
        }
        .instrument(span)
        .await;

        if let Err(err) = &result {
            log::debug!("capture {} failed while {}: {err}", job.id, err.stage());
        }

        // the caller may have given up waiting
        let _ = job.reply.send(result);
    }

    log::debug!("capture queue closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::{PreviewFormat, Rect};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct FakeCapture {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        hang_on_first: bool,
    }

    impl FakeCapture {
        fn new(hang_on_first: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                hang_on_first,
            })
        }
    }

    #[async_trait]
    impl ViewportCapture for FakeCapture {
        async fn capture_visible_viewport(&self) -> anyhow::Result<Vec<u8>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if self.hang_on_first && call == 0 {
                std::future::pending::<()>().await;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            // call number is encoded as the image width
            let img = image::RgbaImage::from_pixel(100 + call as u32, 50, image::Rgba([0, 0, 0, 255]));
            let mut buf = Vec::new();
            img.write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)?;
            Ok(buf)
        }

        async fn device_pixel_ratio(&self) -> f64 {
            1.0
        }
    }

    struct FakeTarget {
        attached: bool,
        rect: Rect,
    }

    #[async_trait]
    impl CaptureTarget for FakeTarget {
        async fn is_attached(&self) -> bool {
            self.attached
        }

        async fn bounding_rect(&self) -> Option<Rect> {
            Some(self.rect)
        }
    }

    fn target(attached: bool, width: f64) -> Arc<dyn CaptureTarget> {
        Arc::new(FakeTarget {
            attached,
            rect: Rect {
                left: 0.0,
                top: 0.0,
                width,
                height: 50.0,
            },
        })
    }

    fn png_options() -> PreviewOptions {
        PreviewOptions {
            format: PreviewFormat::Png,
            ..Default::default()
        }
    }

    fn width_of(image: &EncodedImage) -> u32 {
        crate::images::decode(&image.bytes).unwrap().width()
    }

    #[tokio::test]
    async fn test_requests_complete_in_arrival_order() {
        let capture = FakeCapture::new(false);
        let queue = CaptureQueue::spawn(capture.clone(), DEFAULT_CAPTURE_TIMEOUT);

        let (a, b, c) = tokio::join!(
            queue.submit(target(true, 1000.0), png_options()),
            queue.submit(target(true, 1000.0), png_options()),
            queue.submit(target(true, 1000.0), png_options()),
        );

        let widths = vec![width_of(&a.unwrap()), width_of(&b.unwrap()), width_of(&c.unwrap())];
        assert_eq!(widths, vec![100, 101, 102]);
        assert_eq!(capture.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_detached_target_never_reaches_capture() {
        let capture = FakeCapture::new(false);
        let queue = CaptureQueue::spawn(capture.clone(), DEFAULT_CAPTURE_TIMEOUT);

        let err = queue.submit(target(false, 100.0), png_options()).await.unwrap_err();
        assert!(matches!(err, PreviewError::Detached));

        let err = queue.submit(target(true, 0.0), png_options()).await.unwrap_err();
        assert!(matches!(err, PreviewError::InvalidRect(_)));

        assert_eq!(capture.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_timeout_moves_on_to_next_request() {
        let capture = FakeCapture::new(true);
        let queue = CaptureQueue::spawn(capture.clone(), Duration::from_millis(100));

        let (first, second) = tokio::join!(
            queue.submit(target(true, 1000.0), png_options()),
            queue.submit(target(true, 1000.0), png_options()),
        );

        assert!(matches!(first.unwrap_err(), PreviewError::Timeout(_)));
        assert_eq!(width_of(&second.unwrap()), 101);
    }

    #[tokio::test]
    async fn test_dropped_caller_does_not_stop_worker() {
        let capture = FakeCapture::new(false);
        let queue = CaptureQueue::spawn(capture.clone(), DEFAULT_CAPTURE_TIMEOUT);

        let abandoned = tokio::time::timeout(
            Duration::from_millis(1),
            queue.submit(target(true, 1000.0), png_options()),
        )
        .await;
        drop(abandoned);

        assert!(queue.submit(target(true, 1000.0), png_options()).await.is_ok());
    }
}
