use std::collections::HashMap;
use std::sync::Arc;

use image::DynamicImage;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::config::RecognitionConfig;
use crate::error::RecognitionError;
use crate::recognition::{TextRecognizer, normalize_text};

/// Identifies a cell across every table of one source image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    pub table: usize,
    pub row: usize,
    pub col: usize,
}

pub struct RecognitionRequest {
    pub key: CellKey,
    pub image: DynamicImage,
}

/// Sends cell crops to a recognizer with bounded concurrency, a timeout per
/// attempt and a small number of retries for transient failures.
///
/// Results are keyed by [`CellKey`], so callers reassemble tables without
/// depending on completion order. The concurrency limit is shared by every
/// `run` on the same dispatcher.
pub struct Dispatcher {
    recognizer: Arc<dyn TextRecognizer>,
    config: RecognitionConfig,
    semaphore: Arc<Semaphore>,
}

impl Dispatcher {
    pub fn new(recognizer: Arc<dyn TextRecognizer>, config: RecognitionConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
        Self {
            recognizer,
            config,
            semaphore,
        }
    }

    pub async fn run(
        &self,
        requests: Vec<RecognitionRequest>,
    ) -> HashMap<CellKey, Result<String, RecognitionError>> {
        let mut tasks = JoinSet::new();
        let mut results = HashMap::with_capacity(requests.len());

        debug!(
            backend = self.recognizer.name(),
            requests = requests.len(),
            max_concurrency = self.config.max_concurrency,
            "dispatching cells for recognition"
        );

        for request in requests {
            let semaphore = self.semaphore.clone();
            let recognizer = self.recognizer.clone();
            let config = self.config.clone();
            tasks.spawn(async move {
                let outcome = recognize_with_retry(recognizer, semaphore, Arc::new(request.image), &config).await;
                (request.key, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((key, outcome)) => {
                    results.insert(key, outcome);
                }
                // A panicking task loses its key; the caller marks missing cells unresolved
                Err(e) => warn!(error = %e, "recognition task failed to complete"),
            }
        }
        results
    }
}

/// Each attempt holds a permit for as long as the backend call runs, not
/// just until its deadline. A call abandoned after a timeout keeps its slot
/// until it returns, so the retry waits for capacity instead of stacking a
/// second call on the service.
async fn recognize_with_retry(
    recognizer: Arc<dyn TextRecognizer>,
    semaphore: Arc<Semaphore>,
    image: Arc<DynamicImage>,
    config: &RecognitionConfig,
) -> Result<String, RecognitionError> {
    let timeout = config.timeout();
    let mut attempt = 0;
    loop {
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| RecognitionError::Engine(e.to_string()))?;
        let call = {
            let recognizer = recognizer.clone();
            let image = image.clone();
            tokio::task::spawn_blocking(move || {
                let result = recognizer.recognize(&image);
                drop(permit);
                result
            })
        };
        let outcome = match tokio::time::timeout(timeout, call).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(RecognitionError::Engine(join_err.to_string())),
            Err(_) => Err(RecognitionError::Timeout(timeout)),
        };

        match outcome {
            Ok(text) => return Ok(normalize_text(&text)),
            Err(e) if e.is_transient() && attempt < config.max_retries => {
                attempt += 1;
                warn!(error = %e, attempt, "retrying cell recognition");
                tokio::time::sleep(config.backoff(attempt)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Echoes the image width, failing transiently the first `flaky` calls
    struct WidthReader {
        flaky: AtomicUsize,
        calls: AtomicUsize,
        active: AtomicUsize,
        peak: Mutex<usize>,
        delay: Duration,
    }

    impl WidthReader {
        fn new(flaky: usize, delay: Duration) -> Self {
            Self {
                flaky: AtomicUsize::new(flaky),
                calls: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                peak: Mutex::new(0),
                delay,
            }
        }
    }

    impl TextRecognizer for WidthReader {
        fn recognize(&self, image: &DynamicImage) -> Result<String, RecognitionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            {
                let mut peak = self.peak.lock().unwrap();
                *peak = (*peak).max(now);
            }
            std::thread::sleep(self.delay);
            self.active.fetch_sub(1, Ordering::SeqCst);

            if self
                .flaky
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(RecognitionError::Transient("503".into()));
            }
            Ok(format!("{}\n", image.width()))
        }

        fn name(&self) -> &str {
            "width"
        }
    }

    struct Broken;

    impl TextRecognizer for Broken {
        fn recognize(&self, _: &DynamicImage) -> Result<String, RecognitionError> {
            Err(RecognitionError::Service("invalid api key".into()))
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    fn requests(n: usize) -> Vec<RecognitionRequest> {
        (0..n)
            .map(|i| RecognitionRequest {
                key: CellKey { table: 0, row: i, col: 1 },
                image: DynamicImage::ImageLuma8(GrayImage::new(10 + i as u32, 5)),
            })
            .collect()
    }

    fn fast_config() -> RecognitionConfig {
        RecognitionConfig {
            max_concurrency: 2,
            timeout_ms: 2_000,
            max_retries: 2,
            retry_backoff_ms: 1,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn results_are_keyed_and_normalized() {
        let reader = Arc::new(WidthReader::new(0, Duration::from_millis(5)));
        let dispatcher = Dispatcher::new(reader.clone(), fast_config());

        let results = dispatcher.run(requests(6)).await;
        assert_eq!(results.len(), 6);
        for i in 0..6 {
            let key = CellKey { table: 0, row: i, col: 1 };
            assert_eq!(results[&key].as_deref().unwrap(), (10 + i).to_string());
        }
        assert!(*reader.peak.lock().unwrap() <= 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn transient_failures_are_retried() {
        let reader = Arc::new(WidthReader::new(2, Duration::ZERO));
        let dispatcher = Dispatcher::new(reader.clone(), fast_config());

        let results = dispatcher.run(requests(1)).await;
        let key = CellKey { table: 0, row: 0, col: 1 };
        assert_eq!(results[&key].as_deref().unwrap(), "10");
        assert_eq!(reader.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn retries_are_bounded() {
        let reader = Arc::new(WidthReader::new(10, Duration::ZERO));
        let dispatcher = Dispatcher::new(reader.clone(), fast_config());

        let results = dispatcher.run(requests(1)).await;
        let key = CellKey { table: 0, row: 0, col: 1 };
        assert!(matches!(results[&key], Err(RecognitionError::Transient(_))));
        assert_eq!(reader.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn service_errors_are_not_retried() {
        let dispatcher = Dispatcher::new(Arc::new(Broken), fast_config());
        let results = dispatcher.run(requests(3)).await;
        assert_eq!(results.len(), 3);
        assert!(results.values().all(|r| matches!(r, Err(RecognitionError::Service(_)))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn slow_calls_time_out() {
        let reader = Arc::new(WidthReader::new(0, Duration::from_millis(300)));
        let config = RecognitionConfig {
            timeout_ms: 20,
            max_retries: 0,
            ..fast_config()
        };
        let results = Dispatcher::new(reader, config).run(requests(1)).await;
        let key = CellKey { table: 0, row: 0, col: 1 };
        assert!(matches!(results[&key], Err(RecognitionError::Timeout(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn timed_out_calls_keep_their_slot() {
        let reader = Arc::new(WidthReader::new(0, Duration::from_millis(100)));
        let config = RecognitionConfig {
            max_concurrency: 1,
            timeout_ms: 30,
            max_retries: 2,
            retry_backoff_ms: 1,
        };
        let results = Dispatcher::new(reader.clone(), config).run(requests(3)).await;

        assert_eq!(results.len(), 3);
        assert!(results.values().all(|r| matches!(r, Err(RecognitionError::Timeout(_)))));
        // Let the last abandoned call finish
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(*reader.peak.lock().unwrap(), 1);
        assert_eq!(reader.calls.load(Ordering::SeqCst), 9);
    }
}
