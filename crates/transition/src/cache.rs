//! URL-keyed image cache with background decoding.
//!
//! Every url is fetched and decoded at most once. Requests are queued to a
//! small pool of loader threads, started on first use; results come back over
//! a channel and are folded into the cache by [`ImageCache::poll`], which the
//! render loop calls each frame. Failures are logged once and remembered so a
//! broken url is never retried.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use image::imageops::flip_vertical_in_place;
use image::RgbaImage;

use crate::assets::{AssetError, ImageSource};

/// Loader threads per cache.
pub const LOADER_THREADS: usize = 4;

/// Stable handle for a decoded image; the renderer maps it to a GPU texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureKey(u32);

impl TextureKey {
    pub fn index(self) -> u32 {
        self.0
    }
}

/// A decoded image and its natural size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadedImage {
    pub key: TextureKey,
    pub width: u32,
    pub height: u32,
}

impl LoadedImage {
    pub fn resolution(&self) -> [f32; 2] {
        [self.width.max(1) as f32, self.height.max(1) as f32]
    }
}

/// Pixels waiting to be uploaded to the GPU. Rows are bottom-up.
#[derive(Debug)]
pub struct DecodedImage {
    pub key: TextureKey,
    pub url: String,
    pub pixels: RgbaImage,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CacheStatus {
    Ready(LoadedImage),
    Loading,
    Failed,
}

impl CacheStatus {
    pub fn is_settled(&self) -> bool {
        !matches!(self, CacheStatus::Loading)
    }
}

struct LoadOutcome {
    url: String,
    result: Result<RgbaImage, AssetError>,
}

pub struct ImageCache {
    source: Arc<dyn ImageSource>,
    entries: HashMap<String, CacheStatus>,
    uploads: Vec<DecodedImage>,
    next_key: u32,
    sender: Sender<LoadOutcome>,
    receiver: Receiver<LoadOutcome>,
    jobs: Option<Sender<String>>,
    workers: Vec<JoinHandle<()>>,
}

impl ImageCache {
    pub fn new(source: Arc<dyn ImageSource>) -> Self {
        let (sender, receiver) = unbounded();
        Self {
            source,
            entries: HashMap::new(),
            uploads: Vec::new(),
            next_key: 0,
            sender,
            receiver,
            jobs: None,
            workers: Vec::new(),
        }
    }

    /// Current status of `url`, starting a load if it was never requested.
    pub fn request(&mut self, url: &str) -> CacheStatus {
        if let Some(status) = self.entries.get(url) {
            return *status;
        }
        self.entries.insert(url.to_string(), CacheStatus::Loading);
        self.queue_load(url.to_string());
        CacheStatus::Loading
    }

    /// Status of `url` without side effects.
    pub fn status(&self, url: &str) -> Option<CacheStatus> {
        self.entries.get(url).copied()
    }

    pub fn lookup(&self, url: &str) -> Option<LoadedImage> {
        match self.entries.get(url) {
            Some(CacheStatus::Ready(image)) => Some(*image),
            _ => None,
        }
    }

    /// Loader threads started so far.
    pub fn workers(&self) -> usize {
        self.workers.len()
    }

    pub fn in_flight(&self) -> usize {
        self.entries
            .values()
            .filter(|status| matches!(status, CacheStatus::Loading))
            .count()
    }

    /// Folds finished loads into the cache and returns their urls.
    pub fn poll(&mut self) -> Vec<String> {
        let mut settled = Vec::new();
        while let Ok(outcome) = self.receiver.try_recv() {
            settled.push(self.finish(outcome));
        }
        settled
    }

    /// Blocks until `url` settles or `timeout` elapses; returns the status seen.
    pub fn wait_for(&mut self, url: &str, timeout: Duration) -> CacheStatus {
        let deadline = Instant::now() + timeout;
        let mut status = self.request(url);
        while !status.is_settled() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.receiver.recv_timeout(remaining) {
                Ok(outcome) => {
                    self.finish(outcome);
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
            status = self.status(url).unwrap_or(CacheStatus::Loading);
        }
        status
    }

    /// Decoded pixels accumulated since the last call.
    pub fn take_uploads(&mut self) -> Vec<DecodedImage> {
        std::mem::take(&mut self.uploads)
    }

    fn finish(&mut self, outcome: LoadOutcome) -> String {
        let LoadOutcome { url, result } = outcome;
        let status = match result {
            Ok(pixels) => {
                let key = TextureKey(self.next_key);
                self.next_key += 1;
                let (width, height) = pixels.dimensions();
                tracing::debug!(url = %url, width, height, "image decoded");
                self.uploads.push(DecodedImage {
                    key,
                    url: url.clone(),
                    pixels,
                });
                CacheStatus::Ready(LoadedImage { key, width, height })
            }
            Err(err) => {
                tracing::warn!(url = %url, error = %err, "failed to load image; using fallback");
                CacheStatus::Failed
            }
        };
        self.entries.insert(url.clone(), status);
        url
    }

    fn queue_load(&mut self, url: String) {
        let queued = match self.job_sender() {
            Some(jobs) => jobs.send(url).map_err(|err| err.into_inner()),
            None => Err(url),
        };
        if let Err(url) = queued {
            tracing::warn!(url = %url, "no image loader available");
            let _ = self.sender.send(LoadOutcome {
                url: url.clone(),
                result: Err(AssetError::UnsupportedUrl(url)),
            });
        }
    }

    fn job_sender(&mut self) -> Option<&Sender<String>> {
        if self.jobs.is_none() {
            let (jobs, queue) = unbounded::<String>();
            for index in 0..LOADER_THREADS {
                let source = Arc::clone(&self.source);
                let results = self.sender.clone();
                let queue = queue.clone();
                let spawned = thread::Builder::new()
                    .name(format!("image-loader-{index}"))
                    .spawn(move || {
                        for url in queue.iter() {
                            let result = load_pixels(source.as_ref(), &url);
                            if results.send(LoadOutcome { url, result }).is_err() {
                                break;
                            }
                        }
                    });
                match spawned {
                    Ok(handle) => self.workers.push(handle),
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to spawn image loader");
                        break;
                    }
                }
            }
            if self.workers.is_empty() {
                return None;
            }
            tracing::debug!(threads = self.workers.len(), "image loaders started");
            self.jobs = Some(jobs);
        }
        self.jobs.as_ref()
    }
}

impl Drop for ImageCache {
    fn drop(&mut self) {
        // Loaders exit once the queue closes; they are never joined.
        self.jobs.take();
    }
}

fn load_pixels(source: &dyn ImageSource, url: &str) -> Result<RgbaImage, AssetError> {
    let bytes = source.fetch(url)?;
    let decoded = image::load_from_memory(&bytes).map_err(|source| AssetError::Decode {
        url: url.to_string(),
        source,
    })?;
    let mut pixels = decoded.to_rgba8();
    flip_vertical_in_place(&mut pixels);
    Ok(pixels)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use image::{ImageFormat, Rgba};

    use super::*;

    struct CountingSource {
        calls: AtomicUsize,
        png: Vec<u8>,
    }

    impl CountingSource {
        fn new() -> Self {
            let mut image = RgbaImage::from_pixel(4, 2, Rgba([255, 0, 0, 255]));
            image.put_pixel(0, 0, Rgba([0, 255, 0, 255]));
            let mut png = Vec::new();
            image
                .write_to(&mut std::io::Cursor::new(&mut png), ImageFormat::Png)
                .expect("encode png");
            Self {
                calls: AtomicUsize::new(0),
                png,
            }
        }
    }

    impl ImageSource for CountingSource {
        fn fetch(&self, url: &str) -> Result<Vec<u8>, AssetError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if url.ends_with("broken.png") {
                return Ok(b"not an image".to_vec());
            }
            Ok(self.png.clone())
        }
    }

    #[test]
    fn deduplicates_concurrent_requests() {
        let source = Arc::new(CountingSource::new());
        let mut cache = ImageCache::new(source.clone());
        assert_eq!(cache.request("/a.png"), CacheStatus::Loading);
        assert_eq!(cache.request("/a.png"), CacheStatus::Loading);

        let status = cache.wait_for("/a.png", Duration::from_secs(5));
        let CacheStatus::Ready(image) = status else {
            panic!("expected decoded image, got {status:?}");
        };
        assert_eq!((image.width, image.height), (4, 2));
        assert_eq!(cache.request("/a.png"), status);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn uploads_are_flipped_to_bottom_up_rows() {
        let mut cache = ImageCache::new(Arc::new(CountingSource::new()));
        cache.wait_for("/a.png", Duration::from_secs(5));
        let uploads = cache.take_uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].pixels.get_pixel(0, 1), &Rgba([0, 255, 0, 255]));
        assert!(cache.take_uploads().is_empty());
    }

    #[test]
    fn failures_are_not_retried() {
        let source = Arc::new(CountingSource::new());
        let mut cache = ImageCache::new(source.clone());
        let status = cache.wait_for("/broken.png", Duration::from_secs(5));
        assert_eq!(status, CacheStatus::Failed);
        assert_eq!(cache.request("/broken.png"), CacheStatus::Failed);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert!(cache.lookup("/broken.png").is_none());
    }

    struct SlowSource {
        active: AtomicUsize,
        peak: AtomicUsize,
        png: Vec<u8>,
    }

    impl ImageSource for SlowSource {
        fn fetch(&self, _url: &str) -> Result<Vec<u8>, AssetError> {
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(active, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(5));
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(self.png.clone())
        }
    }

    #[test]
    fn many_requests_share_a_bounded_loader_pool() {
        let source = Arc::new(SlowSource {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            png: CountingSource::new().png,
        });
        let mut cache = ImageCache::new(source.clone());
        assert_eq!(cache.workers(), 0);

        let urls: Vec<String> = (0..24).map(|index| format!("/slide-{index}.png")).collect();
        for url in &urls {
            assert_eq!(cache.request(url), CacheStatus::Loading);
        }
        for url in &urls {
            let status = cache.wait_for(url, Duration::from_secs(10));
            assert!(matches!(status, CacheStatus::Ready(_)), "{url}: {status:?}");
        }

        assert_eq!(cache.workers(), LOADER_THREADS);
        assert!(source.peak.load(Ordering::SeqCst) <= LOADER_THREADS);
        assert_eq!(cache.take_uploads().len(), urls.len());
        assert_eq!(cache.in_flight(), 0);
    }

    #[test]
    fn distinct_urls_receive_distinct_keys() {
        let mut cache = ImageCache::new(Arc::new(CountingSource::new()));
        let first = cache.wait_for("/a.png", Duration::from_secs(5));
        let second = cache.wait_for("/b.png", Duration::from_secs(5));
        match (first, second) {
            (CacheStatus::Ready(a), CacheStatus::Ready(b)) => assert_ne!(a.key, b.key),
            other => panic!("unexpected statuses {other:?}"),
        }
        assert_eq!(cache.in_flight(), 0);
    }
}
