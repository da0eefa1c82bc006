//! # Neural Estimator Adapter
//!
//! Optional high-accuracy estimator loaded from a remote model artifact.
//! Loading happens on a background thread; the real-time path only ever
//! observes a single atomic state flag and a non-blocking channel, so the
//! audio deadline is never at risk. Any failure, including a fetch timeout,
//! parks the adapter in `Failed` for the rest of the session and the
//! pipeline continues on the classical estimators.
//!
//! ## State machine
//! `Uninitialized -> FetchingModel -> Initializing -> Ready`, any step may
//! jump to `Failed`. There is no automatic retry: a session that fell back
//! stays fallen back.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, bounded};
use directories::ProjectDirs;
use log::{debug, info, warn};

use crate::error::PitchError;
use crate::yin::PitchCandidate;

/// Artifacts smaller than this are treated as corrupt downloads.
const MIN_ARTIFACT_BYTES: usize = 1000;
/// Default limit on the fetch phase before the adapter gives up.
const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Lifecycle state of the adapter, observable from the real-time path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AdapterState {
    /// No activation has been requested yet.
    Uninitialized = 0,
    /// The background loader is looking up the cache or fetching bytes.
    FetchingModel = 1,
    /// Bytes are available; the backend is building the estimator.
    Initializing = 2,
    /// The estimator produced its first output and is in use.
    Ready = 3,
    /// Loading failed; the classical path is used for the session.
    Failed = 4,
}

impl AdapterState {
    fn from_u8(value: u8) -> AdapterState {
        match value {
            1 => AdapterState::FetchingModel,
            2 => AdapterState::Initializing,
            3 => AdapterState::Ready,
            4 => AdapterState::Failed,
            _ => AdapterState::Uninitialized,
        }
    }
}

/// One-shot lifecycle notices the pipeline surfaces to its consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterEvent {
    /// The neural estimator is ready and now supersedes classical fusion.
    Ready,
    /// Loading failed; detection continues on the classical path.
    FellBack(String),
}

/// Source of the model artifact bytes. Transport is the caller's business:
/// an HTTP fetch, a bundled file, anything that can produce bytes.
pub trait ModelSource: Send + 'static {
    /// Stable identifier for the artifact, used as the cache key.
    fn content_key(&self) -> String;
    /// Produces the artifact bytes. Called off the real-time path, may block.
    fn fetch(&self) -> anyhow::Result<Vec<u8>>;
}

/// Turns artifact bytes into a working estimator.
pub trait NeuralBackend: Send + 'static {
    /// Builds the estimator from the artifact. Called once, off the
    /// real-time path.
    fn load(&self, artifact: &[u8]) -> anyhow::Result<Box<dyn NeuralEstimator>>;
}

/// A loaded neural pitch estimator.
pub trait NeuralEstimator: Send {
    /// Estimates the pitch of one analysis window. `None` means no estimate
    /// for this window, in which case the pipeline falls through to the
    /// classical result.
    fn estimate(&mut self, window: &[f32], sample_rate: u32) -> Option<PitchCandidate>;
}

/// Disk cache for fetched model artifacts, keyed by content key.
///
/// Cache failures are never fatal: a missed read falls through to the
/// source, a failed write is logged and forgotten.
#[derive(Clone)]
pub struct ModelCache {
    dir: Option<PathBuf>,
}

impl ModelCache {
    /// Cache under the platform's per-user cache directory.
    pub fn new() -> Self {
        let dir = ProjectDirs::from("", "", "pitch-core")
            .map(|dirs| dirs.cache_dir().join("models"));
        ModelCache { dir }
    }

    /// Cache under an explicit directory. Useful for tests.
    pub fn with_dir(dir: PathBuf) -> Self {
        ModelCache { dir: Some(dir) }
    }

    /// A cache that never hits and never stores.
    pub fn disabled() -> Self {
        ModelCache { dir: None }
    }

    fn path_for(&self, key: &str) -> Option<PathBuf> {
        let sanitized: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
            .collect();
        self.dir.as_ref().map(|dir| dir.join(sanitized))
    }

    fn load(&self, key: &str) -> Option<Vec<u8>> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(bytes) if bytes.len() >= MIN_ARTIFACT_BYTES => {
                debug!("model cache hit for '{key}' ({} bytes)", bytes.len());
                Some(bytes)
            }
            Ok(_) => {
                warn!("cached model '{key}' is undersized, ignoring");
                None
            }
            Err(_) => None,
        }
    }

    fn store(&self, key: &str, bytes: &[u8]) {
        let Some(path) = self.path_for(key) else { return };
        let result = path
            .parent()
            .map(fs::create_dir_all)
            .unwrap_or(Ok(()))
            .and_then(|_| fs::write(&path, bytes));
        if let Err(e) = result {
            warn!("failed to cache model '{key}': {e}");
        }
    }
}

impl Default for ModelCache {
    fn default() -> Self {
        ModelCache::new()
    }
}

/// Asynchronously-loaded neural estimator with a hard non-blocking contract
/// toward the real-time path.
pub struct NeuralEstimatorAdapter {
    state: Arc<AtomicU8>,
    result_rx: Option<Receiver<Result<Box<dyn NeuralEstimator>, PitchError>>>,
    estimator: Option<Box<dyn NeuralEstimator>>,
    failure: Option<String>,
    cache: ModelCache,
    fetch_timeout: Duration,
    warmup_window: usize,
    sample_rate: u32,
    ready_notified: bool,
    failure_notified: bool,
}

impl NeuralEstimatorAdapter {
    /// Creates an inactive adapter. `window_size` and `sample_rate` are used
    /// for the warm-up inference that gates the `Ready` transition.
    pub fn new(sample_rate: u32, window_size: usize) -> Self {
        NeuralEstimatorAdapter {
            state: Arc::new(AtomicU8::new(AdapterState::Uninitialized as u8)),
            result_rx: None,
            estimator: None,
            failure: None,
            cache: ModelCache::new(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            warmup_window: window_size,
            sample_rate,
            ready_notified: false,
            failure_notified: false,
        }
    }

    /// Overrides the artifact cache (tests use a temp directory).
    pub fn with_cache(mut self, cache: ModelCache) -> Self {
        self.cache = cache;
        self
    }

    /// Overrides the fetch timeout.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> AdapterState {
        AdapterState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Kicks off loading on a background thread. Subsequent calls are
    /// ignored; there is exactly one load attempt per session.
    pub fn activate<S: ModelSource, B: NeuralBackend>(&mut self, source: S, backend: B) {
        let current = self.state.load(Ordering::Acquire);
        if current != AdapterState::Uninitialized as u8 {
            debug!("adapter activation ignored in state {:?}", AdapterState::from_u8(current));
            return;
        }
        self.state
            .store(AdapterState::FetchingModel as u8, Ordering::Release);

        let (result_tx, result_rx) = bounded(1);
        self.result_rx = Some(result_rx);

        let state = Arc::clone(&self.state);
        let cache = self.cache.clone();
        let timeout = self.fetch_timeout;
        let sample_rate = self.sample_rate;
        let warmup_window = self.warmup_window;

        thread::spawn(move || {
            let outcome = load_model(source, backend, cache, timeout, sample_rate, warmup_window, &state);
            let final_state = match &outcome {
                Ok(_) => AdapterState::Ready,
                Err(e) => {
                    warn!("neural estimator unavailable: {e}");
                    AdapterState::Failed
                }
            };
            // Publish the result before the state so the consumer never
            // observes Ready/Failed with an empty channel.
            let _ = result_tx.send(outcome);
            state.store(final_state as u8, Ordering::Release);
        });
    }

    /// Non-blocking per-window estimate. Returns `None` whenever the
    /// estimator is not ready or declines the window; the caller then uses
    /// the classical result.
    pub fn estimate(&mut self, window: &[f32], sample_rate: u32) -> Option<PitchCandidate> {
        match self.state() {
            AdapterState::Ready => {
                self.collect_result();
                self.estimator
                    .as_mut()
                    .and_then(|est| est.estimate(window, sample_rate))
            }
            AdapterState::Failed => {
                self.collect_result();
                None
            }
            _ => None,
        }
    }

    /// One-shot lifecycle notices: `Ready` once when the model comes up,
    /// `FellBack` once if it never does.
    pub fn poll_event(&mut self) -> Option<AdapterEvent> {
        match self.state() {
            AdapterState::Ready if !self.ready_notified => {
                self.ready_notified = true;
                self.collect_result();
                Some(AdapterEvent::Ready)
            }
            AdapterState::Failed if !self.failure_notified => {
                self.failure_notified = true;
                self.collect_result();
                let reason = self
                    .failure
                    .clone()
                    .unwrap_or_else(|| "model loading failed".into());
                Some(AdapterEvent::FellBack(reason))
            }
            _ => None,
        }
    }

    /// Drains the loader's result channel without blocking.
    fn collect_result(&mut self) {
        if self.estimator.is_some() || self.failure.is_some() {
            return;
        }
        let Some(rx) = &self.result_rx else { return };
        match rx.try_recv() {
            Ok(Ok(estimator)) => self.estimator = Some(estimator),
            Ok(Err(e)) => self.failure = Some(e.to_string()),
            Err(_) => {}
        }
    }
}

/// The background loading sequence: cache lookup, fetch with timeout, cache
/// write-back, backend load, warm-up inference.
fn load_model<S: ModelSource, B: NeuralBackend>(
    source: S,
    backend: B,
    cache: ModelCache,
    timeout: Duration,
    sample_rate: u32,
    warmup_window: usize,
    state: &AtomicU8,
) -> Result<Box<dyn NeuralEstimator>, PitchError> {
    let key = source.content_key();

    let artifact = match cache.load(&key) {
        Some(bytes) => bytes,
        None => {
            let bytes = fetch_with_timeout(source, timeout)?;
            if bytes.len() < MIN_ARTIFACT_BYTES {
                return Err(PitchError::ModelInitFailed(format!(
                    "artifact '{key}' is only {} bytes",
                    bytes.len()
                )));
            }
            cache.store(&key, &bytes);
            bytes
        }
    };

    state.store(AdapterState::Initializing as u8, Ordering::Release);
    let mut estimator = backend
        .load(&artifact)
        .map_err(|e| PitchError::ModelInitFailed(e.to_string()))?;

    // The Ready transition is gated on the model actually producing an
    // output, not just constructing.
    let silence = vec![0.0f32; warmup_window];
    let _ = estimator.estimate(&silence, sample_rate);
    info!("neural estimator ready (model '{key}')");
    Ok(estimator)
}

/// Runs the fetch on its own thread so a hung transport cannot wedge the
/// loader past the configured deadline.
fn fetch_with_timeout<S: ModelSource>(
    source: S,
    timeout: Duration,
) -> Result<Vec<u8>, PitchError> {
    let (tx, rx) = bounded(1);
    thread::spawn(move || {
        let _ = tx.send(source.fetch());
    });
    match rx.recv_timeout(timeout) {
        Ok(Ok(bytes)) => Ok(bytes),
        Ok(Err(e)) => Err(PitchError::ModelFetchFailed(e.to_string())),
        Err(_) => Err(PitchError::ModelFetchFailed(format!(
            "timed out after {timeout:?}"
        ))),
    }
}
