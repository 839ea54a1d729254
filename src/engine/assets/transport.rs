// Single-URL transports with bounded retry

use super::AssetError;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};

/// Receives the bytes of one fetch, exactly once
pub type FetchCallback = Box<dyn FnOnce(Result<Vec<u8>, AssetError>)>;

/// Fetches the raw bytes behind a URL
///
/// Implementations retry on their own; an `Err` handed to the callback means
/// retries are exhausted.
pub trait Transport {
    fn fetch(&self, url: &str, callback: FetchCallback);
}

/// Resolve a URL against a base directory
fn resolve(base_path: &Path, url: &str) -> PathBuf {
    base_path.join(url.trim_start_matches("./"))
}

/// Read a file, retrying up to `max_retries` extra times
fn read_with_retry(path: &Path, max_retries: u32) -> Result<Vec<u8>, AssetError> {
    let mut attempt = 0;
    loop {
        let result = if path.exists() {
            std::fs::read(path).map_err(|e| {
                AssetError::LoadError(format!("Failed to read {}: {}", path.display(), e))
            })
        } else {
            Err(AssetError::NotFound(path.to_string_lossy().to_string()))
        };

        match result {
            Ok(bytes) => return Ok(bytes),
            Err(err) if attempt < max_retries => {
                attempt += 1;
                log::warn!("{} (attempt {}/{})", err, attempt, max_retries + 1);
            }
            Err(err) => return Err(err),
        }
    }
}

/// Transport reading files from disk on the calling thread
///
/// Callbacks run before `fetch` returns.
pub struct FileTransport {
    base_path: PathBuf,
    max_retries: u32,
}

impl FileTransport {
    /// Create a transport rooted at the given base path
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
            max_retries: 0,
        }
    }

    /// Set how many times a failed read is retried
    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Get the full path for a URL
    pub fn resolve_path(&self, url: &str) -> PathBuf {
        resolve(&self.base_path, url)
    }

    /// Load bytes from disk
    pub fn load_bytes(&self, url: &str) -> Result<Vec<u8>, AssetError> {
        read_with_retry(&self.resolve_path(url), self.max_retries)
    }

    /// Check if a URL resolves to an existing file
    pub fn exists(&self, url: &str) -> bool {
        self.resolve_path(url).exists()
    }

    /// Get the base path
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

impl Transport for FileTransport {
    fn fetch(&self, url: &str, callback: FetchCallback) {
        callback(self.load_bytes(url));
    }
}

/// Transport reading files on a fixed pool of worker threads
///
/// Only bytes cross threads. Callbacks stay on the owning thread and run
/// from `poll`, which the host calls once per frame.
pub struct BackgroundTransport {
    base_path: PathBuf,
    max_retries: u32,
    pool: rayon::ThreadPool,
    sender: Sender<(u64, Result<Vec<u8>, AssetError>)>,
    receiver: Receiver<(u64, Result<Vec<u8>, AssetError>)>,
    pending: RefCell<HashMap<u64, FetchCallback>>,
    next_request: Cell<u64>,
}

fn build_fetch_pool(workers: usize) -> Result<rayon::ThreadPool, AssetError> {
    if workers == 0 {
        return Err(AssetError::LoadError(
            "background transport needs at least one worker".to_string(),
        ));
    }

    rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|index| format!("asset-fetch-{}", index))
        .build()
        .map_err(|e| AssetError::LoadError(format!("Failed to build fetch pool: {}", e)))
}

impl BackgroundTransport {
    /// Create a transport whose reads run on `workers` threads
    pub fn new<P: AsRef<Path>>(base_path: P, workers: usize) -> Result<Self, AssetError> {
        let (sender, receiver) = mpsc::channel();
        Ok(Self {
            base_path: base_path.as_ref().to_path_buf(),
            max_retries: 0,
            pool: build_fetch_pool(workers)?,
            sender,
            receiver,
            pending: RefCell::new(HashMap::new()),
            next_request: Cell::new(0),
        })
    }

    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Deliver finished fetches to their callbacks
    ///
    /// Returns the number of callbacks run.
    pub fn poll(&self) -> usize {
        let finished: Vec<_> = self.receiver.try_iter().collect();
        let mut delivered = 0;

        for (request, result) in finished {
            let callback = self.pending.borrow_mut().remove(&request);
            if let Some(callback) = callback {
                callback(result);
                delivered += 1;
            }
        }

        delivered
    }

    /// Block until at least one fetch finishes, then deliver everything ready
    pub fn wait(&self) -> usize {
        if self.is_idle() {
            return 0;
        }
        match self.receiver.recv() {
            Ok((request, result)) => {
                let callback = self.pending.borrow_mut().remove(&request);
                let mut delivered = 0;
                if let Some(callback) = callback {
                    callback(result);
                    delivered += 1;
                }
                delivered + self.poll()
            }
            Err(_) => 0,
        }
    }

    /// Number of fetches still in flight
    pub fn in_flight(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn is_idle(&self) -> bool {
        self.pending.borrow().is_empty()
    }

    /// Number of worker threads reading files
    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl Transport for BackgroundTransport {
    fn fetch(&self, url: &str, callback: FetchCallback) {
        let request = self.next_request.get();
        self.next_request.set(request + 1);
        self.pending.borrow_mut().insert(request, callback);

        let path = resolve(&self.base_path, url);
        let max_retries = self.max_retries;
        let sender = self.sender.clone();
        self.pool.spawn(move || {
            let result = read_with_retry(&path, max_retries);
            // The receiver only goes away with the transport
            let _ = sender.send((request, result));
        });
    }
}
