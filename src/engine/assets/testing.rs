// Test doubles for transports and releasable resources

use super::content::Resource;
use super::load::{LoadOptions, LoadResults};
use super::manager::AssetManager;
use super::transport::{FetchCallback, Transport};
use super::AssetError;
use image::{ImageOutputFormat, RgbaImage};
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::io::Cursor;
use std::rc::Rc;

/// In-memory transport
///
/// Immediate mode answers inside `fetch`. Deferred mode holds every fetch
/// until the test releases it, so tests choose the completion order.
#[derive(Default)]
pub(crate) struct MockTransport {
    files: RefCell<HashMap<String, Vec<u8>>>,
    deferred: bool,
    pending: RefCell<Vec<(String, FetchCallback)>>,
    fetched: RefCell<Vec<String>>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn deferred() -> Self {
        Self {
            deferred: true,
            ..Self::default()
        }
    }

    pub(crate) fn with_file(self, url: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.files.borrow_mut().insert(url.to_string(), bytes.into());
        self
    }

    fn lookup(&self, url: &str) -> Result<Vec<u8>, AssetError> {
        self.files
            .borrow()
            .get(url)
            .cloned()
            .ok_or_else(|| AssetError::NotFound(url.to_string()))
    }

    /// Complete the first pending fetch of a URL
    pub(crate) fn release(&self, url: &str) -> bool {
        let callback = {
            let mut pending = self.pending.borrow_mut();
            pending
                .iter()
                .position(|(pending_url, _)| pending_url == url)
                .map(|index| pending.remove(index).1)
        };

        match callback {
            Some(callback) => {
                callback(self.lookup(url));
                true
            }
            None => false,
        }
    }

    /// Complete pending fetches in request order until none are left
    pub(crate) fn release_all(&self) -> usize {
        let mut released = 0;
        loop {
            let next = {
                let mut pending = self.pending.borrow_mut();
                if pending.is_empty() {
                    None
                } else {
                    Some(pending.remove(0))
                }
            };
            let Some((url, callback)) = next else {
                return released;
            };
            callback(self.lookup(&url));
            released += 1;
        }
    }

    pub(crate) fn pending_urls(&self) -> Vec<String> {
        self.pending.borrow().iter().map(|(url, _)| url.clone()).collect()
    }

    /// Every URL fetched so far, in request order
    pub(crate) fn fetched(&self) -> Vec<String> {
        self.fetched.borrow().clone()
    }
}

impl Transport for MockTransport {
    fn fetch(&self, url: &str, callback: FetchCallback) {
        self.fetched.borrow_mut().push(url.to_string());
        if self.deferred {
            self.pending.borrow_mut().push((url.to_string(), callback));
        } else {
            callback(self.lookup(url));
        }
    }
}

/// Build a manager over a mock transport
pub(crate) fn manager_with(transport: &Rc<MockTransport>) -> AssetManager {
    AssetManager::new(transport.clone())
}

/// Slot a test reads the aggregated results from
pub(crate) type Captured = Rc<RefCell<Option<LoadResults>>>;

/// Route a load's completion into a slot
pub(crate) fn capture(options: LoadOptions) -> (LoadOptions, Captured) {
    let captured: Captured = Rc::new(RefCell::new(None));
    let sink = captured.clone();
    let options = options.on_complete(move |results| *sink.borrow_mut() = Some(results));
    (options, captured)
}

/// Text of a result, for terse assertions
pub(crate) fn text_of(value: Option<&super::content::AssetRef>) -> Option<String> {
    value.and_then(|v| v.as_text()).map(str::to_string)
}

/// Encode an image as PNG file contents
pub(crate) fn png_bytes(image: &RgbaImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
        .unwrap();
    bytes
}

/// Resource counting how often it was destroyed
pub(crate) struct CountingResource {
    count: Rc<Cell<u32>>,
}

impl CountingResource {
    pub(crate) fn new(count: Rc<Cell<u32>>) -> Self {
        Self { count }
    }
}

impl Resource for CountingResource {
    fn destroy(&self) {
        self.count.set(self.count.get() + 1);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
