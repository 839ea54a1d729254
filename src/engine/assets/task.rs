// Task contract: one stateful, startable unit per asset descriptor

use super::content::AssetRef;
use super::descriptor::{AssetDescriptor, Assets};
use super::load::{AssetLoad, LoadOptions, LoadState};
use super::manager::AssetManager;
use super::transport::FetchCallback;
use super::AssetError;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// Lifecycle of a task; only ever moves forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TaskStatus {
    Waiting,
    Running,
    Finished,
}

/// A unit of loading work
pub trait Task {
    /// Begin the work
    ///
    /// `done` must be completed exactly once, now or later. A `None` result
    /// means "finished without payload" and is not an error.
    fn start(self: Box<Self>, ctx: TaskContext, done: TaskDone);
}

/// A registered kind of task: a predicate over descriptors plus a factory
pub trait TaskType {
    /// Name used in logs
    fn name(&self) -> &'static str;

    /// Check if this type can handle a descriptor
    fn test(&self, asset: &AssetDescriptor) -> bool;

    /// Path to derive a cache id from when the descriptor has none
    fn fallback_id<'a>(&self, _asset: &'a AssetDescriptor) -> Option<&'a str> {
        None
    }

    /// Build the task for a descriptor that passed `test`
    fn create(&self, asset: Rc<AssetDescriptor>) -> Box<dyn Task>;
}

/// Snapshot of a tracked task
#[derive(Debug, Clone)]
pub struct TaskInfo {
    /// Result id, explicit or derived
    pub id: Option<String>,

    /// Name of the task type that claimed the descriptor
    pub type_name: &'static str,

    /// Type tag after session defaults were applied
    pub type_tag: Option<String>,

    /// Whether the result is written to the cache
    pub cache: bool,

    pub status: TaskStatus,

    /// The descriptor the task was created from
    pub original: Rc<AssetDescriptor>,
}

/// Services available to a running task
#[derive(Clone)]
pub struct TaskContext {
    manager: AssetManager,
}

impl TaskContext {
    pub(crate) fn new(manager: AssetManager) -> Self {
        Self { manager }
    }

    /// The manager running this task
    pub fn manager(&self) -> &AssetManager {
        &self.manager
    }

    /// Substitute the size token in a URL, recording the chosen scale on the descriptor
    pub fn filter(&self, url: &str, asset: &AssetDescriptor) -> String {
        super::sizes::filter_url(self.manager.sizes().as_ref(), url, asset)
    }

    /// Fetch raw bytes through the manager's transport
    pub fn fetch(&self, url: &str, callback: FetchCallback) {
        self.manager.transport().fetch(url, callback);
    }

    /// Start a nested load on the same manager
    pub fn load(&self, assets: impl Into<Assets>, options: LoadOptions) -> AssetLoad {
        self.manager.load(assets, options)
    }
}

/// One-shot completion handle for a started task
///
/// Consumed on completion, so a task cannot report twice. Dropping it
/// without completing reports `None`.
pub struct TaskDone {
    session: Option<Weak<RefCell<LoadState>>>,
    key: u64,
}

impl TaskDone {
    pub(crate) fn new(session: Weak<RefCell<LoadState>>, key: u64) -> Self {
        Self {
            session: Some(session),
            key,
        }
    }

    /// Complete the task
    ///
    /// A fatal session error raised while handling the completion is
    /// reported through the session's error callback.
    pub fn finish(self, result: Option<AssetRef>) {
        let _ = self.finish_with(result, Vec::new());
    }

    /// Complete the task and enqueue newly discovered assets into its session
    pub fn finish_with(
        mut self,
        result: Option<AssetRef>,
        discovered: Vec<AssetDescriptor>,
    ) -> Result<(), AssetError> {
        match self.session.take().and_then(|session| session.upgrade()) {
            Some(session) => AssetLoad::from_state(session).task_done(self.key, result, discovered),
            None => Ok(()),
        }
    }
}

impl Drop for TaskDone {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        if std::thread::panicking() {
            return;
        }
        if let Some(session) = session.upgrade() {
            log::warn!("Task {} dropped without completing, finishing it empty", self.key);
            let _ = AssetLoad::from_state(session).task_done(self.key, None, Vec::new());
        }
    }
}

/// Derive an id from a path by stripping its directory and extension
///
/// `"images/bg.png"` becomes `"bg"`.
pub fn derive_id(path: &str) -> Option<String> {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    let stem = match name.rfind('.') {
        Some(0) | None => name,
        Some(dot) => &name[..dot],
    };

    if stem.is_empty() {
        None
    } else {
        Some(stem.to_string())
    }
}
