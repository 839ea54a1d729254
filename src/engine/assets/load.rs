// Load sessions: expand input into tasks, schedule them, aggregate results

use super::content::{AssetContent, AssetRef};
use super::descriptor::{AssetDescriptor, Assets};
use super::manager::{AssetManager, ManagerInner};
use super::task::{derive_id, Task, TaskContext, TaskDone, TaskInfo, TaskStatus};
use super::tasks::CachedTask;
use super::AssetError;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

/// Shape of a session's results, fixed when the session is set up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadMode {
    /// The input was one asset; the result is its raw content
    Single,
    /// At least one listed asset has no id; results in completion order
    List,
    /// Every asset has an id; results keyed by id
    #[default]
    Map,
}

/// Aggregated results of a session
#[derive(Debug, Clone)]
pub enum LoadResults {
    Single(Option<AssetRef>),
    List(Vec<Option<AssetRef>>),
    Map(IndexMap<String, Option<AssetRef>>),
}

impl LoadResults {
    /// Empty results for a mode
    pub fn empty(mode: LoadMode) -> Self {
        match mode {
            LoadMode::Single => LoadResults::Single(None),
            LoadMode::List => LoadResults::List(Vec::new()),
            LoadMode::Map => LoadResults::Map(IndexMap::new()),
        }
    }

    pub fn mode(&self) -> LoadMode {
        match self {
            LoadResults::Single(_) => LoadMode::Single,
            LoadResults::List(_) => LoadMode::List,
            LoadResults::Map(_) => LoadMode::Map,
        }
    }

    /// The content of a single-asset load
    pub fn single(&self) -> Option<&AssetRef> {
        match self {
            LoadResults::Single(value) => value.as_ref(),
            _ => None,
        }
    }

    /// Look up a keyed result
    pub fn get(&self, id: &str) -> Option<&AssetRef> {
        match self {
            LoadResults::Map(items) => items.get(id).and_then(Option::as_ref),
            _ => None,
        }
    }

    /// Results of a list load, in completion order
    pub fn list(&self) -> Option<&[Option<AssetRef>]> {
        match self {
            LoadResults::List(items) => Some(items),
            _ => None,
        }
    }

    /// Keyed results of a map load
    pub fn map(&self) -> Option<&IndexMap<String, Option<AssetRef>>> {
        match self {
            LoadResults::Map(items) => Some(items),
            _ => None,
        }
    }

    /// Number of entries, null entries included
    pub fn len(&self) -> usize {
        match self {
            LoadResults::Single(value) => usize::from(value.is_some()),
            LoadResults::List(items) => items.len(),
            LoadResults::Map(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Collapse into one payload, wrapping lists and maps
    pub fn into_content(self) -> Option<AssetRef> {
        match self {
            LoadResults::Single(value) => value,
            LoadResults::List(items) => Some(Rc::new(AssetContent::List(items))),
            LoadResults::Map(items) => Some(Rc::new(AssetContent::Map(items))),
        }
    }
}

pub type CompleteFn = Box<dyn FnOnce(LoadResults)>;
pub type ProgressFn = Box<dyn FnMut(f32)>;
pub type TaskDoneFn = Box<dyn FnMut(Option<&AssetRef>, &AssetDescriptor, &mut Vec<AssetDescriptor>)>;
pub type ErrorFn = Box<dyn FnOnce(&AssetError)>;

/// Options of one load
pub struct LoadOptions {
    /// Called once with the aggregated results
    pub complete: Option<CompleteFn>,

    /// Called with `loaded / total` after every finished task
    pub progress: Option<ProgressFn>,

    /// Called after every finished task; may push more assets to load
    pub task_done: Option<TaskDoneFn>,

    /// Called if the session fails as a whole
    pub error: Option<ErrorFn>,

    /// Start as soon as the session is set up
    pub auto_start: bool,

    /// Start every task at once (true) or one after another (false)
    pub start_all: bool,

    /// Cache every asset that does not say otherwise
    pub cache_all: bool,

    /// Type tag for assets that have none
    pub type_tag: Option<String>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            complete: None,
            progress: None,
            task_done: None,
            error: None,
            auto_start: true,
            start_all: true,
            cache_all: false,
            type_tag: None,
        }
    }
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_complete(mut self, complete: impl FnOnce(LoadResults) + 'static) -> Self {
        self.complete = Some(Box::new(complete));
        self
    }

    pub fn on_progress(mut self, progress: impl FnMut(f32) + 'static) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }

    pub fn on_task_done(
        mut self,
        task_done: impl FnMut(Option<&AssetRef>, &AssetDescriptor, &mut Vec<AssetDescriptor>) + 'static,
    ) -> Self {
        self.task_done = Some(Box::new(task_done));
        self
    }

    pub fn on_error(mut self, error: impl FnOnce(&AssetError) + 'static) -> Self {
        self.error = Some(Box::new(error));
        self
    }

    pub fn with_auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    pub fn with_start_all(mut self, start_all: bool) -> Self {
        self.start_all = start_all;
        self
    }

    /// Run tasks strictly one at a time
    pub fn serial(self) -> Self {
        self.with_start_all(false)
    }

    pub fn with_cache_all(mut self, cache_all: bool) -> Self {
        self.cache_all = cache_all;
        self
    }

    pub fn with_type(mut self, type_tag: impl Into<String>) -> Self {
        self.type_tag = Some(type_tag.into());
        self
    }
}

#[derive(Default)]
struct Callbacks {
    complete: Option<CompleteFn>,
    progress: Option<ProgressFn>,
    task_done: Option<TaskDoneFn>,
    error: Option<ErrorFn>,
}

/// A tracked task; the task itself is handed out when it starts
struct TaskSlot {
    key: u64,
    info: TaskInfo,
    task: Option<Box<dyn Task>>,
}

pub(crate) struct LoadState {
    manager: Weak<ManagerInner>,
    mode: LoadMode,
    tasks: VecDeque<TaskSlot>,
    results: LoadResults,
    total: usize,
    num_loaded: usize,
    /// Tasks started and not yet completed
    in_flight: usize,
    running: bool,
    start_all: bool,
    cache_all: bool,
    type_tag: Option<String>,
    callbacks: Callbacks,

    /// Set while a scheduling loop is on the stack; not cleared by reset
    starting: bool,

    /// Never reset, so completions from an earlier session never match
    next_key: u64,

    /// Bumped on every reset
    generation: u64,
}

impl LoadState {
    fn new(manager: Weak<ManagerInner>) -> Self {
        Self {
            manager,
            mode: LoadMode::default(),
            tasks: VecDeque::new(),
            results: LoadResults::empty(LoadMode::default()),
            total: 0,
            num_loaded: 0,
            in_flight: 0,
            running: false,
            start_all: true,
            cache_all: false,
            type_tag: None,
            callbacks: Callbacks::default(),
            starting: false,
            next_key: 0,
            generation: 0,
        }
    }

    /// Return to baseline, handing back what must be dropped outside the borrow
    fn clear(&mut self) -> (VecDeque<TaskSlot>, Callbacks) {
        let mut tasks = std::mem::take(&mut self.tasks);
        for slot in &mut tasks {
            slot.info.status = TaskStatus::Finished;
        }
        let callbacks = std::mem::take(&mut self.callbacks);

        self.mode = LoadMode::default();
        self.results = LoadResults::empty(self.mode);
        self.total = 0;
        self.num_loaded = 0;
        self.in_flight = 0;
        self.running = false;
        self.start_all = true;
        self.cache_all = false;
        self.type_tag = None;
        self.generation += 1;

        (tasks, callbacks)
    }

    /// Expand an input into tasks, returning the mode its shape implies
    fn add_tasks(&mut self, manager: &AssetManager, assets: Assets) -> LoadMode {
        match assets {
            Assets::One(asset) => {
                self.add_task(manager, asset);
                LoadMode::Single
            }
            Assets::List(items) => {
                let mut mode = LoadMode::Map;
                for asset in items {
                    if let Some(info) = self.add_task(manager, asset) {
                        if info.id.is_none() {
                            mode = LoadMode::List;
                        }
                    }
                }
                mode
            }
            assets @ Assets::Map(_) => {
                for asset in assets.into_descriptors() {
                    self.add_task(manager, asset);
                }
                LoadMode::Map
            }
        }
    }

    /// Create and track the task for one descriptor
    fn add_task(&mut self, manager: &AssetManager, mut asset: AssetDescriptor) -> Option<&TaskInfo> {
        if asset.type_tag.is_none() {
            asset.type_tag = self.type_tag.clone();
        }

        let Some(task_type) = manager.find_task_type(&asset) else {
            log::warn!("{}", AssetError::Unroutable(format!("{:?}", asset)));
            return None;
        };

        let mut cache = asset.cache.unwrap_or(self.cache_all);
        let mut id = asset.id.clone();
        if cache && id.is_none() {
            id = task_type.fallback_id(&asset).and_then(derive_id);
            if id.is_none() {
                log::debug!("No id for cached '{}' asset, caching disabled", task_type.name());
                cache = false;
            }
        }

        let original = Rc::new(asset);
        let cached = match (&id, cache) {
            (Some(id), true) if manager.cache().contains(id) => manager.cache().read(id),
            _ => None,
        };
        let task: Box<dyn Task> = match cached {
            Some(value) => {
                log::debug!("Asset '{}' served from cache", id.as_deref().unwrap_or_default());
                cache = false;
                Box::new(CachedTask::new(value))
            }
            None => task_type.create(original.clone()),
        };

        let key = self.next_key;
        self.next_key += 1;
        self.total += 1;
        self.tasks.push_back(TaskSlot {
            key,
            info: TaskInfo {
                id,
                type_name: task_type.name(),
                type_tag: original.type_tag.clone(),
                cache,
                status: TaskStatus::Waiting,
                original,
            },
            task: Some(task),
        });

        self.tasks.back().map(|slot| &slot.info)
    }
}

/// What the scheduling loop does next
enum Step {
    Start(Rc<ManagerInner>, u64, Option<Box<dyn Task>>),
    Finish,
    Idle,
}

/// One load session
///
/// A cheap handle; clones refer to the same session. Sessions are recycled by
/// the manager once they complete, so a handle kept past completion may later
/// observe a different load.
#[derive(Clone)]
pub struct AssetLoad {
    state: Rc<RefCell<LoadState>>,
}

impl AssetLoad {
    pub(crate) fn new(manager: Weak<ManagerInner>) -> Self {
        Self {
            state: Rc::new(RefCell::new(LoadState::new(manager))),
        }
    }

    pub(crate) fn from_state(state: Rc<RefCell<LoadState>>) -> Self {
        Self { state }
    }

    /// Check if two handles refer to the same session
    pub fn ptr_eq(&self, other: &AssetLoad) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    fn manager(&self) -> Option<AssetManager> {
        self.state.borrow().manager.upgrade().map(AssetManager::from_inner)
    }

    /// Expand the input into tasks and apply the options
    ///
    /// The result mode is decided here and does not change afterwards.
    pub fn setup(&self, assets: impl Into<Assets>, options: LoadOptions) {
        let assets = assets.into();
        let manager = self.manager();
        {
            let mut state = self.state.borrow_mut();
            state.start_all = options.start_all;
            state.cache_all = options.cache_all;
            state.type_tag = options.type_tag;
            state.callbacks = Callbacks {
                complete: options.complete,
                progress: options.progress,
                task_done: options.task_done,
                error: options.error,
            };

            let mode = match &manager {
                Some(manager) => state.add_tasks(manager, assets),
                None => {
                    log::warn!("Asset manager is gone, nothing to load");
                    LoadMode::default()
                }
            };
            state.mode = mode;
            state.results = LoadResults::empty(mode);
            log::debug!("Load set up in {:?} mode with {} tasks", mode, state.total);
        }

        if options.auto_start {
            self.start();
        }
    }

    /// Start running tasks; a session without tasks completes immediately
    pub fn start(&self) {
        {
            let mut state = self.state.borrow_mut();
            if state.running {
                return;
            }
            state.running = true;
        }
        self.start_tasks();
    }

    /// Pick the next step under the session's concurrency policy
    fn next_step(&self) -> Step {
        let mut state = self.state.borrow_mut();
        if !state.running {
            state.starting = false;
            return Step::Idle;
        }
        if state.tasks.is_empty() {
            state.starting = false;
            return Step::Finish;
        }
        if !state.start_all && state.in_flight > 0 {
            state.starting = false;
            return Step::Idle;
        }
        let Some(manager) = state.manager.upgrade() else {
            log::warn!("Asset manager is gone, tasks not started");
            state.starting = false;
            return Step::Idle;
        };
        // Running tasks always form a prefix of the list
        let skip = state.in_flight.min(state.tasks.len());
        let Some(slot) = state
            .tasks
            .range_mut(skip..)
            .find(|slot| slot.info.status == TaskStatus::Waiting)
        else {
            state.starting = false;
            return Step::Idle;
        };

        slot.info.status = TaskStatus::Running;
        log::debug!("Starting '{}' task {}", slot.info.type_name, slot.key);
        let step = Step::Start(manager, slot.key, slot.task.take());
        state.in_flight += 1;
        step
    }

    /// Start waiting tasks until the policy allows no more, or finish
    ///
    /// Completions that arrive while a task is starting land back here and
    /// return at once, so the loop below drives the session without
    /// growing the stack.
    fn start_tasks(&self) {
        {
            let mut state = self.state.borrow_mut();
            if state.starting {
                return;
            }
            state.starting = true;
        }

        loop {
            match self.next_step() {
                Step::Start(manager, key, task) => {
                    if let Some(task) = task {
                        let ctx = TaskContext::new(AssetManager::from_inner(manager));
                        task.start(ctx, TaskDone::new(Rc::downgrade(&self.state), key));
                    }
                }
                Step::Finish => {
                    self.finish();
                    return;
                }
                Step::Idle => return,
            }
        }
    }

    /// Handle a task's completion
    pub(crate) fn task_done(
        &self,
        key: u64,
        result: Option<AssetRef>,
        discovered: Vec<AssetDescriptor>,
    ) -> Result<(), AssetError> {
        let (info, manager, generation) = {
            let mut state = self.state.borrow_mut();
            if !state.running {
                log::debug!("Ignoring completion of task {} on an idle session", key);
                return Ok(());
            }
            let Some(mut slot) = state
                .tasks
                .iter()
                .position(|slot| slot.key == key)
                .and_then(|index| state.tasks.remove(index))
            else {
                log::debug!("Ignoring completion of untracked task {}", key);
                return Ok(());
            };
            state.in_flight = state.in_flight.saturating_sub(1);
            slot.info.status = TaskStatus::Finished;
            let id = slot.info.id.clone();
            match &mut state.results {
                LoadResults::Single(value) => *value = result.clone(),
                LoadResults::List(items) => items.push(result.clone()),
                LoadResults::Map(items) => match id {
                    Some(id) => {
                        items.insert(id, result.clone());
                    }
                    None => log::warn!("Result without an id left out of keyed results"),
                },
            }

            let manager = state.manager.upgrade().map(AssetManager::from_inner);
            (slot.info, manager, state.generation)
        };

        if info.cache {
            if let (Some(manager), Some(id), Some(value)) = (&manager, &info.id, &result) {
                manager.cache().write(id, value.clone());
            }
        }

        let mut new_assets = discovered;
        if let Some(complete) = info.original.complete.clone() {
            complete(result.as_ref(), &info.original, &mut new_assets);
        }
        let callback = self.state.borrow_mut().callbacks.task_done.take();
        if let Some(mut callback) = callback {
            callback(result.as_ref(), &info.original, &mut new_assets);
            let mut state = self.state.borrow_mut();
            if state.generation == generation && state.callbacks.task_done.is_none() {
                state.callbacks.task_done = Some(callback);
            }
        }
        drop(info);

        let (conflict, progress) = {
            let mut state = self.state.borrow_mut();
            if state.generation != generation || !state.running {
                return Ok(());
            }

            let mut conflict = None;
            if !new_assets.is_empty() {
                match &manager {
                    Some(manager) => {
                        let mode = state.add_tasks(manager, Assets::List(new_assets));
                        if state.mode == LoadMode::Map && mode == LoadMode::List {
                            let keyless = state
                                .tasks
                                .iter()
                                .find(|slot| slot.info.id.is_none())
                                .map(|slot| format!("{:?}", slot.info.original))
                                .unwrap_or_default();
                            conflict = Some(AssetError::ModeConflict(keyless));
                        }
                    }
                    None => log::warn!("Asset manager is gone, discovered assets dropped"),
                }
            }

            state.num_loaded += 1;
            let progress = state.num_loaded as f32 / state.total as f32;
            (conflict, progress)
        };

        if let Some(err) = conflict {
            return Err(self.fail(err));
        }

        self.emit_progress(progress, generation);

        if self.state.borrow().generation == generation {
            self.start_tasks();
        }
        Ok(())
    }

    fn emit_progress(&self, progress: f32, generation: u64) {
        let callback = self.state.borrow_mut().callbacks.progress.take();
        if let Some(mut callback) = callback {
            callback(progress);
            let mut state = self.state.borrow_mut();
            if state.generation == generation && state.callbacks.progress.is_none() {
                state.callbacks.progress = Some(callback);
            }
        }
    }

    /// Deliver the aggregate and hand the session back to the manager
    fn finish(&self) {
        let (results, complete, manager) = {
            let mut state = self.state.borrow_mut();
            state.running = false;
            let mode = state.mode;
            let results = std::mem::replace(&mut state.results, LoadResults::empty(mode));
            log::info!("Load complete: {} of {} assets", state.num_loaded, state.total);
            (
                results,
                state.callbacks.complete.take(),
                state.manager.upgrade(),
            )
        };

        match manager {
            Some(manager) => AssetManager::from_inner(manager).release(self),
            None => self.reset(),
        }

        if let Some(complete) = complete {
            complete(results);
        }
    }

    /// Abort the whole session on a structural error
    fn fail(&self, err: AssetError) -> AssetError {
        log::error!("Load failed: {}", err);
        let (error, manager) = {
            let mut state = self.state.borrow_mut();
            (state.callbacks.error.take(), state.manager.upgrade())
        };

        match manager {
            Some(manager) => AssetManager::from_inner(manager).release(self),
            None => self.reset(),
        }

        if let Some(error) = error {
            error(&err);
        }
        err
    }

    /// Drop every tracked task and return to baseline state
    ///
    /// Completions still in flight are ignored when they arrive.
    pub fn reset(&self) {
        let garbage = self.state.borrow_mut().clear();
        drop(garbage);
    }

    /// Reset without dropping the old tasks and callbacks yet
    ///
    /// Lets the manager silence every session before any dropped completion
    /// handle can report into another one.
    pub(crate) fn reset_deferred(&self) -> impl Sized {
        self.state.borrow_mut().clear()
    }

    /// Get the result mode
    pub fn mode(&self) -> LoadMode {
        self.state.borrow().mode
    }

    /// Get the number of tasks added so far, including discovered ones
    pub fn total(&self) -> usize {
        self.state.borrow().total
    }

    /// Get the number of finished tasks
    pub fn num_loaded(&self) -> usize {
        self.state.borrow().num_loaded
    }

    /// Get `loaded / total`, or 0 before anything was added
    pub fn progress(&self) -> f32 {
        let state = self.state.borrow();
        if state.total == 0 {
            0.0
        } else {
            state.num_loaded as f32 / state.total as f32
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.borrow().running
    }

    /// Snapshot of the tracked tasks, in list order
    pub fn tasks(&self) -> Vec<TaskInfo> {
        self.state
            .borrow()
            .tasks
            .iter()
            .map(|slot| slot.info.clone())
            .collect()
    }

    /// Snapshot of the results gathered so far
    pub fn results(&self) -> LoadResults {
        self.state.borrow().results.clone()
    }
}

impl fmt::Debug for AssetLoad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("AssetLoad")
            .field("mode", &state.mode)
            .field("total", &state.total)
            .field("num_loaded", &state.num_loaded)
            .field("running", &state.running)
            .field("start_all", &state.start_all)
            .finish()
    }
}
