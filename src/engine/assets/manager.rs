// Central asset management system

use super::cache::AssetCache;
use super::config::AssetConfig;
use super::descriptor::{AssetDescriptor, Assets};
use super::load::{AssetLoad, LoadOptions, LoadResults};
use super::registry::TaskRegistry;
use super::sizes::{AssetSizes, SizeNegotiator};
use super::task::TaskType;
use super::tasks;
use super::transport::Transport;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

pub(crate) struct ManagerInner {
    registry: RefCell<TaskRegistry>,
    cache: AssetCache,
    transport: Rc<dyn Transport>,
    sizes: Rc<dyn SizeNegotiator>,

    /// Finished sessions waiting to be reused
    pool: RefCell<Vec<AssetLoad>>,

    /// Sessions currently loading
    active: RefCell<Vec<AssetLoad>>,

    start_all: bool,
    cache_all: bool,
}

/// Entry point for all asset loading
///
/// Owns the task registry, the shared cache and a pool of load sessions.
/// A cheap handle; clones share the same manager. Independent loads run side
/// by side, each with its own session and concurrency policy.
#[derive(Clone)]
pub struct AssetManager {
    inner: Rc<ManagerInner>,
}

impl AssetManager {
    /// Create a manager with the built-in task types and default size profiles
    pub fn new(transport: Rc<dyn Transport>) -> Self {
        Self::with_sizes(transport, Rc::new(AssetSizes::default()))
    }

    /// Create a manager with a custom size negotiator
    pub fn with_sizes(transport: Rc<dyn Transport>, sizes: Rc<dyn SizeNegotiator>) -> Self {
        Self::build(transport, sizes, true, false)
    }

    /// Create a manager from configuration
    pub fn with_config(config: &AssetConfig, transport: Rc<dyn Transport>) -> Self {
        let sizes = AssetSizes::new(config.sizes.clone());
        sizes.refresh(config.display_width, config.display_height);
        Self::build(transport, Rc::new(sizes), config.start_all, config.cache_all)
    }

    fn build(
        transport: Rc<dyn Transport>,
        sizes: Rc<dyn SizeNegotiator>,
        start_all: bool,
        cache_all: bool,
    ) -> Self {
        let manager = Self {
            inner: Rc::new(ManagerInner {
                registry: RefCell::new(TaskRegistry::new()),
                cache: AssetCache::new(),
                transport,
                sizes,
                pool: RefCell::new(Vec::new()),
                active: RefCell::new(Vec::new()),
                start_all,
                cache_all,
            }),
        };
        tasks::register_builtin(&manager);
        manager
    }

    pub(crate) fn from_inner(inner: Rc<ManagerInner>) -> Self {
        Self { inner }
    }

    /// Register a task type
    ///
    /// More specific types must use a higher priority than the generic ones
    /// they overlap with. Equal priorities match in registration order.
    pub fn register(&self, task_type: impl TaskType + 'static, priority: i32) {
        self.inner
            .registry
            .borrow_mut()
            .register(Rc::new(task_type), priority);
    }

    /// Find the task type that claims a descriptor
    pub fn find_task_type(&self, asset: &AssetDescriptor) -> Option<Rc<dyn TaskType>> {
        self.inner.registry.borrow().find(asset)
    }

    /// Names of the registered task types, in match order
    pub fn task_types(&self) -> Vec<&'static str> {
        self.inner.registry.borrow().names()
    }

    /// Default options for a load, following the manager's configuration
    pub fn options(&self) -> LoadOptions {
        LoadOptions::new()
            .with_start_all(self.inner.start_all)
            .with_cache_all(self.inner.cache_all)
    }

    /// Load assets
    ///
    /// Returns the session handle. The session may already be complete when
    /// this returns if every task finished synchronously.
    pub fn load(&self, assets: impl Into<Assets>, options: LoadOptions) -> AssetLoad {
        let session = self
            .inner
            .pool
            .borrow_mut()
            .pop()
            .unwrap_or_else(|| AssetLoad::new(Rc::downgrade(&self.inner)));
        self.inner.active.borrow_mut().push(session.clone());

        session.setup(assets, options);
        session
    }

    /// Load assets with only a completion callback
    pub fn load_with(
        &self,
        assets: impl Into<Assets>,
        complete: impl FnOnce(LoadResults) + 'static,
    ) -> AssetLoad {
        self.load(assets, self.options().on_complete(complete))
    }

    /// Take a finished session back into the pool
    pub(crate) fn release(&self, load: &AssetLoad) {
        let was_active = {
            let mut active = self.inner.active.borrow_mut();
            let before = active.len();
            active.retain(|session| !session.ptr_eq(load));
            active.len() != before
        };

        load.reset();
        if was_active {
            self.inner.pool.borrow_mut().push(load.clone());
        }
    }

    /// The shared cache
    pub fn cache(&self) -> &AssetCache {
        &self.inner.cache
    }

    pub fn transport(&self) -> Rc<dyn Transport> {
        self.inner.transport.clone()
    }

    pub fn sizes(&self) -> Rc<dyn SizeNegotiator> {
        self.inner.sizes.clone()
    }

    /// Number of sessions currently loading
    pub fn active_sessions(&self) -> usize {
        self.inner.active.borrow().len()
    }

    /// Number of idle sessions ready for reuse
    pub fn pooled_sessions(&self) -> usize {
        self.inner.pool.borrow().len()
    }

    /// Cancel every session, drop the pool and empty the cache
    ///
    /// Completions still in flight are ignored when they arrive.
    pub fn destroy(&self) {
        let active: Vec<AssetLoad> = self.inner.active.borrow_mut().drain(..).collect();
        let garbage: Vec<_> = active.iter().map(AssetLoad::reset_deferred).collect();
        self.inner.pool.borrow_mut().clear();
        drop(garbage);

        self.inner.cache.empty();
        log::info!("Asset manager destroyed, {} loads cancelled", active.len());
    }
}

impl fmt::Debug for AssetManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetManager")
            .field("task_types", &self.task_types())
            .field("cached", &self.inner.cache.len())
            .field("active", &self.active_sessions())
            .field("pooled", &self.pooled_sessions())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::assets::content::AssetContent;
    use crate::engine::assets::load::LoadMode;
    use crate::engine::assets::sizes::AssetSize;
    use crate::engine::assets::task::{Task, TaskContext, TaskDone};
    use crate::engine::assets::AssetError;
    use crate::engine::assets::testing::{
        capture, manager_with, png_bytes, text_of, CountingResource, MockTransport,
    };
    use approx::assert_relative_eq;
    use image::{Rgba, RgbaImage};
    use std::cell::Cell;

    #[test]
    fn test_builtin_types_in_match_order() {
        let manager = manager_with(&Rc::new(MockTransport::new()));
        assert_eq!(
            manager.task_types(),
            vec!["color_alpha", "manifest", "list", "function", "load"]
        );
    }

    #[test]
    fn test_options_follow_config() {
        let config = AssetConfig {
            start_all: false,
            cache_all: true,
            ..AssetConfig::default()
        };
        let manager = AssetManager::with_config(&config, Rc::new(MockTransport::new()));

        let options = manager.options();
        assert!(!options.start_all);
        assert!(options.cache_all);
    }

    #[test]
    fn test_custom_type_outranks_generic_load() {
        struct Stub;
        struct StubTask;

        impl TaskType for Stub {
            fn name(&self) -> &'static str {
                "stub"
            }
            fn test(&self, asset: &AssetDescriptor) -> bool {
                asset.src.as_deref().is_some_and(|src| src.ends_with(".stub"))
            }
            fn create(&self, _asset: Rc<AssetDescriptor>) -> Box<dyn Task> {
                Box::new(StubTask)
            }
        }

        impl Task for StubTask {
            fn start(self: Box<Self>, _ctx: TaskContext, done: TaskDone) {
                done.finish(Some(Rc::new(AssetContent::from("stubbed"))));
            }
        }

        let transport = Rc::new(MockTransport::new());
        let manager = manager_with(&transport);
        manager.register(Stub, 5);
        assert_eq!(manager.task_types()[4], "stub");

        let (options, captured) = capture(LoadOptions::new());
        manager.load("thing.stub", options);

        let results = captured.borrow_mut().take().unwrap();
        assert_eq!(text_of(results.single()).as_deref(), Some("stubbed"));
        assert!(transport.fetched().is_empty());
    }

    #[test]
    fn test_finished_sessions_are_recycled() {
        let transport = Rc::new(MockTransport::new().with_file("a.txt", "A"));
        let manager = manager_with(&transport);

        let first = manager.load("a.txt", LoadOptions::new());
        assert_eq!(manager.active_sessions(), 0);
        assert_eq!(manager.pooled_sessions(), 1);
        assert!(!first.is_running());
        assert_eq!(first.total(), 0);

        let second = manager.load("a.txt", LoadOptions::new().with_auto_start(false));
        assert!(first.ptr_eq(&second));
        assert_eq!(manager.pooled_sessions(), 0);
        assert_eq!(manager.active_sessions(), 1);
    }

    #[test]
    fn test_concurrent_loads_keep_their_own_policy() {
        let transport = Rc::new(
            MockTransport::deferred()
                .with_file("a.txt", "A")
                .with_file("b.txt", "B")
                .with_file("c.txt", "C")
                .with_file("d.txt", "D"),
        );
        let manager = manager_with(&transport);
        let (serial, serial_done) = capture(LoadOptions::new().serial());
        let (parallel, parallel_done) = capture(LoadOptions::new());

        let first = manager.load(["a.txt", "b.txt"], serial);
        let second = manager.load(["c.txt", "d.txt"], parallel);
        assert!(!first.ptr_eq(&second));
        assert_eq!(manager.active_sessions(), 2);
        assert_eq!(transport.pending_urls(), vec!["a.txt", "c.txt", "d.txt"]);

        transport.release("c.txt");
        transport.release("d.txt");
        assert!(parallel_done.borrow().is_some());
        assert!(serial_done.borrow().is_none());

        transport.release_all();
        assert_eq!(serial_done.borrow().as_ref().unwrap().len(), 2);
        assert_eq!(manager.pooled_sessions(), 2);
    }

    #[test]
    fn test_manifest_entries_join_the_load() {
        let transport = Rc::new(
            MockTransport::new()
                .with_file("level.json", r#"{"bg": "bg.txt", "fg": {"src": "fg.txt"}}"#)
                .with_file("bg.txt", "BG")
                .with_file("fg.txt", "FG"),
        );
        let manager = manager_with(&transport);
        let progress = Rc::new(RefCell::new(Vec::new()));
        let sink = progress.clone();
        let (options, captured) = capture(LoadOptions::new().on_progress(move |p| sink.borrow_mut().push(p)));

        let load = manager.load(
            Assets::map([("level", AssetDescriptor::manifest("level.json"))]),
            options,
        );

        let results = captured.borrow_mut().take().unwrap();
        let keys: Vec<&String> = results.map().unwrap().keys().collect();
        assert_eq!(keys, vec!["level", "bg", "fg"]);
        assert!(results.get("level").unwrap().as_json().is_some());
        assert_eq!(text_of(results.get("fg")).as_deref(), Some("FG"));
        assert!(!load.is_running());

        let progress = progress.borrow();
        assert_relative_eq!(progress[0], 1.0 / 3.0);
        assert_relative_eq!(*progress.last().unwrap(), 1.0);
    }

    #[test]
    fn test_listed_manifest_conflicts_with_keyed_load() {
        let transport = Rc::new(
            MockTransport::new()
                .with_file("level.json", r#"["bg.txt"]"#)
                .with_file("bg.txt", "BG"),
        );
        let manager = manager_with(&transport);
        let failed = Rc::new(Cell::new(false));
        let flag = failed.clone();
        let (options, captured) = capture(LoadOptions::new().on_error(move |err| {
            flag.set(matches!(err, AssetError::ModeConflict(_)));
        }));

        manager.load(
            Assets::map([("level", AssetDescriptor::manifest("level.json"))]),
            options,
        );

        assert!(failed.get());
        assert!(captured.borrow().is_none());
        assert_eq!(transport.fetched(), vec!["level.json"]);
    }

    #[test]
    fn test_manifest_in_list_load() {
        let transport = Rc::new(
            MockTransport::new()
                .with_file("level.json", r#"["bg.txt"]"#)
                .with_file("bg.txt", "BG"),
        );
        let manager = manager_with(&transport);
        let (options, captured) = capture(LoadOptions::new());

        manager.load(vec![AssetDescriptor::manifest("level.json")], options);

        let results = captured.borrow_mut().take().unwrap();
        assert_eq!(results.mode(), LoadMode::List);
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_composite_list_asset() {
        let transport = Rc::new(
            MockTransport::new()
                .with_file("a.txt", "A")
                .with_file("b.txt", "B"),
        );
        let manager = manager_with(&transport);
        let (options, captured) = capture(LoadOptions::new());

        let pack = AssetDescriptor::list(["a.txt", "b.txt"]);
        manager.load(Assets::map([("pack", pack)]), options);

        let results = captured.borrow_mut().take().unwrap();
        let items = results.get("pack").unwrap().as_list().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(manager.active_sessions(), 0);
    }

    #[test]
    fn test_composite_of_cached_assets_completes() {
        let transport = Rc::new(MockTransport::new());
        let manager = manager_with(&transport);
        manager.cache().write("a", Rc::new(AssetContent::from("cached a")));
        manager.cache().write("b", Rc::new(AssetContent::from("cached b")));
        let (options, captured) = capture(LoadOptions::new());

        let pack = AssetDescriptor::list(vec![
            AssetDescriptor::src("a.txt").with_cache(true),
            AssetDescriptor::src("b.txt").with_cache(true),
        ]);
        manager.load(pack, options);

        let results = captured.borrow_mut().take().unwrap();
        let items = results.single().unwrap().as_map().unwrap();
        assert_eq!(text_of(items["a"].as_ref()).as_deref(), Some("cached a"));
        assert_eq!(text_of(items["b"].as_ref()).as_deref(), Some("cached b"));
        assert!(transport.fetched().is_empty());
    }

    #[test]
    fn test_empty_composite_completes() {
        let manager = manager_with(&Rc::new(MockTransport::new()));
        let (options, captured) = capture(LoadOptions::new());

        manager.load(AssetDescriptor::list(Assets::List(Vec::new())), options);

        let results = captured.borrow_mut().take().unwrap();
        assert!(results.single().unwrap().as_map().unwrap().is_empty());
    }

    #[test]
    fn test_cache_hit_keeps_value_alive() {
        let manager = manager_with(&Rc::new(MockTransport::new()));
        let destroyed = Rc::new(Cell::new(0));
        let value = Rc::new(AssetContent::Resource(Box::new(CountingResource::new(destroyed.clone()))));
        manager.cache().write("hero", value.clone());
        let (options, captured) = capture(LoadOptions::new());

        manager.load(AssetDescriptor::src("img/hero.png").with_cache(true), options);

        let results = captured.borrow_mut().take().unwrap();
        assert!(Rc::ptr_eq(results.single().unwrap(), &value));
        assert_eq!(destroyed.get(), 0);
        assert!(Rc::ptr_eq(&manager.cache().read("hero").unwrap(), &value));
    }

    #[test]
    fn test_uncached_load_bypasses_cache() {
        let transport = Rc::new(MockTransport::new().with_file("hero.txt", "fresh"));
        let manager = manager_with(&transport);
        manager.cache().write("hero", Rc::new(AssetContent::from("stale")));
        let (options, captured) = capture(LoadOptions::new());

        manager.load(AssetDescriptor::src("hero.txt").with_id("hero"), options);

        let results = captured.borrow_mut().take().unwrap();
        assert_eq!(text_of(results.single()).as_deref(), Some("fresh"));
        assert_eq!(text_of(manager.cache().read("hero").as_ref()).as_deref(), Some("stale"));
    }

    #[test]
    fn test_color_alpha_asset() {
        let color = RgbaImage::from_pixel(2, 2, Rgba([200, 100, 50, 255]));
        let alpha = RgbaImage::from_pixel(2, 2, Rgba([64, 0, 0, 255]));
        let transport = Rc::new(
            MockTransport::new()
                .with_file("ship.png", png_bytes(&color))
                .with_file("ship_alpha.png", png_bytes(&alpha)),
        );
        let manager = manager_with(&transport);
        let (options, captured) = capture(LoadOptions::new());

        manager.load(
            AssetDescriptor::color_alpha("ship.png", "ship_alpha.png").with_cache(true),
            options,
        );

        let results = captured.borrow_mut().take().unwrap();
        let image = results.single().unwrap().as_image().unwrap();
        assert_eq!(image.dimensions(), (2, 2));
        assert_eq!(image.pixels().unwrap().get_pixel(0, 1).0, [200, 100, 50, 64]);
        assert!(manager.cache().contains("ship"));
    }

    #[test]
    fn test_size_token_resolves_profile() {
        let transport = Rc::new(MockTransport::new().with_file("img/sd/bg.txt", "small"));
        let sizes = AssetSizes::new(vec![AssetSize::new("sd", 800, 0.5), AssetSize::new("hd", 1600, 1.0)]);
        sizes.refresh(640, 480);
        let manager = AssetManager::with_sizes(transport.clone(), Rc::new(sizes));

        let scale = Rc::new(Cell::new(None));
        let seen = scale.clone();
        let (options, captured) = capture(
            LoadOptions::new().on_task_done(move |_, original, _| seen.set(original.scale())),
        );
        manager.load("img/%SIZE%/bg.txt", options);

        assert_eq!(transport.fetched(), vec!["img/sd/bg.txt"]);
        assert_eq!(scale.get(), Some(0.5));
        let results = captured.borrow_mut().take().unwrap();
        assert_eq!(text_of(results.single()).as_deref(), Some("small"));
    }

    #[test]
    fn test_destroy_cancels_loads_and_empties_cache() {
        let transport = Rc::new(MockTransport::deferred().with_file("a.txt", "A"));
        let manager = manager_with(&transport);
        let destroyed = Rc::new(Cell::new(0));
        manager.cache().write(
            "res",
            Rc::new(AssetContent::Resource(Box::new(CountingResource::new(destroyed.clone())))),
        );
        let (options, captured) = capture(LoadOptions::new());

        let load = manager.load(["a.txt"], options);
        manager.destroy();

        assert_eq!(destroyed.get(), 1);
        assert!(manager.cache().is_empty());
        assert_eq!(manager.active_sessions(), 0);
        assert_eq!(manager.pooled_sessions(), 0);
        assert!(!load.is_running());

        transport.release_all();
        assert!(captured.borrow().is_none());
    }
}
