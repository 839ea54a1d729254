// Composite lists loaded as a nested session

use crate::engine::assets::descriptor::AssetDescriptor;
use crate::engine::assets::load::LoadOptions;
use crate::engine::assets::task::{Task, TaskContext, TaskDone, TaskType};
use std::rc::Rc;

/// Claims descriptors with nested `assets`
pub struct ListTaskType;

impl TaskType for ListTaskType {
    fn name(&self) -> &'static str {
        "list"
    }

    fn test(&self, asset: &AssetDescriptor) -> bool {
        asset.assets.is_some()
    }

    fn create(&self, asset: Rc<AssetDescriptor>) -> Box<dyn Task> {
        Box::new(ListTask { asset })
    }
}

struct ListTask {
    asset: Rc<AssetDescriptor>,
}

impl Task for ListTask {
    fn start(self: Box<Self>, ctx: TaskContext, done: TaskDone) {
        let Some(assets) = self.asset.assets.as_deref().cloned() else {
            done.finish(None);
            return;
        };

        let mut options = LoadOptions::new()
            .with_cache_all(self.asset.cache_all)
            .on_complete(move |results| done.finish(results.into_content()));
        if let Some(type_tag) = &self.asset.type_tag {
            options = options.with_type(type_tag.clone());
        }

        ctx.load(assets, options);
    }
}
