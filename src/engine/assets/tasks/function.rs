// Assets produced by an async function

use crate::engine::assets::descriptor::{AssetDescriptor, AsyncLoader};
use crate::engine::assets::task::{Task, TaskContext, TaskDone, TaskType};
use std::rc::Rc;

/// Claims descriptors carrying a loader function
pub struct FunctionTaskType;

impl TaskType for FunctionTaskType {
    fn name(&self) -> &'static str {
        "function"
    }

    fn test(&self, asset: &AssetDescriptor) -> bool {
        asset.loader.is_some()
    }

    fn create(&self, asset: Rc<AssetDescriptor>) -> Box<dyn Task> {
        Box::new(FunctionTask {
            loader: asset.loader.clone(),
        })
    }
}

struct FunctionTask {
    loader: Option<AsyncLoader>,
}

impl Task for FunctionTask {
    fn start(self: Box<Self>, _ctx: TaskContext, done: TaskDone) {
        match self.loader {
            Some(loader) => loader(Box::new(move |content| done.finish(content.map(Rc::new)))),
            None => done.finish(None),
        }
    }
}
