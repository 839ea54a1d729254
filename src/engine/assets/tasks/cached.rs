// Task completing immediately with an already cached value

use crate::engine::assets::content::AssetRef;
use crate::engine::assets::task::{Task, TaskContext, TaskDone};

pub(crate) struct CachedTask {
    value: AssetRef,
}

impl CachedTask {
    pub(crate) fn new(value: AssetRef) -> Self {
        Self { value }
    }
}

impl Task for CachedTask {
    fn start(self: Box<Self>, _ctx: TaskContext, done: TaskDone) {
        done.finish(Some(self.value));
    }
}
