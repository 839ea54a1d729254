// Engine modules: asset loading, sprites

pub mod assets;
pub mod sprites;
