// Asset runtime for 2D game clients

pub mod engine;
