pub mod config;
pub mod core;
pub mod geometry;
pub mod hardware;
pub mod pages;
pub mod params;
pub mod persistence;
pub mod pipeline;
pub mod render;
pub mod runtime;
pub mod task;
pub mod theme;

pub use crate::core::prelude;
