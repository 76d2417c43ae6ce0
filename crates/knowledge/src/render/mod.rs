//! Rendering: the abstract render system, its backends, and the scene
//! traversal built on top of them.

pub mod backends;
pub mod camera;
pub mod drawable;
pub mod light;
pub mod material;
pub mod material_script;
pub mod particle;
pub mod renderer;
pub mod sprite;
pub mod sticker;
pub mod system;
pub mod texture;
pub mod world;
