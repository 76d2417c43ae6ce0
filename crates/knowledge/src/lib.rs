//! # Knowledge
//!
//! A fixed-function 3D rendering core with two backends behind one
//! abstraction: a desktop-style immediate-mode render system and a
//! console-style render system with bounded software matrix stacks and
//! TEV register combiners.
//!
//! ## Features
//!
//! - **Polymorphic render system**: one trait, two hardware models
//! - **Frame pipeline**: sky, world, lit 3D pass, sprites, particles,
//!   Z-sorted 2D overlay
//! - **Frustum-culling camera** with ray projection from screen space
//! - **Script-defined materials** with multitexturing and animation
//! - **Render-to-texture** and screenshots
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use knowledge::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EngineConfig::default();
//!     let mut engine = EngineContext::new(&config)?;
//!
//!     let mut camera = Camera::new();
//!     camera.set_position(Vec3::new(0.0, 0.0, 10.0));
//!     engine.renderer_mut().set_camera(camera);
//!
//!     engine.draw_frame();
//!     engine.shutdown()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod context;
pub mod foundation;
pub mod render;

pub use config::{BackendKind, ConfigError, EngineConfig, WindowConfig};
pub use context::{EngineContext, EngineError};

/// Common imports for engine users.
pub mod prelude {
    pub use crate::{
        config::{BackendKind, EngineConfig},
        context::{EngineContext, EngineError},
        foundation::{
            color::Color,
            math::{Mat4, Quat, Vec2, Vec3},
            time::Stopwatch,
        },
        render::{
            camera::Camera,
            drawable::{BoundingBox, Drawable2D, Drawable3D, Node2, Node3},
            light::Light,
            material::{Material, MaterialRegistry, MaterialStage},
            particle::PointEmitter,
            renderer::Renderer,
            sprite::Sprite,
            sticker::Sticker,
            system::{RenderError, RenderSystem},
            world::World,
        },
    };
}
