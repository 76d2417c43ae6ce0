//! The composition root.
//!
//! [`EngineContext`] wires the configured backend, the renderer and the
//! material registry together with plain owned instances. There are no
//! globals; applications hold the context and borrow the parts they
//! need.

use log::info;
use thiserror::Error;

use crate::config::{BackendKind, ConfigError, EngineConfig};
use crate::render::backends::flipper::FlipperRenderSystem;
use crate::render::backends::immediate::ImmediateRenderSystem;
use crate::render::material::MaterialRegistry;
use crate::render::renderer::Renderer;
use crate::render::system::{RenderError, RenderSystem};

/// Errors surfaced while building or tearing down the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration loading or parsing failed.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The render system failed a lifecycle operation.
    #[error("render system error: {0}")]
    Render(#[from] RenderError),
}

/// Owns every engine subsystem for one application.
pub struct EngineContext {
    render_system: Box<dyn RenderSystem>,
    renderer: Renderer,
    materials: MaterialRegistry,
}

impl EngineContext {
    /// Boot the configured backend and create the output window.
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        let mut render_system: Box<dyn RenderSystem> = match config.backend {
            BackendKind::Immediate => Box::new(ImmediateRenderSystem::new()),
            BackendKind::Flipper => Box::new(FlipperRenderSystem::new()),
        };

        render_system.initialize()?;
        render_system.configure()?;
        render_system.create_window(config.window.width, config.window.height)?;
        render_system.set_window_title(&config.window.title);

        info!(
            "engine up: {:?} backend, {}x{}",
            config.backend, config.window.width, config.window.height
        );

        Ok(Self {
            render_system,
            renderer: Renderer::new(),
            materials: MaterialRegistry::new(),
        })
    }

    /// The render system.
    pub fn render_system(&self) -> &dyn RenderSystem {
        self.render_system.as_ref()
    }

    /// Mutable render system access.
    pub fn render_system_mut(&mut self) -> &mut dyn RenderSystem {
        self.render_system.as_mut()
    }

    /// The renderer.
    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    /// Mutable renderer access.
    pub fn renderer_mut(&mut self) -> &mut Renderer {
        &mut self.renderer
    }

    /// The material registry.
    pub fn materials(&self) -> &MaterialRegistry {
        &self.materials
    }

    /// Mutable material registry access.
    pub fn materials_mut(&mut self) -> &mut MaterialRegistry {
        &mut self.materials
    }

    /// Run one frame of the renderer pipeline.
    pub fn draw_frame(&mut self) {
        self.renderer
            .draw(self.render_system.as_mut(), &mut self.materials);
    }

    /// Tear the engine down, destroying the window and releasing the
    /// graphics context.
    pub fn shutdown(&mut self) -> Result<(), EngineError> {
        self.render_system.destroy_window();
        self.render_system.deinitialize()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boots_each_backend_from_config() {
        let mut config = EngineConfig::default();
        let mut context = EngineContext::new(&config).unwrap();
        assert_eq!(context.render_system().screen_width(), 640);
        context.shutdown().unwrap();

        config.backend = BackendKind::Flipper;
        config.window.width = 320;
        config.window.height = 240;
        let mut context = EngineContext::new(&config).unwrap();
        assert_eq!(context.render_system().screen_width(), 320);
        assert!(!context.render_system().point_sprite_support());
        context.shutdown().unwrap();
    }

    #[test]
    fn draw_frame_runs_the_pipeline() {
        let config = EngineConfig::default();
        let mut context = EngineContext::new(&config).unwrap();
        context.draw_frame();
        context.draw_frame();
        context.shutdown().unwrap();
    }
}
