//! Virtual point lights.
//!
//! Lights are engine-side descriptions; the renderer copies the
//! parameters of the lights in range of an object into consecutive
//! hardware slots right before that object draws.

use crate::foundation::color::Color;
use crate::foundation::math::Vec3;
use crate::render::drawable::{absolute_position, Arena3, ObjectKey};

/// A point light covering a spherical range.
///
/// Objects outside the range are lit without it. Defaults: enabled,
/// range 300, half-grey ambient and specular, white diffuse, constant
/// attenuation.
#[derive(Debug, Clone)]
pub struct Light {
    enabled: bool,
    range: f32,
    position: Vec3,
    attenuation: Vec3,
    diffuse: Color,
    specular: Color,
    ambient: Color,
    attach: Option<ObjectKey>,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            enabled: true,
            range: 300.0,
            position: Vec3::zeros(),
            attenuation: Vec3::new(1.0, 0.0, 0.0),
            diffuse: Color::WHITE,
            specular: Color::grey(0.5),
            ambient: Color::grey(0.5),
            attach: None,
        }
    }
}

impl Light {
    /// Create a light with default parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable the light.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Whether the light participates in lighting.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Attach the light to a drawable; its position becomes relative
    /// to that drawable's absolute position.
    pub fn set_attach(&mut self, attach: Option<ObjectKey>) {
        self.attach = attach;
    }

    /// Drawable the light is attached to.
    pub fn attach(&self) -> Option<ObjectKey> {
        self.attach
    }

    /// Set the light position in world space (or relative to the
    /// attached drawable).
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    /// World-space position, resolving the attachment if any.
    pub fn position(&self, arena: &Arena3) -> Vec3 {
        match self.attach.and_then(|key| arena.get(key)) {
            Some(obj) => absolute_position(arena, obj.node()) + self.position,
            None => self.position,
        }
    }

    /// Whether an object position falls within the light's range.
    pub fn is_in_range(&self, arena: &Arena3, object_position: Vec3) -> bool {
        (self.position(arena) - object_position).norm() <= self.range
    }

    /// Set the covered range.
    pub fn set_range(&mut self, range: f32) {
        self.range = range;
    }

    /// The covered range.
    pub fn range(&self) -> f32 {
        self.range
    }

    /// Set constant/linear/quadratic attenuation.
    pub fn set_attenuation(&mut self, attenuation: Vec3) {
        self.attenuation = attenuation;
    }

    /// Constant/linear/quadratic attenuation.
    pub fn attenuation(&self) -> Vec3 {
        self.attenuation
    }

    /// Set the diffuse color.
    pub fn set_diffuse(&mut self, diffuse: Color) {
        self.diffuse = diffuse;
    }

    /// Diffuse color.
    pub fn diffuse(&self) -> Color {
        self.diffuse
    }

    /// Set the specular color.
    pub fn set_specular(&mut self, specular: Color) {
        self.specular = specular;
    }

    /// Specular color.
    pub fn specular(&self) -> Color {
        self.specular
    }

    /// Set the ambient color.
    pub fn set_ambient(&mut self, ambient: Color) {
        self.ambient = ambient;
    }

    /// Ambient color.
    pub fn ambient(&self) -> Color {
        self.ambient
    }
}
