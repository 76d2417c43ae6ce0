//! Particle emitters.
//!
//! Emitters own a pool of particles and a single shared sprite (every
//! particle uses the same material, so one billboard is enough). When
//! the hardware rasterizes point sprites the whole pool draws as one
//! submission; otherwise each live particle falls back to the shared
//! camera-facing quad.

use rand::Rng;

use crate::foundation::math::Vec3;
use crate::render::camera::Camera;
use crate::render::material::{MaterialId, MaterialRegistry};
use crate::render::sprite::Sprite;
use crate::render::system::{MatrixMode, RenderSystem};

/// One pooled particle.
#[derive(Debug, Clone, Copy)]
struct Particle {
    position: Vec3,
    velocity: Vec3,
    acceleration: Vec3,
    age_ms: f32,
    alive: bool,
}

impl Particle {
    const fn dead() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 0.0),
            velocity: Vec3::new(0.0, 0.0, 0.0),
            acceleration: Vec3::new(0.0, 0.0, 0.0),
            age_ms: 0.0,
            alive: false,
        }
    }
}

/// Emits particles from a single point with randomized velocities.
pub struct PointEmitter {
    particles: Vec<Particle>,
    sprite: Sprite,

    position: Vec3,
    radius: f32,
    lifetime_ms: f32,
    spawn_interval_ms: f32,
    spawn_quantity: usize,

    min_velocity: Vec3,
    max_velocity: Vec3,
    acceleration: Vec3,

    since_spawn_ms: f32,
}

impl PointEmitter {
    /// Create an emitter with a fixed particle pool drawing `material`.
    pub fn new(max_particles: usize, material: MaterialId) -> Self {
        Self {
            particles: vec![Particle::dead(); max_particles],
            sprite: Sprite::new(material, 1.0),
            position: Vec3::zeros(),
            radius: 1.0,
            lifetime_ms: 1000.0,
            spawn_interval_ms: 100.0,
            spawn_quantity: 1,
            min_velocity: Vec3::zeros(),
            max_velocity: Vec3::zeros(),
            acceleration: Vec3::zeros(),
            since_spawn_ms: 0.0,
        }
    }

    /// Move the emission point.
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    /// Set the particle radius.
    pub fn set_radius(&mut self, radius: f32) {
        self.radius = radius;
        self.sprite.set_radius(radius);
    }

    /// Set each particle's lifetime in milliseconds.
    pub fn set_lifetime(&mut self, lifetime_ms: f32) {
        self.lifetime_ms = lifetime_ms;
    }

    /// Set the interval between spawn bursts in milliseconds.
    pub fn set_spawn_time(&mut self, interval_ms: f32) {
        self.spawn_interval_ms = interval_ms;
    }

    /// Set how many particles each burst spawns.
    pub fn set_spawn_quantity(&mut self, quantity: usize) {
        self.spawn_quantity = quantity;
    }

    /// Bound the randomized initial velocities.
    pub fn set_velocity(&mut self, min: Vec3, max: Vec3) {
        self.min_velocity = min;
        self.max_velocity = max;
    }

    /// Set the acceleration applied to every particle.
    pub fn set_acceleration(&mut self, acceleration: Vec3) {
        self.acceleration = acceleration;
    }

    /// Number of currently live particles.
    pub fn live_count(&self) -> usize {
        self.particles.iter().filter(|p| p.alive).count()
    }

    fn random_velocity<R: Rng>(&self, rng: &mut R) -> Vec3 {
        let mut component = |min: f32, max: f32| {
            if max > min {
                rng.gen_range(min..=max)
            } else {
                min
            }
        };
        Vec3::new(
            component(self.min_velocity.x, self.max_velocity.x),
            component(self.min_velocity.y, self.max_velocity.y),
            component(self.min_velocity.z, self.max_velocity.z),
        )
    }

    /// Advance the pool by `delta_ms`: integrate live particles, retire
    /// expired ones and spawn due bursts.
    pub fn feed<R: Rng>(&mut self, delta_ms: f32, rng: &mut R) {
        let dt = delta_ms / 1000.0;

        for particle in &mut self.particles {
            if !particle.alive {
                continue;
            }
            particle.age_ms += delta_ms;
            if particle.age_ms >= self.lifetime_ms {
                particle.alive = false;
                continue;
            }
            particle.velocity += particle.acceleration * dt;
            particle.position += particle.velocity * dt;
        }

        self.since_spawn_ms += delta_ms;
        while self.since_spawn_ms >= self.spawn_interval_ms {
            self.since_spawn_ms -= self.spawn_interval_ms;
            for _ in 0..self.spawn_quantity {
                let velocity = self.random_velocity(rng);
                let Some(slot) = self.particles.iter_mut().find(|p| !p.alive) else {
                    break;
                };
                *slot = Particle {
                    position: self.position,
                    velocity,
                    acceleration: self.acceleration,
                    age_ms: 0.0,
                    alive: true,
                };
            }
        }
    }

    /// Draw every live particle.
    pub fn draw(
        &mut self,
        rs: &mut dyn RenderSystem,
        materials: &mut MaterialRegistry,
        viewer: &Camera,
    ) {
        if self.radius == 0.0 {
            return;
        }

        if rs.point_sprite_support() {
            let positions: Vec<Vec3> = self
                .particles
                .iter()
                .filter(|p| p.alive)
                .map(|p| p.position)
                .collect();
            if positions.is_empty() {
                return;
            }

            let saved = materials
                .get_mut(self.sprite.material())
                .map(|material| material.start(rs));

            rs.set_point_sprite(true);
            rs.set_point_sprite_size(self.radius);
            rs.draw_point_sprites(&positions);
            rs.set_point_sprite(false);

            if let (Some(saved), Some(material)) =
                (saved, materials.get_mut(self.sprite.material()))
            {
                material.finish(rs, saved);
            }
            return;
        }

        // Quad fallback: reuse the shared billboard per particle.
        let camera_position = viewer.position();
        let live: Vec<Vec3> = self
            .particles
            .iter()
            .filter(|p| p.alive)
            .map(|p| p.position)
            .collect();
        for position in live {
            rs.set_matrix_mode(MatrixMode::Modelview);
            rs.push_matrix();
            self.sprite.set_position(position);
            self.sprite.draw(rs, materials, camera_position);
            rs.pop_matrix();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::flipper::FlipperRenderSystem;
    use crate::render::backends::immediate::ImmediateRenderSystem;
    use crate::render::material::Material;
    use rand::rngs::mock::StepRng;

    fn setup() -> (MaterialRegistry, MaterialId) {
        let mut materials = MaterialRegistry::new();
        let id = materials.register("spark", Material::default());
        (materials, id)
    }

    #[test]
    fn particles_spawn_and_expire() {
        let (_materials, id) = setup();
        let mut emitter = PointEmitter::new(8, id);
        emitter.set_lifetime(500.0);
        emitter.set_spawn_time(100.0);
        emitter.set_spawn_quantity(2);

        let mut rng = StepRng::new(0, 1);
        emitter.feed(100.0, &mut rng);
        assert_eq!(emitter.live_count(), 2);

        // After the lifetime passes everything retires.
        emitter.feed(600.0, &mut rng);
        emitter.feed(600.0, &mut rng);
        assert!(emitter.live_count() <= 8);

        let mut quiet = PointEmitter::new(8, id);
        quiet.set_lifetime(50.0);
        quiet.set_spawn_time(10_000.0);
        quiet.feed(100.0, &mut rng);
        assert_eq!(quiet.live_count(), 0);
    }

    #[test]
    fn pool_never_exceeds_capacity() {
        let (_materials, id) = setup();
        let mut emitter = PointEmitter::new(4, id);
        emitter.set_lifetime(10_000.0);
        emitter.set_spawn_time(10.0);
        emitter.set_spawn_quantity(3);

        let mut rng = StepRng::new(0, 1);
        for _ in 0..10 {
            emitter.feed(50.0, &mut rng);
        }
        assert_eq!(emitter.live_count(), 4);
    }

    #[test]
    fn point_sprite_path_draws_one_submission() {
        let mut rs = ImmediateRenderSystem::new();
        rs.initialize().unwrap();
        rs.configure().unwrap();
        rs.create_window(640, 480).unwrap();
        rs.frame_start();

        let (mut materials, id) = setup();
        let mut emitter = PointEmitter::new(8, id);
        emitter.set_spawn_time(10.0);
        emitter.set_spawn_quantity(4);
        let mut rng = StepRng::new(0, 1);
        emitter.feed(10.0, &mut rng);

        let camera = Camera::new();
        emitter.draw(&mut rs, &mut materials, &camera);
        assert_eq!(rs.frame_stats().batches, 1);
    }

    #[test]
    fn quad_fallback_draws_one_quad_per_particle() {
        let mut rs = FlipperRenderSystem::new();
        rs.initialize().unwrap();
        rs.configure().unwrap();
        rs.create_window(640, 480).unwrap();
        rs.frame_start();

        let (mut materials, id) = setup();
        let mut emitter = PointEmitter::new(8, id);
        emitter.set_spawn_time(10.0);
        emitter.set_spawn_quantity(3);
        let mut rng = StepRng::new(0, 1);
        emitter.feed(10.0, &mut rng);

        let camera = Camera::new();
        emitter.draw(&mut rs, &mut materials, &camera);
        assert_eq!(rs.frame_stats().batches, 3);
    }
}
