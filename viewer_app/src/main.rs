//! Viewer demo application.
//!
//! Boots a backend from `viewer.toml` (falling back to defaults),
//! builds a small lit scene with a scripted material, runs a handful of
//! frames and writes a screenshot next to the executable.

use knowledge::prelude::*;
use knowledge::render::drawable::BoundingBox;
use knowledge::render::material::MaterialId;
use knowledge::render::material_script::parse_material_script;
use knowledge::render::system::VertexMode;

const CONFIG_PATH: &str = "viewer.toml";
const FRAME_COUNT: u32 = 8;

const CHECKER_SCRIPT: &str = r#"
material checker {
    ambient 0.3 0.3 0.3
    diffuse 0.9 0.9 0.9
    cull back
    texture {
        filename "checker.png"
        texenv modulate
        scroll 0.05 0.0
    }
}
"#;

/// A unit cube drawn through the immediate path.
struct Cube {
    node: Node3,
    material: MaterialId,
}

impl Cube {
    fn new(material: MaterialId, position: Vec3) -> Self {
        let mut node = Node3::default();
        node.position = position;
        Self { node, material }
    }
}

impl Drawable3D for Cube {
    fn node(&self) -> &Node3 {
        &self.node
    }

    fn node_mut(&mut self) -> &mut Node3 {
        &mut self.node
    }

    fn draw(&mut self, rs: &mut dyn RenderSystem, materials: &mut MaterialRegistry) {
        let saved = materials
            .get_mut(self.material)
            .map(|material| material.start(rs));

        let p = self.node.position;
        rs.translate_scene(p.x, p.y, p.z);

        // Six faces, normals outward.
        let faces: [(Vec3, [Vec3; 4]); 6] = [
            (Vec3::z(), [
                Vec3::new(-1.0, -1.0, 1.0),
                Vec3::new(1.0, -1.0, 1.0),
                Vec3::new(1.0, 1.0, 1.0),
                Vec3::new(-1.0, 1.0, 1.0),
            ]),
            (-Vec3::z(), [
                Vec3::new(1.0, -1.0, -1.0),
                Vec3::new(-1.0, -1.0, -1.0),
                Vec3::new(-1.0, 1.0, -1.0),
                Vec3::new(1.0, 1.0, -1.0),
            ]),
            (Vec3::x(), [
                Vec3::new(1.0, -1.0, 1.0),
                Vec3::new(1.0, -1.0, -1.0),
                Vec3::new(1.0, 1.0, -1.0),
                Vec3::new(1.0, 1.0, 1.0),
            ]),
            (-Vec3::x(), [
                Vec3::new(-1.0, -1.0, -1.0),
                Vec3::new(-1.0, -1.0, 1.0),
                Vec3::new(-1.0, 1.0, 1.0),
                Vec3::new(-1.0, 1.0, -1.0),
            ]),
            (Vec3::y(), [
                Vec3::new(-1.0, 1.0, 1.0),
                Vec3::new(1.0, 1.0, 1.0),
                Vec3::new(1.0, 1.0, -1.0),
                Vec3::new(-1.0, 1.0, -1.0),
            ]),
            (-Vec3::y(), [
                Vec3::new(-1.0, -1.0, -1.0),
                Vec3::new(1.0, -1.0, -1.0),
                Vec3::new(1.0, -1.0, 1.0),
                Vec3::new(-1.0, -1.0, 1.0),
            ]),
        ];

        let uvs = [
            Vec2::new(0.0, 1.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(0.0, 0.0),
        ];

        rs.start_vertices(VertexMode::Quads);
        for (normal, corners) in &faces {
            rs.normal(*normal);
            for (corner, uv) in corners.iter().zip(uvs) {
                rs.tex_coord(uv);
                rs.vertex(*corner);
            }
        }
        rs.end_vertices();

        if let (Some(saved), Some(material)) = (saved, materials.get_mut(self.material)) {
            material.finish(rs, saved);
        }
    }

    fn is_opaque(&self, materials: &MaterialRegistry) -> bool {
        materials.get(self.material).map_or(true, Material::is_opaque)
    }

    fn aa_bounding_box(&self) -> BoundingBox {
        BoundingBox::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0))
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = match EngineConfig::load_from_file(CONFIG_PATH) {
        Ok(config) => config,
        Err(err) => {
            log::info!("no usable {CONFIG_PATH} ({err}), using defaults");
            EngineConfig::default()
        }
    };

    let mut engine = EngineContext::new(&config)?;

    // A white placeholder texture backs the scripted material.
    let checker = engine.render_system_mut().gen_texture(64, 64);
    let ids = parse_material_script(CHECKER_SCRIPT, engine.materials_mut(), |name| {
        log::debug!("resolving texture {name}");
        Some(checker)
    });
    let material = ids.first().copied().ok_or("material script yielded nothing")?;

    let mut camera = Camera::new();
    camera.set_perspective(
        60.0,
        config.window.width as f32 / config.window.height as f32,
        0.1,
        500.0,
    );
    camera.set_position(Vec3::new(4.0, 3.0, 8.0));
    camera.look_at(Vec3::zeros());
    engine.renderer_mut().set_camera(camera);

    engine
        .renderer_mut()
        .push_3d(Box::new(Cube::new(material, Vec3::zeros())));
    engine
        .renderer_mut()
        .push_3d(Box::new(Cube::new(material, Vec3::new(3.0, 0.0, -4.0))));

    let key_light = engine.renderer_mut().create_light();
    if let Some(light) = engine.renderer_mut().light_mut(key_light) {
        light.set_position(Vec3::new(10.0, 10.0, 10.0));
        light.set_diffuse(Color::WHITE);
    }

    let mut badge = Sticker::new(material);
    badge.node_mut().position = Vec2::new(8.0, 8.0);
    badge.node_mut().scale = Vec2::new(48.0, 48.0);
    engine.renderer_mut().push_2d(Box::new(badge));

    for frame in 0..FRAME_COUNT {
        engine.draw_frame();
        log::debug!("frame {frame} done");
    }
    log::info!(
        "drew {FRAME_COUNT} frames, {} in the last full second",
        engine.renderer().last_fps()
    );

    engine.render_system().screenshot(std::path::Path::new("viewer.png"))?;
    log::info!("screenshot written to viewer.png");

    engine.shutdown()?;
    Ok(())
}
