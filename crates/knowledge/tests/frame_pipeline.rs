//! End-to-end exercise of the frame pipeline on the immediate backend:
//! boot, build a small scene, run frames, verify what reached the
//! hardware model.

use knowledge::prelude::*;
use knowledge::render::backends::immediate::ImmediateRenderSystem;
use knowledge::render::material::MaterialId;
use knowledge::render::system::VertexMode;

struct Tri {
    node: Node3,
    material: MaterialId,
}

impl Tri {
    fn new(material: MaterialId, position: Vec3) -> Self {
        let mut node = Node3::default();
        node.position = position;
        Self { node, material }
    }
}

impl Drawable3D for Tri {
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

        rs.translate_scene(self.node.position.x, self.node.position.y, self.node.position.z);
        rs.start_vertices(VertexMode::Triangles);
        rs.normal(Vec3::z());
        rs.vertex(Vec3::new(-1.0, -1.0, 0.0));
        rs.vertex(Vec3::new(1.0, -1.0, 0.0));
        rs.vertex(Vec3::new(0.0, 1.0, 0.0));
        rs.end_vertices();

        if let (Some(saved), Some(material)) = (saved, materials.get_mut(self.material)) {
            material.finish(rs, saved);
        }
    }

    fn is_opaque(&self, materials: &MaterialRegistry) -> bool {
        materials.get(self.material).map_or(true, Material::is_opaque)
    }

    fn aa_bounding_box(&self) -> BoundingBox {
        BoundingBox::new(Vec3::new(-1.0, -1.0, 0.0), Vec3::new(1.0, 1.0, 0.0))
    }
}

fn booted() -> ImmediateRenderSystem {
    let mut rs = ImmediateRenderSystem::new();
    rs.initialize().unwrap();
    rs.configure().unwrap();
    rs.create_window(640, 480).unwrap();
    rs
}

fn frustum_camera() -> Camera {
    let mut camera = Camera::new();
    camera.set_perspective(90.0, 640.0 / 480.0, 0.1, 500.0);
    camera
}

#[test]
fn full_scene_reaches_the_hardware_model() {
    let mut rs = booted();
    let mut materials = MaterialRegistry::new();
    let mut renderer = Renderer::new();
    renderer.set_camera(frustum_camera());

    let texture = rs.gen_texture(64, 64);
    let stone = materials.register("stone", Material::with_single_texture(texture));
    let hud = materials.register("hud", Material::default());

    renderer.push_3d(Box::new(Tri::new(stone, Vec3::new(0.0, 0.0, -20.0))));

    let mut sticker = Sticker::new(hud);
    sticker.node_mut().position = Vec2::new(8.0, 8.0);
    sticker.node_mut().scale = Vec2::new(64.0, 64.0);
    renderer.push_2d(Box::new(sticker));

    let light = renderer.create_light();
    renderer
        .light_mut(light)
        .unwrap()
        .set_position(Vec3::new(0.0, 10.0, -20.0));

    let sprite = renderer.create_sprite(2.0, stone);
    renderer
        .sprite_mut(sprite)
        .unwrap()
        .set_position(Vec3::new(5.0, 0.0, -20.0));

    renderer.draw(&mut rs, &mut materials);

    // One triangle, one sprite quad, one sticker quad this frame.
    let batches = rs.batches();
    assert!(batches.iter().any(|b| b.mode == VertexMode::Triangles));
    assert_eq!(
        batches.iter().filter(|b| b.mode == VertexMode::Quads).count(),
        2
    );
    assert_eq!(rs.frames_presented(), 1);
    // No light slot left enabled after the pass.
    assert_eq!(rs.enabled_light_count(), 0);
}

#[test]
fn frames_present_and_screenshot_writes_a_png() {
    let mut rs = booted();
    let mut materials = MaterialRegistry::new();
    let mut renderer = Renderer::new();
    renderer.set_camera(frustum_camera());

    for _ in 0..3 {
        renderer.draw(&mut rs, &mut materials);
    }
    assert_eq!(rs.frames_presented(), 3);

    let path = std::env::temp_dir().join("knowledge_frame_pipeline_shot.png");
    rs.screenshot(&path).unwrap();
    assert!(path.exists());
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn context_boots_draws_and_shuts_down() {
    let config = EngineConfig::default();
    let mut engine = EngineContext::new(&config).unwrap();

    let mut camera = Camera::new();
    camera.set_position(Vec3::new(0.0, 0.0, 10.0));
    engine.renderer_mut().set_camera(camera);

    engine.draw_frame();
    engine.draw_frame();
    engine.shutdown().unwrap();
}
