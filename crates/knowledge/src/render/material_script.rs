//! Parser for the textual material script format.
//!
//! ```text
//! material <name>
//! {
//!     ambient 0.2 0.2 0.2
//!     diffuse 1 1 1
//!     specular 0 0 0
//!     cull none
//!     receiveLight no
//!     texture
//!     {
//!         filename "textures/rock.png"
//!         scroll 0.1 0
//!         rotate 5
//!         texcoord uv
//!     }
//! }
//! ```
//!
//! Texture filenames are resolved through a caller-supplied resolver so
//! the parser stays independent of how image data is loaded. Unknown
//! tokens log a warning and are skipped.

use log::warn;

use crate::foundation::math::Vec2;
use crate::render::material::{Material, MaterialId, MaterialRegistry, MaterialStage, TexCoordType};
use crate::render::system::{BlendFactor, TexEnv};
use crate::render::texture::TextureHandle;

/// Parse a material script, registering every material it defines.
///
/// `resolve` maps a texture filename to a handle; returning `None`
/// skips that texture with a warning.
pub fn parse_material_script<F>(
    source: &str,
    registry: &mut MaterialRegistry,
    mut resolve: F,
) -> Vec<MaterialId>
where
    F: FnMut(&str) -> Option<TextureHandle>,
{
    let tokens = tokenize(source);
    let mut cursor = tokens.iter().map(String::as_str);
    let mut parsed = Vec::new();

    while let Some(token) = cursor.next() {
        if token != "material" {
            continue;
        }
        let Some(name) = cursor.next() else { break };
        if let Some(material) = parse_material(&mut cursor, &mut resolve) {
            parsed.push(registry.register(name, material));
        }
    }

    parsed
}

/// Split the script into tokens; braces separate even without
/// whitespace and quotes group a filename with spaces.
fn tokenize(source: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;

    for ch in source.chars() {
        match ch {
            '"' => {
                quoted = !quoted;
                if !quoted && !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            '{' | '}' if !quoted => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
                tokens.push(ch.to_string());
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}

fn parse_f32<'a, I: Iterator<Item = &'a str>>(cursor: &mut I) -> f32 {
    cursor
        .next()
        .and_then(|t| t.parse().ok())
        .unwrap_or_default()
}

fn parse_rgb<'a, I: Iterator<Item = &'a str>>(cursor: &mut I) -> crate::foundation::color::Color {
    let r = parse_f32(cursor);
    let g = parse_f32(cursor);
    let b = parse_f32(cursor);
    crate::foundation::color::Color::new(r, g, b, 1.0)
}

fn parse_on_off(token: Option<&str>) -> bool {
    matches!(token, Some("true" | "yes" | "on"))
}

fn blend_factor(token: &str) -> BlendFactor {
    match token {
        "zero" => BlendFactor::Zero,
        "one" => BlendFactor::One,
        "srcclr" => BlendFactor::SrcColor,
        "invsrcclr" => BlendFactor::InvSrcColor,
        "srcalpha" => BlendFactor::SrcAlpha,
        "invsrcalpha" => BlendFactor::InvSrcAlpha,
        "dstclr" => BlendFactor::DstColor,
        "invdstclr" => BlendFactor::InvDstColor,
        "dstalpha" => BlendFactor::DstAlpha,
        "invdstalpha" => BlendFactor::InvDstAlpha,
        other => {
            warn!("unknown blend factor {other:?}, using one");
            BlendFactor::One
        }
    }
}

fn parse_material<'a, I, F>(cursor: &mut I, resolve: &mut F) -> Option<Material>
where
    I: Iterator<Item = &'a str>,
    F: FnMut(&str) -> Option<TextureHandle>,
{
    if cursor.next() != Some("{") {
        warn!("material block without an opening brace");
        return None;
    }

    let mut material = Material::new();
    let mut stage_index = 0;
    let mut depth = 1u32;

    while depth > 0 {
        let token = cursor.next()?;
        match token {
            "{" => depth += 1,
            "}" => depth -= 1,
            "nodraw" => material.no_draw = true,
            "receiveLight" => {
                if matches!(cursor.next(), Some("no" | "false" | "off")) {
                    material.receive_light = false;
                }
            }
            "ambient" => material.ambient = parse_rgb(cursor),
            "diffuse" => material.diffuse = parse_rgb(cursor),
            "specular" => material.specular = parse_rgb(cursor),
            "cull" => {
                use crate::render::system::CullMode;
                material.cull = match cursor.next() {
                    Some("none" | "disabled") => CullMode::None,
                    Some("front") => CullMode::Front,
                    Some("back") => CullMode::Back,
                    Some("both") => CullMode::Both,
                    other => {
                        warn!("unknown cull mode {other:?}, keeping default");
                        material.cull
                    }
                };
            }
            "depthTest" => material.depth_test = parse_on_off(cursor.next()),
            "depthWrite" => material.depth_write = parse_on_off(cursor.next()),
            "texture" => {
                if let Some(stage) = parse_texture_section(cursor, stage_index, resolve) {
                    material.push_stage(stage);
                    stage_index += 1;
                }
            }
            other => warn!("unknown material token {other:?}, skipping"),
        }
    }

    Some(material)
}

fn parse_texture_section<'a, I, F>(
    cursor: &mut I,
    unit: usize,
    resolve: &mut F,
) -> Option<MaterialStage>
where
    I: Iterator<Item = &'a str>,
    F: FnMut(&str) -> Option<TextureHandle>,
{
    if cursor.next() != Some("{") {
        warn!("texture block without an opening brace");
        return None;
    }

    let mut stage = MaterialStage::new(unit);
    let mut depth = 1u32;

    while depth > 0 {
        let token = cursor.next()?;
        match token {
            "{" => depth += 1,
            "}" => depth -= 1,
            "filename" => {
                let name = cursor.next()?;
                match resolve(name) {
                    Some(texture) => stage.push_texture(texture),
                    None => warn!("texture {name:?} not found, skipping"),
                }
            }
            "animname" => {
                // "animname base.ext <frames> <rate>": frames expand to
                // base_0.ext .. base_{n-1}.ext.
                let base = cursor.next()?;
                let frames = cursor
                    .next()
                    .and_then(|t| t.parse::<usize>().ok())
                    .unwrap_or(0);
                let rate = parse_f32(cursor);

                let (stem, extension) = match base.rfind('.') {
                    Some(dot) => base.split_at(dot),
                    None => (base, ""),
                };
                for i in 0..frames {
                    let full = format!("{stem}_{i}{extension}");
                    match resolve(&full) {
                        Some(texture) => stage.push_texture(texture),
                        None => warn!("animation frame {full:?} not found, skipping"),
                    }
                }
                stage.set_frame_rate(rate);
            }
            "texenv" => {
                let env = match cursor.next() {
                    Some("replace") => TexEnv::Replace,
                    Some("modulate") => TexEnv::Modulate,
                    Some("add") => TexEnv::Add,
                    Some("decal") => TexEnv::Decal,
                    Some("blend") => TexEnv::Blend,
                    other => {
                        warn!("unknown texenv {other:?}, using modulate");
                        TexEnv::Modulate
                    }
                };
                stage.set_tex_env(env);
            }
            "scale" => {
                let x = parse_f32(cursor);
                let y = parse_f32(cursor);
                stage.set_scale(Vec2::new(x, y));
            }
            "scroll" => {
                let x = parse_f32(cursor);
                let y = parse_f32(cursor);
                stage.set_scroll(Vec2::new(x, y));
            }
            "rotate" => stage.set_rotate(parse_f32(cursor)),
            "texcoord" => {
                let coord = match cursor.next() {
                    Some("uv") => TexCoordType::UvMap,
                    Some("sphere") => TexCoordType::SphereMap,
                    other => {
                        warn!("unsupported texcoord {other:?}, using uv");
                        TexCoordType::UvMap
                    }
                };
                stage.set_coord_type(coord);
            }
            "blendfunc" => {
                let src = blend_factor(cursor.next().unwrap_or_default());
                let dst = blend_factor(cursor.next().unwrap_or_default());
                stage.set_blend(src, dst);
            }
            other => warn!("unknown texture token {other:?}, skipping"),
        }
    }

    Some(stage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::system::CullMode;
    use crate::render::texture::TextureStore;

    const SCRIPT: &str = r#"
        material rock
        {
            ambient 0.2 0.2 0.2
            diffuse 0.9 0.8 0.7
            specular 0 0 0
            cull back
            depthTest on
            texture
            {
                filename "textures/rock.png"
                scroll 0.1 0
                rotate 5
                texcoord uv
            }
        }

        material water
        {
            receiveLight no
            cull none
            texture
            {
                filename water.png
                texcoord sphere
                blendfunc srcalpha invsrcalpha
            }
        }
    "#;

    #[test]
    fn parses_materials_and_stages() {
        let mut store = TextureStore::new();
        let mut registry = MaterialRegistry::new();

        let ids = parse_material_script(SCRIPT, &mut registry, |_| Some(store.generate(16, 16)));
        assert_eq!(ids.len(), 2);

        let rock = registry.get(registry.find("rock").unwrap()).unwrap();
        assert_eq!(rock.cull, CullMode::Back);
        assert!(rock.depth_test);
        assert_eq!(rock.stages().len(), 1);
        assert_eq!(rock.stages()[0].texture_count(), 1);
        assert!((rock.diffuse.r - 0.9).abs() < 1e-6);

        let water = registry.get(registry.find("water").unwrap()).unwrap();
        assert!(!water.receive_light);
        assert_eq!(water.cull, CullMode::None);
        assert_eq!(water.stages()[0].coord_type(), TexCoordType::SphereMap);
        assert!(!water.is_opaque());
    }

    #[test]
    fn animname_expands_numbered_frames() {
        let mut store = TextureStore::new();
        let mut registry = MaterialRegistry::new();
        let mut requested = Vec::new();

        let script = "material fire { texture { animname flame.png 3 10 } }";
        parse_material_script(script, &mut registry, |name| {
            requested.push(name.to_owned());
            Some(store.generate(8, 8))
        });

        assert_eq!(requested, ["flame_0.png", "flame_1.png", "flame_2.png"]);
        let fire = registry.get(registry.find("fire").unwrap()).unwrap();
        assert_eq!(fire.stages()[0].texture_count(), 3);
    }

    #[test]
    fn missing_texture_keeps_material() {
        let mut registry = MaterialRegistry::new();
        let script = "material ghost { texture { filename gone.png } }";
        let ids = parse_material_script(script, &mut registry, |_| None);
        assert_eq!(ids.len(), 1);
        let ghost = registry.get(ids[0]).unwrap();
        assert_eq!(ghost.stages()[0].texture_count(), 0);
    }
}
