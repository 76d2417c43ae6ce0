//! Texture objects owned by a render system backend.

use log::warn;
use slotmap::{new_key_type, SlotMap};

new_key_type! {
    /// Opaque handle to a backend-owned texture object.
    pub struct TextureHandle;
}

/// A texture object: dimensions plus owned RGBA8 pixel storage.
#[derive(Debug, Clone)]
pub struct TextureObject {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl TextureObject {
    /// Allocate a zeroed texture of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; (width as usize) * (height as usize) * 4],
        }
    }

    /// Texture width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Texture height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// RGBA8 pixel storage.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Replace the texture contents, resizing to `width` x `height`.
    pub fn upload(&mut self, width: u32, height: u32, pixels: Vec<u8>) {
        debug_assert_eq!(pixels.len(), (width as usize) * (height as usize) * 4);
        self.width = width;
        self.height = height;
        self.pixels = pixels;
    }
}

/// Arena of texture objects shared by the backends.
#[derive(Debug, Default)]
pub struct TextureStore {
    textures: SlotMap<TextureHandle, TextureObject>,
}

impl TextureStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a texture, warning when dimensions are not powers of two
    /// (older hardware pads or rejects those).
    pub fn generate(&mut self, width: u32, height: u32) -> TextureHandle {
        if !width.is_power_of_two() || !height.is_power_of_two() {
            warn!("texture dimensions {width}x{height} are not powers of two");
        }
        self.textures.insert(TextureObject::new(width, height))
    }

    /// Look up a texture object.
    pub fn get(&self, handle: TextureHandle) -> Option<&TextureObject> {
        self.textures.get(handle)
    }

    /// Look up a texture object mutably.
    pub fn get_mut(&mut self, handle: TextureHandle) -> Option<&mut TextureObject> {
        self.textures.get_mut(handle)
    }

    /// Destroy a texture object.
    pub fn remove(&mut self, handle: TextureHandle) {
        self.textures.remove(handle);
    }

    /// Number of live texture objects.
    pub fn len(&self) -> usize {
        self.textures.len()
    }

    /// True when no textures are allocated.
    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_and_lookup() {
        let mut store = TextureStore::new();
        let tex = store.generate(64, 64);
        let obj = store.get(tex).unwrap();
        assert_eq!(obj.width(), 64);
        assert_eq!(obj.pixels().len(), 64 * 64 * 4);
    }

    #[test]
    fn removed_handles_do_not_resolve() {
        let mut store = TextureStore::new();
        let tex = store.generate(8, 8);
        store.remove(tex);
        assert!(store.get(tex).is_none());
        assert!(store.is_empty());
    }
}
