//! Per-entity texture cache. Decoded pixels live in the store; the GPU
//! handles live here and are revoked when their entity disappears — the
//! display-handle counterpart of the store's ownership.

use std::collections::HashMap;

use egui::{ColorImage, TextureHandle, TextureOptions};
use image::RgbaImage;
use uuid::Uuid;

use crate::store::Store;

/// Longest edge uploaded to the GPU; larger sources are downscaled. Node
/// thumbnails never display larger than this anyway.
const TEXTURE_MAX_EDGE: u32 = 1024;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum TexKey {
    Asset(Uuid),
    NodeMain(Uuid),
    NodeSlice(Uuid, usize),
}

#[derive(Default)]
pub struct TextureCache {
    map: HashMap<TexKey, TextureHandle>,
}

impl TextureCache {
    /// Fetch the texture for `key`, uploading from `source` on first use.
    pub fn get_or_upload(
        &mut self,
        ctx: &egui::Context,
        key: TexKey,
        source: &RgbaImage,
    ) -> TextureHandle {
        if let Some(handle) = self.map.get(&key) {
            return handle.clone();
        }
        let scaled = downscale_for_upload(source);
        let img = match &scaled {
            Some(small) => small,
            None => source,
        };
        let color = ColorImage::from_rgba_unmultiplied(
            [img.width() as usize, img.height() as usize],
            img.as_raw(),
        );
        let handle = ctx.load_texture(texture_name(key), color, TextureOptions::LINEAR);
        self.map.insert(key, handle.clone());
        handle
    }

    /// Drop handles whose entity no longer exists in the store. Called once
    /// per frame; freeing the handle releases the GPU allocation.
    pub fn prune(&mut self, store: &Store) {
        self.map.retain(|key, _| match key {
            TexKey::Asset(id) => store.asset(*id).is_some(),
            TexKey::NodeMain(id) => store.node(*id).is_some(),
            TexKey::NodeSlice(id, idx) => store
                .node(*id)
                .map(|n| *idx < n.slices.len())
                .unwrap_or(false),
        });
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.map.len()
    }
}

fn texture_name(key: TexKey) -> String {
    match key {
        TexKey::Asset(id) => format!("asset-{}", id),
        TexKey::NodeMain(id) => format!("node-{}", id),
        TexKey::NodeSlice(id, idx) => format!("slice-{}-{}", id, idx),
    }
}

fn downscale_for_upload(img: &RgbaImage) -> Option<RgbaImage> {
    let longest = img.width().max(img.height());
    if longest <= TEXTURE_MAX_EDGE {
        return None;
    }
    let scale = TEXTURE_MAX_EDGE as f32 / longest as f32;
    let w = ((img.width() as f32 * scale) as u32).max(1);
    let h = ((img.height() as f32 * scale) as u32).max(1);
    Some(image::imageops::resize(
        img,
        w,
        h,
        image::imageops::FilterType::Triangle,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_images_upload_unscaled() {
        let img = RgbaImage::new(640, 480);
        assert!(downscale_for_upload(&img).is_none());
    }

    #[test]
    fn oversized_images_are_capped_at_max_edge() {
        let img = RgbaImage::new(4096, 2048);
        let small = downscale_for_upload(&img).unwrap();
        assert_eq!(small.width(), 1024);
        assert_eq!(small.height(), 512);
    }
}
