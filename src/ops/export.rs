//! Batch export — packages every render node's master image and panel
//! slices into a single ZIP archive.
//!
//! Layout inside the archive:
//!   `render_<i>_main.png`
//!   `render_<i>_slices/slice_<n>.png`
//! with `i` in creation order and `n` starting at 1.

use std::fs::File;
use std::io::{Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::RgbaImage;
use zip::CompressionMethod;
use zip::write::FileOptions;

use crate::store::{NodeType, Store};

/// Owned snapshot of one render node's exportable images. Collected on the
/// UI thread, moved into the export job.
pub struct RenderExport {
    pub main: Arc<RgbaImage>,
    pub slices: Vec<Arc<RgbaImage>>,
}

/// Snapshot every render node that has a master image. `Arc` clones only.
pub fn collect_renders(store: &Store) -> Vec<RenderExport> {
    store
        .list_nodes()
        .iter()
        .filter_map(|node| match node.node_type {
            NodeType::Render => node.image.as_ref().map(|img| RenderExport {
                main: img.clone(),
                slices: node.slices.clone(),
            }),
            NodeType::Prompt | NodeType::AssetGroup | NodeType::Slice => None,
        })
        .collect()
}

/// Write the archive to `path`. On any failure the partial file is removed
/// so the user never finds a truncated archive.
pub fn export_renders(renders: &[RenderExport], path: &Path) -> Result<PathBuf, String> {
    let file = File::create(path).map_err(|e| format!("cannot create {}: {}", path.display(), e))?;
    match write_archive(renders, file) {
        Ok(()) => Ok(path.to_path_buf()),
        Err(e) => {
            let _ = std::fs::remove_file(path);
            Err(e)
        }
    }
}

/// Write the archive body to any writer (split from `export_renders` so
/// tests can target an in-memory cursor).
pub fn write_archive<W: Write + Seek>(renders: &[RenderExport], writer: W) -> Result<(), String> {
    let mut zip = zip::ZipWriter::new(writer);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for (i, render) in renders.iter().enumerate() {
        let main_png = crate::io::encode_png(&render.main)?;
        zip.start_file(format!("render_{}_main.png", i), options)
            .map_err(|e| format!("archive write failed: {}", e))?;
        zip.write_all(&main_png)
            .map_err(|e| format!("archive write failed: {}", e))?;

        for (s, slice) in render.slices.iter().enumerate() {
            let slice_png = crate::io::encode_png(slice)?;
            zip.start_file(format!("render_{}_slices/slice_{}.png", i, s + 1), options)
                .map_err(|e| format!("archive write failed: {}", e))?;
            zip.write_all(&slice_png)
                .map_err(|e| format!("archive write failed: {}", e))?;
        }
    }

    zip.finish()
        .map_err(|e| format!("archive finalize failed: {}", e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::io::Cursor;

    fn render(with_slices: usize) -> RenderExport {
        let img = Arc::new(RgbaImage::from_pixel(8, 8, Rgba([1, 2, 3, 255])));
        RenderExport {
            main: img.clone(),
            slices: (0..with_slices).map(|_| img.clone()).collect(),
        }
    }

    #[test]
    fn archive_layout_matches_naming_scheme() {
        let renders = vec![render(4), render(0)];
        let mut buf = Cursor::new(Vec::new());
        write_archive(&renders, &mut buf).unwrap();

        let archive = zip::ZipArchive::new(Cursor::new(buf.into_inner())).unwrap();
        let names: Vec<String> = archive.file_names().map(|n| n.to_string()).collect();
        assert!(names.contains(&"render_0_main.png".to_string()));
        assert!(names.contains(&"render_0_slices/slice_1.png".to_string()));
        assert!(names.contains(&"render_0_slices/slice_4.png".to_string()));
        assert!(names.contains(&"render_1_main.png".to_string()));
        // Slice numbering is 1-based and absent for sliceless renders.
        assert!(!names.iter().any(|n| n.starts_with("render_1_slices")));
        assert_eq!(names.len(), 6);
    }

    #[test]
    fn only_render_nodes_are_collected() {
        use crate::store::{GraphNode, test_node};
        let mut store = Store::new();
        let img = Arc::new(RgbaImage::from_pixel(4, 4, Rgba([9, 9, 9, 255])));

        let mut r: GraphNode = test_node(NodeType::Render, None);
        r.image = Some(img.clone());
        store.add_node(r);
        store.add_node(test_node(NodeType::Prompt, None));
        store.add_node(test_node(NodeType::Slice, None));
        // Render without a master image is skipped, not an error.
        store.add_node(test_node(NodeType::Render, None));

        assert_eq!(collect_renders(&store).len(), 1);
    }
}
