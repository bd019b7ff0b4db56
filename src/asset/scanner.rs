//! Texture directory scanner

use std::path::{Path, PathBuf};

use crate::asset::registry::AssetRegistry;
use crate::asset::texture::{TextureCategory, TextureId, TextureSource};

/// Outcome of one scan
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Textures registered by this scan, in registration order
    pub registered: Vec<TextureId>,
    /// Files whose name was already registered
    pub known: usize,
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
}

/// Files of one category, sorted by name for a deterministic order
fn category_files(root: &Path, category: TextureCategory) -> Vec<PathBuf> {
    let dir = root.join(category.dir_name());
    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::debug!("Skipping texture directory {}: {}", dir.display(), e);
            return Vec::new();
        }
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && has_extension(path, category.extensions()))
        .collect();
    files.sort();
    files
}

/// Register every texture under `root`, category directories in fixed order
///
/// New entries start out `AwaitingLoad`. Files already known by name are
/// counted but left alone, so rescanning is cheap and never renumbers.
pub fn scan_textures<H>(root: &Path, registry: &mut AssetRegistry<H>) -> ScanReport {
    let mut report = ScanReport::default();
    for category in TextureCategory::ALL {
        for path in category_files(root, category) {
            let (id, created) = registry.register_texture(TextureSource::new(path, category));
            if created {
                report.registered.push(id);
            } else {
                report.known += 1;
            }
        }
    }
    log::info!(
        "Texture scan of {}: {} new, {} known",
        root.display(),
        report.registered.len(),
        report.known
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::texture::LoadingState;

    fn touch(root: &Path, dir: &str, file: &str) {
        let dir = root.join(dir);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(file), b"").unwrap();
    }

    #[test]
    fn test_scan_categories_and_order() {
        let root = tempfile::tempdir().unwrap();
        touch(root.path(), "uncompressed", "b_ALB.png");
        touch(root.path(), "uncompressed", "a_ALB.JPG");
        touch(root.path(), "uncompressed", "notes.txt");
        touch(root.path(), "ui", "Cursor.png");
        touch(root.path(), "compressed", "Rock_ALB.dds");
        touch(root.path(), "exr", "Sky.exr");
        touch(root.path(), "font", "Glyphs.png");

        let mut registry: AssetRegistry<()> = AssetRegistry::new();
        let report = scan_textures(root.path(), &mut registry);

        let names: Vec<&str> = registry.textures().map(|(_, t)| t.name()).collect();
        assert_eq!(names, ["a_ALB", "b_ALB", "Cursor", "Rock_ALB", "Sky", "Glyphs"]);
        assert_eq!(report.registered.len(), 6);
        assert_eq!(registry.texture_by_name("Rock_ALB").unwrap().category(), TextureCategory::BlockCompressed);
        assert_eq!(registry.texture_by_name("Glyphs").unwrap().category(), TextureCategory::Font);
        assert!(registry.textures().all(|(_, t)| t.loading() == LoadingState::AwaitingLoad));
    }

    #[test]
    fn test_rescan_only_adds_new_files() {
        let root = tempfile::tempdir().unwrap();
        touch(root.path(), "uncompressed", "Floor_ALB.png");

        let mut registry: AssetRegistry<()> = AssetRegistry::new();
        scan_textures(root.path(), &mut registry);
        touch(root.path(), "uncompressed", "Floor_NRM.png");

        let report = scan_textures(root.path(), &mut registry);
        assert_eq!(report.known, 1);
        assert_eq!(report.registered, vec![TextureId(1)]);
        assert_eq!(registry.texture_id("Floor_ALB"), Some(TextureId(0)));
    }

    #[test]
    fn test_missing_root_is_empty() {
        let mut registry: AssetRegistry<()> = AssetRegistry::new();
        let report = scan_textures(Path::new("/definitely/not/here"), &mut registry);
        assert!(report.registered.is_empty());
        assert_eq!(registry.texture_count(), 0);
    }
}
