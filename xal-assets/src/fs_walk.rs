//! Filesystem enumeration for `AudioManager::createSoundsFromPath`: walks a
//! directory tree and yields `(category, file_path)` pairs, one per audio
//! file found, where `category` is the immediate parent directory name
//! relative to the root — matching `AudioManager::createSoundsFromPath` in
//! `examples/original_source/src/AudioManager.cpp`, which uses the
//! directory a file lives in as its category name.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

const KNOWN_EXTENSIONS: &[&str] = &["sfx", "pcm", "ogg", "wav", "flac", "mp3"];

pub struct DiscoveredSound {
    pub category: String,
    pub path: PathBuf,
}

/// Recursively walk `root`, returning one entry per file with a recognized
/// audio extension. A file directly under `root` is assigned `root`'s own
/// directory name (matching the original's behavior for single-directory
/// sound sets); a file under a subdirectory is assigned that subdirectory's
/// name.
pub fn discover(root: &Path) -> Vec<DiscoveredSound> {
    let root_category = root
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("default")
        .to_string();

    let mut found = Vec::new();
    for entry in WalkDir::new(root).into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let is_audio = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| KNOWN_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if !is_audio {
            continue;
        }

        let category = path
            .parent()
            .filter(|p| *p != root)
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| root_category.clone());

        found.push(DiscoveredSound {
            category,
            path: path.to_path_buf(),
        });
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn categorizes_by_immediate_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let sfx_dir = dir.path().join("sfx");
        let music_dir = dir.path().join("music");
        fs::create_dir(&sfx_dir).unwrap();
        fs::create_dir(&music_dir).unwrap();
        fs::write(sfx_dir.join("beep.sfx"), b"").unwrap();
        fs::write(music_dir.join("theme.ogg"), b"").unwrap();
        fs::write(dir.path().join("readme.txt"), b"").unwrap();

        let mut found = discover(dir.path());
        found.sort_by(|a, b| a.path.cmp(&b.path));

        assert_eq!(found.len(), 2);
        assert!(found.iter().any(|f| f.category == "sfx"));
        assert!(found.iter().any(|f| f.category == "music"));
    }
}
