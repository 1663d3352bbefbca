//! Link-file resolution. A link file is a one-line text file naming another
//! asset on disk, relative to the link file's own directory — used to alias
//! a sound name to an existing asset without duplicating it. Grounded in
//! `SoundBuffer::_findLinkedFile` from
//! `examples/original_source/branches/1.2/include/xal/SoundBuffer.h` (the
//! original never checks in the body, just declares the hook; the contract
//! is inferred from its name and call sites: resolve a `.link` file to the
//! real path it names).

use std::path::{Path, PathBuf};

use crate::error::AssetError;

/// A file is considered a link if its extension is `link` and it is not
/// itself a recognized audio container.
pub fn is_link(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("link"))
        .unwrap_or(false)
}

/// Resolve `link_path` to the asset it names. The link's content is a
/// single path, trimmed of whitespace, interpreted relative to the link
/// file's own parent directory if it is not already absolute.
pub fn resolve(link_path: &Path) -> Result<PathBuf, AssetError> {
    let contents = std::fs::read_to_string(link_path)?;
    let target = contents.trim();
    if target.is_empty() {
        return Err(AssetError::LinkResolution(format!(
            "{} is empty",
            link_path.display()
        )));
    }

    let target_path = Path::new(target);
    let resolved = if target_path.is_absolute() {
        target_path.to_path_buf()
    } else {
        link_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(target_path)
    };

    if !resolved.exists() {
        return Err(AssetError::LinkResolution(format!(
            "{} points to missing file {}",
            link_path.display(),
            resolved.display()
        )));
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn resolves_relative_link_target() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("real.ogg"), b"").unwrap();
        let link_path = dir.path().join("alias.link");
        fs::write(&link_path, "real.ogg\n").unwrap();

        let resolved = resolve(&link_path).unwrap();
        assert_eq!(resolved, dir.path().join("real.ogg"));
    }

    #[test]
    fn missing_target_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let link_path = dir.path().join("alias.link");
        fs::write(&link_path, "nope.ogg").unwrap();
        assert!(resolve(&link_path).is_err());
    }

    #[test]
    fn detects_link_extension() {
        assert!(is_link(Path::new("foo.link")));
        assert!(!is_link(Path::new("foo.ogg")));
    }
}
