//! Mapping of entry names to destination paths.
//!
//! Entry names come straight from the archive and may be hostile: absolute
//! (`/etc/passwd`), climbing (`../../x`), or carrying drive prefixes
//! (`C:\x`). Every name goes through [`sanitize_entry_path`] before it is
//! joined onto a destination directory.

use std::path::{Component, Path, PathBuf};

use crate::error::UnsafePathReason;

/// Turn a raw entry name into a relative path that stays inside the
/// destination.
///
/// Backslashes count as separators. Empty and `.` components are dropped and
/// interior `..` is resolved lexically; a `..` that would climb above the
/// root is refused. The result is empty for names such as `./`.
pub fn sanitize_entry_path(name: &[u8]) -> Result<PathBuf, UnsafePathReason> {
    if name.contains(&0) {
        return Err(UnsafePathReason::NulByte);
    }

    let name = String::from_utf8_lossy(name).replace('\\', "/");
    if name.starts_with('/') {
        return Err(UnsafePathReason::Absolute);
    }

    let mut parts: Vec<&str> = Vec::new();
    for part in name.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return Err(UnsafePathReason::ParentEscape);
                }
            }
            _ => {
                // Must be a single plain name on this host: rejects `C:` and
                // other prefixes that `PathBuf::push` would honor.
                let mut components = Path::new(part).components();
                match (components.next(), components.next()) {
                    (Some(Component::Normal(_)), None) if !part.contains(':') => {
                        parts.push(part)
                    }
                    _ => return Err(UnsafePathReason::InvalidComponent),
                }
            }
        }
    }

    Ok(parts.iter().collect())
}

/// Destination for an entry under `dest`, honoring junk-path mode.
///
/// Returns `Ok(None)` for directory entries when paths are junked, since
/// nothing is created for them.
pub(crate) fn resolve_destination(
    dest: &Path,
    name: &[u8],
    is_directory: bool,
    junk_paths: bool,
) -> Result<Option<PathBuf>, UnsafePathReason> {
    let relative = sanitize_entry_path(name)?;

    if is_directory {
        if junk_paths {
            return Ok(None);
        }
        return Ok(Some(dest.join(relative)));
    }

    let relative = if junk_paths {
        relative.file_name().map(PathBuf::from).unwrap_or_default()
    } else {
        relative
    };
    if relative.as_os_str().is_empty() {
        return Err(UnsafePathReason::Empty);
    }
    Ok(Some(dest.join(relative)))
}
