use crate::error::{Result, UniteError};
use std::path::{Path, PathBuf};

/// Canonical paths of the usable sources, in the order given.
///
/// A source that is missing or not a directory is logged and left out; the
/// rest of the union still mounts. Fails only when nothing usable remains.
pub fn validate_sources(sources: &[PathBuf]) -> Result<Vec<PathBuf>> {
    if sources.is_empty() {
        return Err(UniteError::Config(
            "At least one source directory is required".to_string(),
        ));
    }

    let mut canonical: Vec<PathBuf> = Vec::with_capacity(sources.len());
    for source in sources {
        if !source.is_dir() {
            tracing::warn!("Skipping source '{}': not a directory", source.display());
            continue;
        }
        match source.canonicalize() {
            Ok(path) => canonical.push(path),
            Err(e) => tracing::warn!("Skipping source '{}': {}", source.display(), e),
        }
    }

    if canonical.is_empty() {
        return Err(UniteError::Config(
            "None of the source directories is usable".to_string(),
        ));
    }
    Ok(canonical)
}

/// Reject a mount point that is one of the sources or lies inside one.
/// Mounting there would make the union contain itself.
pub fn validate_mount_point(mount_point: &Path, sources: &[PathBuf]) -> Result<()> {
    let resolved = resolve_mount_point(mount_point)?;

    for source in sources {
        if resolved.starts_with(source) {
            return Err(UniteError::Config(format!(
                "Mount point '{}' cannot be inside source '{}'",
                mount_point.display(),
                source.display()
            )));
        }
    }
    Ok(())
}

// The mount point may not exist yet; resolve the deepest existing ancestor.
fn resolve_mount_point(mount_point: &Path) -> Result<PathBuf> {
    let absolute = if mount_point.is_absolute() {
        mount_point.to_path_buf()
    } else {
        std::env::current_dir()?.join(mount_point)
    };

    let mut existing = absolute.as_path();
    let mut rest = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_os_string());
                existing = parent;
            }
            _ => break,
        }
    }

    let mut resolved = existing.canonicalize()?;
    for name in rest.into_iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}
