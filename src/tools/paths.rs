//! Path validation for the file tools.

use std::path::{Path, PathBuf};

/// Restricts file tools to a set of allowed directories.
///
/// An empty allow-list permits every path.
#[derive(Debug, Clone, Default)]
pub struct PathGuard {
    allowed_paths: Vec<PathBuf>,
}

impl PathGuard {
    /// Creates a guard over `allowed_paths`.
    #[must_use]
    pub const fn new(allowed_paths: Vec<PathBuf>) -> Self {
        Self { allowed_paths }
    }

    /// Validates that a path is within one of the allowed paths.
    ///
    /// Returns the canonical path if allowed, or an error message if not.
    ///
    /// # Errors
    ///
    /// Returns a client-safe message if the path cannot be resolved or lies
    /// outside every allowed directory.
    pub fn validate(&self, filepath: &str) -> Result<PathBuf, String> {
        let path = Path::new(filepath);

        // Try to canonicalize the path. If it doesn't exist yet (for write operations),
        // canonicalize the parent directory and append the filename.
        let canonical_path = if path.exists() {
            path.canonicalize()
                .map_err(|e| format!("Failed to resolve path '{}': {e}", path.display()))?
        } else {
            let parent = match path.parent() {
                Some(p) if p.as_os_str().is_empty() => Path::new("."),
                Some(p) => p,
                None => {
                    return Err(format!(
                        "Invalid path '{}': no parent directory",
                        path.display()
                    ))
                }
            };
            let filename = path.file_name().ok_or_else(|| {
                format!("Invalid path '{}': no filename specified", path.display())
            })?;
            let canonical_parent = parent.canonicalize().map_err(|_| {
                format!(
                    "Parent directory '{}' does not exist or is inaccessible",
                    parent.display()
                )
            })?;
            canonical_parent.join(filename)
        };

        if self.allowed_paths.is_empty() {
            return Ok(canonical_path);
        }

        for allowed in &self.allowed_paths {
            let Ok(canonical_allowed) = allowed.canonicalize() else {
                continue; // Skip non-existent allowed paths
            };

            if canonical_path.starts_with(&canonical_allowed) {
                return Ok(canonical_path);
            }
        }

        // Path is not within any allowed path - return error without exposing internal paths
        Err("Access denied: path is outside the configured allowed directories".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_allow_list_permits_existing_paths() {
        let dir = tempfile::tempdir().unwrap();
        let guard = PathGuard::default();
        let resolved = guard.validate(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(resolved, dir.path().canonicalize().unwrap());
    }

    #[test]
    fn allows_paths_inside_allowed_dir() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("inside.txt");
        std::fs::write(&file, "x").unwrap();

        let guard = PathGuard::new(vec![dir.path().to_path_buf()]);
        assert!(guard.validate(file.to_str().unwrap()).is_ok());

        let new_file = dir.path().join("new.txt");
        assert!(guard.validate(new_file.to_str().unwrap()).is_ok());
    }

    #[test]
    fn rejects_paths_outside_allowed_dir() {
        let allowed = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let file = other.path().join("outside.txt");
        std::fs::write(&file, "x").unwrap();

        let guard = PathGuard::new(vec![allowed.path().to_path_buf()]);
        let err = guard.validate(file.to_str().unwrap()).unwrap_err();
        assert!(err.contains("Access denied"));
        assert!(!err.contains(other.path().to_str().unwrap()));
    }

    #[test]
    fn rejects_parent_traversal() {
        let root = tempfile::tempdir().unwrap();
        let allowed = root.path().join("allowed");
        std::fs::create_dir(&allowed).unwrap();
        std::fs::write(root.path().join("secret.txt"), "x").unwrap();

        let guard = PathGuard::new(vec![allowed.clone()]);
        let sneaky = allowed.join("..").join("secret.txt");
        assert!(guard.validate(sneaky.to_str().unwrap()).is_err());
    }

    #[test]
    fn missing_parent_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no").join("such").join("file.txt");
        let guard = PathGuard::default();
        assert!(guard.validate(path.to_str().unwrap()).is_err());
    }
}
