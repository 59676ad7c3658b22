use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Ensure directory exists, creating it if necessary
pub async fn ensure_directory_exists<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();

    if !path.exists() {
        fs::create_dir_all(path)
            .await
            .with_context(|| format!("Failed to create directory: {}", path.display()))?;
    } else if !path.is_dir() {
        anyhow::bail!("Path exists but is not a directory: {}", path.display());
    }

    Ok(())
}

/// Check if path is inside base
pub fn is_subdirectory<P: AsRef<Path>, Q: AsRef<Path>>(base: P, path: Q) -> bool {
    let base = base.as_ref();
    let path = path.as_ref();

    path.starts_with(base)
}

/// Expand tilde in path
pub fn expand_tilde<P: AsRef<Path>>(path: P) -> PathBuf {
    let path = path.as_ref();

    if let Some(path_str) = path.to_str() {
        if let Some(rest) = path_str.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        } else if path_str == "~" {
            if let Some(home) = dirs::home_dir() {
                return home;
            }
        }
    }

    path.to_path_buf()
}

/// Check if file has any of the given extensions
pub fn has_extension<P: AsRef<Path>>(path: P, extensions: &[&str]) -> bool {
    let path = path.as_ref();

    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        extensions
            .iter()
            .any(|&expected| ext.eq_ignore_ascii_case(expected))
    } else {
        false
    }
}

/// Name of the OS user running the process, used for "created by" fields
pub fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .ok()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_is_subdirectory() {
        let base = Path::new("/srv/assets");
        let inside = Path::new("/srv/assets/plates/bg.png");
        let outside = Path::new("/home/user/Downloads/bg.png");

        assert!(is_subdirectory(base, inside));
        assert!(!is_subdirectory(base, outside));
        assert!(is_subdirectory(base, base));
    }

    #[test]
    fn test_expand_tilde() {
        if dirs::home_dir().is_some() {
            let expanded = expand_tilde("~/projects");
            assert!(expanded.to_string_lossy().contains("projects"));
            assert!(!expanded.to_string_lossy().starts_with('~'));
        }

        let unchanged = expand_tilde("/absolute/path");
        assert_eq!(unchanged, Path::new("/absolute/path"));
    }

    #[test]
    fn test_has_extension() {
        assert!(has_extension("ShotA_comp.aep", &["aep"]));
        assert!(has_extension("ShotA_comp.AEP", &["aep"]));
        assert!(!has_extension("ShotA_comp.aep.bak", &["aep"]));
        assert!(!has_extension("README", &["aep"]));
    }

    #[test]
    fn test_current_user_never_empty() {
        assert!(!current_user().is_empty());
    }

    #[tokio::test]
    async fn test_ensure_directory_exists() {
        let temp_dir = TempDir::new().unwrap();
        let new_dir = temp_dir.path().join("templates");

        ensure_directory_exists(&new_dir).await.unwrap();
        assert!(new_dir.is_dir());

        // Idempotent
        ensure_directory_exists(&new_dir).await.unwrap();

        let file = temp_dir.path().join("file");
        std::fs::write(&file, b"x").unwrap();
        assert!(ensure_directory_exists(&file).await.is_err());
    }
}
