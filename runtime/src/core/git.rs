use crate::shared::error::{RuntimeError, RuntimeResult};
use shared_utils::find_file_in_path;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::process::Command;
use tracing::info;

/// A repository checkout that removes itself when dropped.
pub struct ClonedRepo {
    dir: TempDir,
}

impl ClonedRepo {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Shallow-clones a repository into a temporary directory.
///
/// An access token, when provided, is injected into the https URL for the
/// clone only; it is never persisted.
pub async fn clone_repository(
    repo_url: &str,
    branch: &str,
    token: Option<&str>,
) -> RuntimeResult<ClonedRepo> {
    let dir = TempDir::new()
        .map_err(|e| RuntimeError::Engine(format!("Failed to create clone directory: {e}")))?;

    let url = match token {
        Some(token) if repo_url.starts_with("https://") => {
            repo_url.replacen("https://", &format!("https://{token}@"), 1)
        }
        _ => repo_url.to_string(),
    };

    info!("Cloning repository {repo_url} (branch {branch})");
    let output = Command::new("git")
        .args(["clone", "--depth", "1", "--branch", branch, &url])
        .arg(dir.path())
        .output()
        .await
        .map_err(|e| RuntimeError::Engine(format!("Failed to run git: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(RuntimeError::Engine(format!(
            "git clone failed: {}",
            stderr.trim()
        )));
    }

    Ok(ClonedRepo { dir })
}

/// Locates the Dockerfile inside a checkout. An explicit relative path wins;
/// otherwise the repository root is searched.
pub fn find_dockerfile(repo_path: &Path, dockerfile_path: Option<&str>) -> RuntimeResult<PathBuf> {
    if let Some(rel) = dockerfile_path {
        let candidate = repo_path.join(rel);
        if candidate.is_file() {
            return Ok(candidate);
        }
        return Err(RuntimeError::Engine(format!(
            "No Dockerfile at '{rel}' in the repository"
        )));
    }

    find_file_in_path("Dockerfile", repo_path)
        .map(PathBuf::from)
        .ok_or_else(|| {
            RuntimeError::Engine("No Dockerfile found at the repository root".to_string())
        })
}

/// Reads the first `EXPOSE` directive of a Dockerfile, if any.
pub fn parse_dockerfile_expose(dockerfile: &Path) -> Option<u16> {
    let content = std::fs::read_to_string(dockerfile).ok()?;
    for line in content.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("EXPOSE") {
            let port = rest.split_whitespace().next()?;
            // "8080/tcp" style declarations carry the protocol suffix.
            let port = port.split('/').next()?;
            return port.parse().ok();
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_parse_dockerfile_expose() {
        let dir = tempfile::tempdir().unwrap();
        let dockerfile = dir.path().join("Dockerfile");
        fs::write(&dockerfile, "FROM nginx:alpine\nEXPOSE 8080/tcp\n").unwrap();
        assert_eq!(parse_dockerfile_expose(&dockerfile), Some(8080));

        fs::write(&dockerfile, "FROM nginx:alpine\nEXPOSE 3000 9000\n").unwrap();
        assert_eq!(parse_dockerfile_expose(&dockerfile), Some(3000));

        fs::write(&dockerfile, "FROM scratch\n").unwrap();
        assert_eq!(parse_dockerfile_expose(&dockerfile), None);
    }

    #[test]
    fn test_find_dockerfile_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("deploy");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("Dockerfile"), "FROM scratch\n").unwrap();

        let found = find_dockerfile(dir.path(), Some("deploy/Dockerfile")).unwrap();
        assert!(found.ends_with("deploy/Dockerfile"));

        assert!(find_dockerfile(dir.path(), None).is_err());
        fs::write(dir.path().join("Dockerfile"), "FROM scratch\n").unwrap();
        assert!(find_dockerfile(dir.path(), None).is_ok());
    }
}
