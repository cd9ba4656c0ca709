use std::fs;
use std::io;
use std::path::Path;
use tar::Builder;

/// Recursively appends a directory's files to a tar archive.
///
/// Entry names are relative to `base_path`. Files and directories whose
/// name appears in `excludes` are skipped entirely. Non-UTF-8 path
/// components are an error rather than a panic: archive entry names are
/// strings on the wire.
pub fn add_dir_to_tar<W: io::Write>(
    tar: &mut Builder<W>,
    src_dir: &Path,
    base_path: &Path,
    excludes: &[&str],
) -> io::Result<()> {
    for entry in fs::read_dir(src_dir)? {
        let path = entry?.path();
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| non_utf8_path(&path))?;
        if excludes.contains(&file_name) {
            continue;
        }

        if path.is_dir() {
            add_dir_to_tar(tar, &path, base_path, excludes)?;
        } else {
            let entry_name = relative_entry_name(&path, base_path)?;
            tar.append_path_with_name(&path, entry_name)?;
        }
    }

    Ok(())
}

/// Packs a directory into an in-memory tar archive suitable for use as an
/// image build context.
pub fn pack_build_context(context_dir: &Path, excludes: &[&str]) -> io::Result<Vec<u8>> {
    let mut tar = Builder::new(Vec::new());
    add_dir_to_tar(&mut tar, context_dir, context_dir, excludes)?;
    tar.into_inner()
}

/// Looks for a directly contained file by name and returns its full path.
pub fn find_file_in_path(file_name: &str, dir: &Path) -> Option<String> {
    fs::read_dir(dir)
        .ok()?
        .flatten()
        .map(|entry| entry.path())
        .find(|path| path.file_name().and_then(|name| name.to_str()) == Some(file_name))
        .and_then(|path| path.to_str().map(str::to_string))
}

fn relative_entry_name(path: &Path, base: &Path) -> io::Result<String> {
    let relative = path
        .strip_prefix(base)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "entry escapes archive base"))?;
    relative
        .to_str()
        .map(str::to_string)
        .ok_or_else(|| non_utf8_path(relative))
}

fn non_utf8_path(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("path is not valid UTF-8: {}", path.display()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_build_context_skips_excluded_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Dockerfile"), "FROM scratch\n").unwrap();
        fs::write(dir.path().join("secret.env"), "TOKEN=x\n").unwrap();

        let bytes = pack_build_context(dir.path(), &["secret.env"]).unwrap();

        let mut archive = tar::Archive::new(&bytes[..]);
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["Dockerfile".to_string()]);
    }

    #[test]
    fn test_pack_build_context_skips_excluded_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Dockerfile"), "FROM scratch\n").unwrap();
        let git_dir = dir.path().join(".git");
        fs::create_dir_all(&git_dir).unwrap();
        fs::write(git_dir.join("HEAD"), "ref: refs/heads/main\n").unwrap();

        let bytes = pack_build_context(dir.path(), &[".git"]).unwrap();

        let mut archive = tar::Archive::new(&bytes[..]);
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["Dockerfile".to_string()]);
    }

    #[test]
    fn test_entry_names_are_relative_to_base() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("app");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("main.py"), "print('hi')\n").unwrap();

        let bytes = pack_build_context(dir.path(), &[]).unwrap();

        let mut archive = tar::Archive::new(&bytes[..]);
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["app/main.py".to_string()]);
    }

    #[test]
    fn test_find_file_in_path() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Dockerfile"), "FROM scratch\n").unwrap();

        let found = find_file_in_path("Dockerfile", dir.path());
        assert!(found.is_some());
        assert!(found.unwrap().ends_with("Dockerfile"));
        assert!(find_file_in_path("missing", dir.path()).is_none());
    }
}
