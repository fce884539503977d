use std::{
    fs,
    path::{Path, PathBuf},
};

/// Writes `content` to `dir/name` and returns the full path.
pub fn write_script(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

/// Same as [`write_script`], with the executable bits set.
pub fn write_executable(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = write_script(dir, name, content);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_mode(perms.mode() | 0o111);
        fs::set_permissions(&path, perms).unwrap();
    }
    path
}
