use std::env;
use std::fs::{self, Metadata};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::debug;
use tysh_types::{ShellError, ShellResult};

/// Resolve a command name to an executable path.
///
/// Names containing a path separator (or starting with `.`) are checked
/// directly; everything else is searched through `$PATH` in order. The search
/// stops at the first directory whose entry matches the name: a matching
/// entry that is not a regular executable file fails the whole lookup rather
/// than falling through to later directories, mirroring the first-match-wins
/// behavior of real shells.
pub fn resolve(name: &str) -> ShellResult<PathBuf> {
    if name.is_empty() {
        return Err(ShellError::NotFound(name.to_string()));
    }
    if name.contains('/') || name.starts_with('.') {
        return resolve_direct(name);
    }

    let path_var = env::var("PATH").unwrap_or_default();
    let dirs: Vec<PathBuf> = path_var.split(':').map(PathBuf::from).collect();
    resolve_in(&dirs, name)
}

fn resolve_direct(name: &str) -> ShellResult<PathBuf> {
    let path = Path::new(name);
    match fs::metadata(path) {
        Ok(md) if md.is_file() && is_executable(&md) => Ok(path.to_path_buf()),
        Ok(_) => {
            debug!("direct candidate {name} exists but is not executable");
            Err(ShellError::NotFound(name.to_string()))
        }
        Err(_) => Err(ShellError::NotFound(name.to_string())),
    }
}

/// PATH-style search over an explicit directory list.
pub fn resolve_in(dirs: &[PathBuf], name: &str) -> ShellResult<PathBuf> {
    for dir in dirs {
        if dir.as_os_str().is_empty() {
            continue;
        }
        let candidate = dir.join(name);
        if let Ok(md) = fs::metadata(&candidate) {
            if md.is_file() && is_executable(&md) {
                debug!("resolved {name} -> {}", candidate.display());
                return Ok(candidate);
            }
            // First name match wins; do not keep scanning later directories.
            debug!(
                "candidate {} matched by name but is not a regular executable",
                candidate.display()
            );
            return Err(ShellError::NotFound(name.to_string()));
        }
    }
    Err(ShellError::NotFound(name.to_string()))
}

fn is_executable(md: &Metadata) -> bool {
    md.permissions().mode() & 0o111 != 0
}
