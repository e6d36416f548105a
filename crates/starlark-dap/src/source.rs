use std::path::{Path, PathBuf};

/// Map a path reported by the debug server to a file in the workspace.
///
/// The interpreter may report paths under its own execution root, which is
/// often a tree of symlinks back into the workspace. Relative paths are
/// resolved against `workspace_root`; anything that cannot be canonicalized is
/// returned unchanged.
pub fn resolve_source_path(path: &str, workspace_root: Option<&Path>) -> PathBuf {
    let raw = Path::new(path);
    let joined = match workspace_root {
        Some(root) if raw.is_relative() => root.join(raw),
        _ => raw.to_path_buf(),
    };

    match std::fs::canonicalize(&joined) {
        Ok(resolved) => resolved,
        Err(err) => {
            tracing::trace!(
                target: "starlark.dap",
                path = %joined.display(),
                error = %err,
                "could not resolve source path"
            );
            joined
        }
    }
}

/// File name shown as `source.name` in stack traces.
pub fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
