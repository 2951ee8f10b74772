use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{Error, ErrorKind};

/// Creates a loader that serves templates from a directory.
///
/// Template names use forward slashes regardless of platform; names that
/// would escape the directory resolve to not found.
///
/// ```rust,no_run
/// # use tinyjinja::{path_loader, Environment};
/// let mut env = Environment::new();
/// env.set_loader(path_loader("templates"));
/// ```
pub fn path_loader<P: AsRef<Path>>(
    dir: P,
) -> impl Fn(&str) -> Result<Option<String>, Error> + Send + Sync + 'static {
    let dir = dir.as_ref().to_path_buf();
    move |name| {
        let path = match safe_join(&dir, name) {
            Some(path) => path,
            None => return Ok(None),
        };
        match fs::read_to_string(path) {
            Ok(source) => Ok(Some(source)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Error::new(
                ErrorKind::InvalidOperation,
                format!("could not read template {name:?}"),
            )
            .with_source(err)),
        }
    }
}

/// Joins a template name onto a base directory, rejecting traversal.
fn safe_join(base: &Path, name: &str) -> Option<PathBuf> {
    let mut rv = base.to_path_buf();
    for segment in name.split('/') {
        if segment.is_empty() || segment.starts_with('.') || segment.contains('\\') {
            return None;
        }
        rv.push(segment);
    }
    Some(rv)
}
