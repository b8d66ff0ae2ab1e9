use std::fs;
use std::path::PathBuf;

use anyhow::bail;

const MEMORY_PREFIX: &str = "sqlite::memory:";
const URL_PREFIX: &str = "sqlite://";

pub fn validate_sqlite_url(url: &str) -> anyhow::Result<()> {
    if url.starts_with(MEMORY_PREFIX) {
        return Ok(());
    }
    if !url.starts_with(URL_PREFIX) {
        bail!("database url must start with `sqlite://` or use `sqlite::memory:`");
    }
    if sqlite_file_path(url).is_none() {
        bail!("database url is missing a filesystem component after `sqlite://`");
    }
    Ok(())
}

/// Creates the directory the database file lives in, if any.
pub fn ensure_sqlite_parent_dir(url: &str) -> anyhow::Result<()> {
    let Some(path) = sqlite_file_path(url) else {
        return Ok(());
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn sqlite_file_path(url: &str) -> Option<PathBuf> {
    let rest = url.strip_prefix(URL_PREFIX)?;
    let path_part = rest.split_once('?').map(|(path, _)| path).unwrap_or(rest);
    if path_part.is_empty() {
        return None;
    }
    Some(PathBuf::from(path_part))
}
