use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};
use url::Url;

use crate::error::DownloadError;

/// Append an item name to a remote directory path.
pub fn join_remote(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{}{}", dir, name)
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Append an item name to a relative-path prefix (empty at the root).
pub fn join_relative(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}

/// Map a forward-slash relative path onto `root`.
///
/// Empty and `.` segments are dropped; `..` or anything that would turn the
/// result absolute is rejected.
pub fn local_path(root: &Path, relative: &str) -> Result<PathBuf, DownloadError> {
    let mut path = root.to_path_buf();
    let mut pushed = false;
    for segment in relative.split('/') {
        if segment.is_empty() || segment == "." {
            continue;
        }
        let mut components = Path::new(segment).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None) => {
                path.push(part);
                pushed = true;
            }
            _ => return Err(DownloadError::UnsafePath(relative.to_string())),
        }
    }
    if !pushed {
        return Err(DownloadError::UnsafePath(relative.to_string()));
    }
    Ok(path)
}

/// Where an in-progress download of `relative` is written before it is
/// renamed into place.
///
/// Staged files live in their own flat directory under a hashed name, so no
/// remote item can share a path with one.
pub fn staging_path(staging_dir: &Path, relative: &str) -> PathBuf {
    let digest = Sha256::digest(relative.as_bytes());
    staging_dir.join(format!("{}.part", hex::encode(digest)))
}

/// Directory name for a share: its host, plus the port when one is given.
pub fn host_dir(url: &Url) -> String {
    let host = url.host_str().unwrap_or("unknown-host");
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

/// Normalize a proxy setting; bare `host:port` means a SOCKS5 proxy with
/// remote DNS.
pub fn proxy_url(raw: &str) -> String {
    if raw.contains("://") {
        raw.to_string()
    } else {
        format!("socks5h://{}", raw)
    }
}
