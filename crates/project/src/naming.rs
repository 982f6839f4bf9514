use std::path::{MAIN_SEPARATOR, Path, PathBuf};

use crate::Compression;

/// Subdirectory of the cache directory holding archived output.
pub(crate) const ARCHIVE_DIR: &str = "tags";

/// Flattens a path into a single file name component.
///
/// Every path separator (and on Windows, the drive colon) becomes `__`.
pub fn sanitize_path(path: &Path) -> String {
	let raw = path.to_string_lossy();
	let mut out = String::with_capacity(raw.len() + 8);
	for c in raw.chars() {
		if c == MAIN_SEPARATOR || c == '/' || (cfg!(windows) && c == ':') {
			out.push_str("__");
		} else {
			out.push(c);
		}
	}
	out
}

/// Location of the archived output for a project key and filetype:
/// `<cache_dir>/tags/<sanitized key>.<filetype>.tags[.gz]`.
pub fn archive_path(cache_dir: &Path, key: &Path, filetype: &str, compression: Compression) -> PathBuf {
	let mut name = sanitize_path(key);
	name.push('.');
	name.push_str(filetype);
	name.push_str(".tags");
	if let Some(ext) = compression.extension() {
		name.push('.');
		name.push_str(ext);
	}
	cache_dir.join(ARCHIVE_DIR).join(name)
}
