//! Choosing the project root a buffer's cache is keyed by.

use std::path::{Path, PathBuf};

/// A user-declared project directory for one filetype.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct ProjectOverride {
	/// Directory treated as the project root for every file beneath it.
	pub path: PathBuf,
	/// Filetype the override applies to.
	pub filetype: String,
}

/// Parses a project directories file: one `path<TAB>filetype` pair per line.
///
/// Lines without a tab are skipped, as are blank lines.
pub fn parse_project_dirs(text: &str) -> Vec<ProjectOverride> {
	text.lines()
		.filter_map(|line| {
			let line = line.trim_end_matches('\r');
			let (path, filetype) = line.split_once('\t')?;
			let filetype = filetype.trim();
			if path.is_empty() || filetype.is_empty() {
				return None;
			}
			Some(ProjectOverride {
				path: PathBuf::from(path),
				filetype: filetype.to_owned(),
			})
		})
		.collect()
}

/// C and C++ share project overrides.
pub fn is_c_family(filetype: &str) -> bool {
	matches!(filetype, "c" | "cpp")
}

/// The outcome of root selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRoot {
	/// Cache key: the project directory, or the file itself when recursion is disabled.
	pub key: PathBuf,
	/// The directory that was selected before the deny-list was consulted.
	pub dir: PathBuf,
	/// False when `dir` is on the deny-list and analyzers must not scan it recursively.
	pub recurse: bool,
}

/// Picks project roots from overrides and a recursion deny-list.
#[derive(Debug, Clone, Default)]
pub struct RootSelector {
	overrides: Vec<ProjectOverride>,
	norecurse: Vec<PathBuf>,
}

impl RootSelector {
	/// Creates a selector.
	pub fn new(overrides: Vec<ProjectOverride>, norecurse: Vec<PathBuf>) -> Self {
		Self { overrides, norecurse }
	}

	/// Adds overrides, e.g. parsed from a project directories file.
	pub fn extend_overrides(&mut self, more: impl IntoIterator<Item = ProjectOverride>) {
		self.overrides.extend(more);
	}

	/// Selects the root for `file` of `filetype`.
	///
	/// The longest override containing the file wins; without one, the file's own
	/// directory is used. If that directory is on the deny-list the key becomes the
	/// file's full path so unrelated files never share a cache.
	pub fn select(&self, file: &Path, filetype: &str) -> ProjectRoot {
		let fallback = file.parent().map(Path::to_path_buf).unwrap_or_default();
		let dir = self
			.overrides
			.iter()
			.filter(|o| filetype_matches(&o.filetype, filetype) && file.starts_with(&o.path))
			.max_by_key(|o| o.path.as_os_str().len())
			.map(|o| o.path.clone())
			.unwrap_or(fallback);

		let recurse = !self.norecurse.iter().any(|denied| *denied == dir);
		if !recurse {
			tracing::debug!(dir = %dir.display(), "project directory is not recursed");
		}
		let key = if recurse { dir.clone() } else { file.to_path_buf() };
		ProjectRoot { key, dir, recurse }
	}
}

fn filetype_matches(declared: &str, filetype: &str) -> bool {
	if is_c_family(filetype) {
		is_c_family(declared)
	} else {
		declared == filetype
	}
}
