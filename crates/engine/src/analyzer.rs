//! The seam between buffer text and highlight instructions.

use std::collections::HashMap;
use std::sync::Arc;

use taglight_buffer::{Buffer, LineStore};
use taglight_project::ProjectCache;

use crate::{KeywordSet, Result};

/// Highlight `[start, end)` of `line` with `group`. Columns are byte offsets;
/// `end == -1` extends to the end of the line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoration {
	/// 0-based line.
	pub line: u64,
	/// First byte.
	pub start: u64,
	/// One past the last byte, or -1.
	pub end: i64,
	/// Host highlight group.
	pub group: String,
}

/// Decides which byte ranges of a buffer get which highlight group.
pub trait Analyzer: Send + Sync {
	/// Name used in logs.
	fn name(&self) -> &str;

	/// Computes decorations for the buffer.
	///
	/// Runs with the buffer's line lock held, so `lines` cannot change underneath
	/// it. Reading the buffer again from inside is allowed.
	fn decorate(&self, buffer: &Buffer, lines: &LineStore) -> Result<Vec<Decoration>>;

	/// Refreshes the project-wide output shared by buffers of one project.
	fn update_project(&self, _cache: &ProjectCache) -> Result<()> {
		Ok(())
	}
}

/// Analyzers by filetype.
#[derive(Clone, Default)]
pub struct Analyzers {
	by_filetype: HashMap<String, Arc<dyn Analyzer>>,
}

impl std::fmt::Debug for Analyzers {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let mut filetypes: Vec<_> = self.by_filetype.keys().collect();
		filetypes.sort();
		f.debug_struct("Analyzers").field("filetypes", &filetypes).finish()
	}
}

impl Analyzers {
	/// Creates an empty set.
	pub fn new() -> Self {
		Self::default()
	}

	/// One keyword analyzer per filetype named by the word lists.
	pub fn from_keywords(sets: &[KeywordSet]) -> Self {
		let mut per_filetype: HashMap<&str, Vec<&KeywordSet>> = HashMap::new();
		for set in sets {
			for ft in &set.filetypes {
				per_filetype.entry(ft.as_str()).or_default().push(set);
			}
		}
		let mut analyzers = Self::new();
		for (ft, sets) in per_filetype {
			let analyzer = KeywordAnalyzer::new(sets.into_iter().cloned());
			analyzers.register([ft], Arc::new(analyzer));
		}
		analyzers
	}

	/// Registers `analyzer` for each filetype, replacing earlier registrations.
	pub fn register<'a>(&mut self, filetypes: impl IntoIterator<Item = &'a str>, analyzer: Arc<dyn Analyzer>) {
		for ft in filetypes {
			self.by_filetype.insert(ft.to_owned(), Arc::clone(&analyzer));
		}
	}

	/// The analyzer for a filetype.
	pub fn get(&self, filetype: &str) -> Option<Arc<dyn Analyzer>> {
		self.by_filetype.get(filetype).cloned()
	}

	/// Returns true if nothing is registered.
	pub fn is_empty(&self) -> bool {
		self.by_filetype.is_empty()
	}
}

/// Highlights whole-word occurrences of fixed word lists.
#[derive(Debug, Clone, Default)]
pub struct KeywordAnalyzer {
	groups: HashMap<Vec<u8>, String>,
}

impl KeywordAnalyzer {
	/// Builds the lookup from word lists; a word listed twice keeps its last group.
	pub fn new(sets: impl IntoIterator<Item = KeywordSet>) -> Self {
		let mut groups = HashMap::new();
		for set in sets {
			for word in set.words {
				groups.insert(word.into_bytes(), set.group.clone());
			}
		}
		Self { groups }
	}
}

impl Analyzer for KeywordAnalyzer {
	fn name(&self) -> &str {
		"keywords"
	}

	fn decorate(&self, _buffer: &Buffer, lines: &LineStore) -> Result<Vec<Decoration>> {
		let mut out = Vec::new();
		for (line, text) in (0u64..).zip(lines.iter()) {
			for (start, end) in words(text) {
				if let Some(group) = self.groups.get(&text[start..end]) {
					out.push(Decoration {
						line,
						start: start as u64,
						end: end as i64,
						group: group.clone(),
					});
				}
			}
		}
		Ok(out)
	}
}

/// Byte ranges of identifier-like words.
fn words(text: &[u8]) -> impl Iterator<Item = (usize, usize)> + '_ {
	let is_word = |b: u8| b.is_ascii_alphanumeric() || b == b'_';
	let mut pos = 0;
	std::iter::from_fn(move || {
		while pos < text.len() && !is_word(text[pos]) {
			pos += 1;
		}
		if pos == text.len() {
			return None;
		}
		let start = pos;
		while pos < text.len() && is_word(text[pos]) {
			pos += 1;
		}
		Some((start, pos))
	})
}
