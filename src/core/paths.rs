//! Repo-relative path helpers and the unique path allocator.
//!
//! Repo-relative paths are plain `/`-separated strings (`unit-1/intro.md`),
//! the same form the plumbing reports and the course descriptor stores.
//!
//! # Public API
//! - [`slugify`]: filesystem-safe slug of a display name
//! - [`join_path`], [`parent_dir`], [`file_name`]: string path arithmetic
//! - [`in_scope`]: whether a path falls under a resolve scope
//! - [`UniquePath`], [`create_unique_path`]: collision-free name allocation

use crate::core::vfs::Filesystem;
use std::io;
use std::path::Path;

/// Words spelled out for symbols that would otherwise vanish from a slug.
const SYMBOL_WORDS: &[(char, &str)] = &[
    ('&', "and"),
    ('|', "or"),
    ('<', "less"),
    ('>', "greater"),
    ('$', "dollar"),
    ('%', "percent"),
    ('¢', "cent"),
    ('£', "pound"),
    ('¥', "yen"),
    ('€', "euro"),
    ('∞', "infinity"),
    ('♥', "love"),
];

/// ASCII spelling of one character, if it has one.
fn transliterate(ch: char) -> Option<&'static str> {
    SYMBOL_WORDS
        .iter()
        .find(|(symbol, _)| *symbol == ch)
        .map(|(_, word)| *word)
        .or_else(|| deunicode::deunicode_char(ch))
}

/// Lowercase ASCII slug, dash-separated and limited to `max_len` characters.
///
/// Letters are transliterated to ASCII (`é` becomes `e`) and a few symbols
/// are spelled out (`&` becomes `and`). Runs of whitespace, `-` and `_`
/// collapse into a single `-`; anything else is dropped.
pub fn slugify(name: &str, max_len: usize) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    let mut push = |ch: char, slug: &mut String| {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else if ch.is_whitespace() || ch == '-' || ch == '_' {
            pending_dash = true;
        }
    };

    for ch in name.chars() {
        if ch.is_ascii() && !SYMBOL_WORDS.iter().any(|(symbol, _)| *symbol == ch) {
            push(ch, &mut slug);
        } else if let Some(ascii) = transliterate(ch) {
            ascii.chars().for_each(|ch| push(ch, &mut slug));
        }
    }

    slug.chars().take(max_len).collect()
}

/// Join two repo-relative paths.
pub fn join_path(base: &str, name: &str) -> String {
    let base = base.trim_end_matches('/');
    let name = name.trim_start_matches('/');

    if base.is_empty() || base == "." {
        name.to_string()
    } else if name.is_empty() {
        base.to_string()
    } else {
        format!("{base}/{name}")
    }
}

/// Parent directory of a repo-relative path (`""` at the top level).
pub fn parent_dir(path: &str) -> &str {
    path.trim_end_matches('/')
        .rsplit_once('/')
        .map(|(parent, _)| parent)
        .unwrap_or("")
}

/// Final component of a repo-relative path.
pub fn file_name(path: &str) -> &str {
    let path = path.trim_end_matches('/');
    path.rsplit_once('/').map(|(_, name)| name).unwrap_or(path)
}

/// Whether `path` is covered by `scope`.
///
/// `None`, `""` and `"."` cover everything; otherwise a path is covered when
/// it equals a scope entry or lies beneath it.
pub fn in_scope(path: &str, scope: Option<&[String]>) -> bool {
    let Some(scope) = scope else {
        return true;
    };

    scope.iter().any(|entry| {
        let entry = entry.trim_end_matches('/');
        entry.is_empty()
            || entry == "."
            || path == entry
            || path
                .strip_prefix(entry)
                .is_some_and(|rest| rest.starts_with('/'))
    })
}

/// Request for [`create_unique_path`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniquePath<'a> {
    pub name: &'a str,
    pub base_path: &'a str,
    pub is_file: bool,
    pub extension: &'a str,
    /// A path the caller already owns; returned as soon as it is generated.
    pub overwrite: Option<&'a str>,
    /// Paths claimed but not yet on disk, treated as taken.
    pub reserved: &'a [String],
}

impl<'a> UniquePath<'a> {
    pub fn file(name: &'a str, base_path: &'a str) -> Self {
        Self {
            name,
            base_path,
            is_file: true,
            extension: ".md",
            overwrite: None,
            reserved: &[],
        }
    }

    pub fn dir(name: &'a str, base_path: &'a str) -> Self {
        Self {
            name,
            base_path,
            is_file: false,
            extension: "",
            overwrite: None,
            reserved: &[],
        }
    }

    pub fn with_extension(mut self, extension: &'a str) -> Self {
        self.extension = extension;
        self
    }

    pub fn overwriting(mut self, path: &'a str) -> Self {
        self.overwrite = Some(path);
        self
    }

    pub fn reserving(mut self, paths: &'a [String]) -> Self {
        self.reserved = paths;
        self
    }

    /// The `copy`-th candidate: `base/name`, then `base/name-1`, `base/name-2`, ...
    pub fn candidate(&self, copy: usize) -> String {
        let suffix = if copy == 0 {
            String::new()
        } else {
            format!("-{copy}")
        };
        let extension = if self.is_file { self.extension } else { "" };

        join_path(self.base_path, &format!("{}{suffix}{extension}", self.name))
    }
}

/// Allocate a repo-relative path that does not collide with anything on disk
/// or with the request's reserved paths.
///
/// Candidates are tried in order; the first one equal to the request's
/// `overwrite` path, or neither reserved nor present on the filesystem, wins.
/// Only `NotFound` counts as absent, other stat failures are returned.
pub async fn create_unique_path(
    fs: &dyn Filesystem,
    repo_root: &Path,
    request: &UniquePath<'_>,
) -> io::Result<String> {
    let mut copy = 0usize;

    loop {
        let candidate = request.candidate(copy);

        if request.overwrite == Some(candidate.as_str()) {
            return Ok(candidate);
        }
        if !request.reserved.contains(&candidate) && !fs.exists(&repo_root.join(&candidate)).await? {
            return Ok(candidate);
        }

        log::debug!("Path '{candidate}' is taken, trying the next suffix");
        copy += 1;
    }
}
