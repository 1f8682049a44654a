//! Entry selection by name and glob pattern.

use std::path::Path;

/// Include/exclude patterns applied to entry names.
///
/// With no include patterns every entry is selected. Patterns containing
/// `*` or `?` are globs over the full entry name; plain patterns match the
/// full name or the base name.
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl EntryFilter {
    pub fn new(include: Vec<String>, exclude: Vec<String>) -> Self {
        Self { include, exclude }
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    pub fn matches(&self, name: &str) -> bool {
        if !self.include.is_empty() && !self.include.iter().any(|p| include_match(p, name)) {
            return false;
        }

        !self
            .exclude
            .iter()
            .any(|x| name.contains(x.as_str()) || glob_match(x, name))
    }
}

fn include_match(pattern: &str, name: &str) -> bool {
    if has_glob_chars(pattern) {
        return glob_match(pattern, name);
    }
    let trimmed = name.trim_end_matches('/');
    let basename = Path::new(trimmed)
        .file_name()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();
    name == pattern || trimmed == pattern || basename == pattern
}

/// Check if a pattern contains glob wildcard characters.
fn has_glob_chars(pattern: &str) -> bool {
    pattern.contains('*') || pattern.contains('?')
}

/// Simple glob pattern matching supporting `*` and `?` wildcards.
///
/// - `*` matches zero or more characters
/// - `?` matches exactly one character
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern_chars: Vec<char> = pattern.chars().collect();
    let text_chars: Vec<char> = text.chars().collect();

    // Iterative matcher with single-star backtracking, linear in practice.
    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while t < text_chars.len() {
        match pattern_chars.get(p) {
            Some('*') => {
                star = Some((p, t));
                p += 1;
            }
            Some('?') => {
                p += 1;
                t += 1;
            }
            Some(c) if *c == text_chars[t] => {
                p += 1;
                t += 1;
            }
            _ => match star {
                Some((sp, st)) => {
                    p = sp + 1;
                    t = st + 1;
                    star = Some((sp, st + 1));
                }
                None => return false,
            },
        }
    }

    pattern_chars[p..].iter().all(|c| *c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_wildcards() {
        assert!(glob_match("*.txt", "readme.txt"));
        assert!(glob_match("file?.dat", "file1.dat"));
        assert!(glob_match("dir/*", "dir/a/b.txt"));
        assert!(glob_match("*", ""));
        assert!(!glob_match("*.txt", "readme.md"));
        assert!(!glob_match("file?.dat", "file.dat"));
    }

    #[test]
    fn empty_filter_selects_everything() {
        let filter = EntryFilter::default();
        assert!(filter.is_empty());
        assert!(filter.matches("anything/at/all"));
    }

    #[test]
    fn include_by_full_or_base_name() {
        let filter = EntryFilter::new(vec!["b.txt".into()], vec![]);
        assert!(filter.matches("a/b.txt"));
        assert!(filter.matches("b.txt"));
        assert!(!filter.matches("a/c.txt"));
    }

    #[test]
    fn exclude_wins_over_include() {
        let filter = EntryFilter::new(vec!["*.txt".into()], vec!["secret".into()]);
        assert!(filter.matches("notes.txt"));
        assert!(!filter.matches("secret.txt"));
    }
}
