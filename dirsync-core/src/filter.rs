use globset::{GlobBuilder, GlobMatcher};
use std::path::Path;

/// Ignore rules compiled from the configured pattern list.
///
/// Every pattern is checked two ways: as a glob against the final path
/// segment, and as a plain substring of the whole path. Either hit ignores
/// the path.
#[derive(Debug, Clone, Default)]
pub struct IgnoreFilter {
    rules: Vec<Rule>,
}

#[derive(Debug, Clone)]
struct Rule {
    raw: String,
    // None when the pattern is not valid glob syntax
    glob: Option<GlobMatcher>,
}

impl IgnoreFilter {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        let rules = patterns
            .iter()
            .map(|p| p.as_ref().trim())
            .filter(|p| !p.is_empty())
            .map(|p| Rule {
                raw: p.to_string(),
                glob: GlobBuilder::new(p)
                    .literal_separator(true)
                    .build()
                    .ok()
                    .map(|g| g.compile_matcher()),
            })
            .collect();
        Self { rules }
    }

    pub fn is_ignored<P: AsRef<Path>>(&self, path: P) -> bool {
        let path = path.as_ref();
        let name = path.file_name().map(Path::new);
        let full = path.to_string_lossy();
        self.rules.iter().any(|rule| {
            let by_name = match (&rule.glob, name) {
                (Some(glob), Some(name)) => glob.is_match(name),
                _ => false,
            };
            by_name || full.contains(rule.raw.as_str())
        })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
