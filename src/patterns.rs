// src/patterns.rs

//! Compiled glob matchers and the ordered pattern registry.
//!
//! A [`Matcher`] is one positive pattern compiled against an absolute base
//! directory, together with the negative patterns of the same `add` call and
//! the event-interest flags that apply to paths it matches. The
//! [`PatternRegistry`] keeps matchers ordered by descending base depth so the
//! most specific matcher is consulted first.

use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use tracing::debug;

use crate::errors::Result;
use crate::path_utils::{resolve, separator_depth, split_pattern};

/// Options for one `add` call on the registry.
#[derive(Debug, Clone)]
pub struct MatcherOptions {
    /// Absolute directory the patterns are relative to.
    pub cwd: PathBuf,
    /// Match path components that start with a dot.
    pub dot: bool,
    pub case_insensitive: bool,
    /// Extra negative patterns, combined with any `!`-prefixed patterns from
    /// the same call.
    pub ignore: Vec<String>,
    /// Suppress `add` events for zero-byte new files matched only by this
    /// matcher.
    pub ignore_empty_new_files: bool,
    /// Whether content mutations of matched paths are of interest. Scans
    /// leave this off; explicit watches turn it on.
    pub accept_change_events: bool,
}

impl MatcherOptions {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            dot: false,
            case_insensitive: false,
            ignore: Vec::new(),
            ignore_empty_new_files: false,
            accept_change_events: false,
        }
    }
}

/// A compiled glob predicate with its literal base, globstar flag, and
/// event-interest flags.
#[derive(Debug, Clone)]
pub struct Matcher {
    cwd: PathBuf,
    base: PathBuf,
    glob: String,
    depth: usize,
    is_globstar: bool,
    /// `None` for literal patterns; those match by base equality.
    include: Option<GlobSet>,
    /// Negatives, matched against the cwd-relative path.
    exclude: Option<GlobSet>,
    dot: bool,
    ignore_empty_new_files: bool,
    accept_change_events: bool,
}

impl Matcher {
    pub fn compile(pattern: &str, negatives: &[String], opts: &MatcherOptions) -> Result<Self> {
        let parts = split_pattern(pattern);
        let base = resolve(&opts.cwd, &parts.base);

        let include = if parts.glob.is_empty() {
            None
        } else {
            Some(build_globset(
                std::slice::from_ref(&parts.glob),
                opts.case_insensitive,
            )?)
        };

        let exclude = if negatives.is_empty() {
            None
        } else {
            Some(build_globset(negatives, opts.case_insensitive)?)
        };

        Ok(Self {
            cwd: opts.cwd.clone(),
            depth: separator_depth(&base),
            base,
            is_globstar: parts.is_globstar,
            glob: parts.glob,
            include,
            exclude,
            dot: opts.dot,
            ignore_empty_new_files: opts.ignore_empty_new_files,
            accept_change_events: opts.accept_change_events,
        })
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_globstar(&self) -> bool {
        self.is_globstar
    }

    pub fn is_literal(&self) -> bool {
        self.include.is_none()
    }

    pub fn ignore_empty_new_files(&self) -> bool {
        self.ignore_empty_new_files
    }

    pub fn accept_change_events(&self) -> bool {
        self.accept_change_events
    }

    /// The glob tail literally names a dotted component, e.g. `.cache/**`.
    pub fn names_hidden(&self) -> bool {
        glob_names_hidden(&self.glob)
    }

    /// Whether watching this matcher's base requires a recursive
    /// subscription. Name-level globs only observe direct children.
    pub fn needs_recursive_watch(&self) -> bool {
        self.is_globstar || self.glob.contains('/')
    }

    /// True if `abs` equals the base or satisfies the glob tail under it.
    pub fn matches(&self, abs: &Path) -> bool {
        if abs == self.base {
            return true;
        }

        let Some(include) = &self.include else {
            return false;
        };
        let Ok(rel) = abs.strip_prefix(&self.base) else {
            return false;
        };

        let rel_str = rel.to_string_lossy().replace('\\', "/");
        if !self.dot && has_hidden_component(&rel_str) && !glob_names_hidden(&self.glob) {
            return false;
        }
        if !include.is_match(&rel_str) {
            return false;
        }

        if let Some(exclude) = &self.exclude {
            if let Ok(cwd_rel) = abs.strip_prefix(&self.cwd) {
                let cwd_rel = cwd_rel.to_string_lossy().replace('\\', "/");
                if exclude.is_match(&cwd_rel) {
                    return false;
                }
            }
        }

        true
    }

    /// Identity used for de-duplicating re-registered matchers.
    fn key(&self) -> (&Path, &Path, &str, bool, bool, bool) {
        (
            &self.cwd,
            &self.base,
            &self.glob,
            self.dot,
            self.ignore_empty_new_files,
            self.accept_change_events,
        )
    }
}

/// Ordered collection of compiled matchers, most specific base first.
#[derive(Debug, Default)]
pub struct PatternRegistry {
    matchers: Vec<Matcher>,
}

impl PatternRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Strip leading `!` patterns into the negative list, compile each
    /// positive, and insert ordered by descending base depth. Returns
    /// `(base, needs_recursive_watch)` for each newly inserted matcher.
    pub fn add(
        &mut self,
        patterns: &[String],
        opts: &MatcherOptions,
    ) -> Result<Vec<(PathBuf, bool)>> {
        let mut negatives: Vec<String> = patterns
            .iter()
            .filter_map(|p| p.strip_prefix('!').map(str::to_string))
            .collect();
        negatives.extend(opts.ignore.iter().cloned());

        let mut bases = Vec::new();
        for pattern in patterns.iter().filter(|p| !p.starts_with('!')) {
            let matcher = Matcher::compile(pattern, &negatives, opts)?;
            if self.matchers.iter().any(|m| m.key() == matcher.key()) {
                continue;
            }
            debug!(pattern = %pattern, base = ?matcher.base(), "registered matcher");
            bases.push((matcher.base().to_path_buf(), matcher.needs_recursive_watch()));
            let at = self
                .matchers
                .iter()
                .position(|m| m.depth() < matcher.depth())
                .unwrap_or(self.matchers.len());
            self.matchers.insert(at, matcher);
        }
        Ok(bases)
    }

    /// True iff the path equals any matcher's base or satisfies any matcher's
    /// predicate.
    pub fn matches(&self, abs: &Path) -> bool {
        self.matchers.iter().any(|m| m.matches(abs))
    }

    /// Matchers whose predicate accepts `abs`, most specific first.
    pub fn matchers_for<'a>(&'a self, abs: &'a Path) -> impl Iterator<Item = &'a Matcher> {
        self.matchers.iter().filter(move |m| m.matches(abs))
    }

    pub fn bases(&self) -> impl Iterator<Item = &Path> {
        self.matchers.iter().map(|m| m.base())
    }

    pub fn matchers(&self) -> &[Matcher] {
        &self.matchers
    }

    pub fn clear(&mut self) {
        self.matchers.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.matchers.len()
    }
}

/// A name-only matcher for `list`/`find_up`: `**` and separators are not
/// special because candidates are single path components.
#[derive(Debug, Clone)]
pub struct NameMatcher {
    set: GlobSet,
    dot: bool,
    /// Some pattern literally names a dotted entry, e.g. `.git`.
    explicit_dot: bool,
}

impl NameMatcher {
    pub fn compile(patterns: &[String], dot: bool, case_insensitive: bool) -> Result<Self> {
        Ok(Self {
            set: build_globset(patterns, case_insensitive)?,
            dot,
            explicit_dot: patterns.iter().any(|p| p.starts_with('.')),
        })
    }

    pub fn matches(&self, name: &str) -> bool {
        if name.starts_with('.') && !self.dot && !self.explicit_dot {
            return false;
        }
        self.set.is_match(name)
    }
}

/// Build a `GlobSet` from string patterns. `*` and `?` never cross a
/// separator; `**` does.
fn build_globset(patterns: &[String], case_insensitive: bool) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .case_insensitive(case_insensitive)
            .build()?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

fn has_hidden_component(rel: &str) -> bool {
    rel.split('/').any(|seg| seg.starts_with('.'))
}

fn glob_names_hidden(glob: &str) -> bool {
    glob.split('/').any(|seg| seg.starts_with('.'))
}
