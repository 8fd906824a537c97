mod common;

use std::path::{Path, PathBuf};

use regen::path_utils::{normalize, relative_path, resolve, separator_depth, split_pattern};
use regen::patterns::{Matcher, MatcherOptions, NameMatcher, PatternRegistry};

#[test]
fn split_pattern_literal() {
    let parts = split_pattern("src/config.json");
    assert_eq!(parts.base, "src/config.json");
    assert_eq!(parts.glob, "");
    assert!(!parts.is_globstar);
}

#[test]
fn split_pattern_simple_glob() {
    let parts = split_pattern("*");
    assert_eq!(parts.base, "");
    assert_eq!(parts.glob, "*");
    assert!(!parts.is_globstar);
}

#[test]
fn split_pattern_with_base() {
    let parts = split_pattern("src/generated/**/*.rs");
    assert_eq!(parts.base, "src/generated");
    assert_eq!(parts.glob, "**/*.rs");
    assert!(parts.is_globstar);
}

#[test]
fn split_pattern_meta_mid_component() {
    let parts = split_pattern("src/mod-*.rs");
    assert_eq!(parts.base, "src");
    assert_eq!(parts.glob, "mod-*.rs");
}

#[test]
fn normalize_resolves_dots_and_trailing_separator() {
    assert_eq!(normalize(Path::new("/a/b/../c/./d/")), PathBuf::from("/a/c/d"));
    assert_eq!(normalize(Path::new("/a//b")), PathBuf::from("/a/b"));
}

#[test]
fn resolve_against_root() {
    let root = Path::new("/project");
    assert_eq!(resolve(root, "src/lib.rs"), PathBuf::from("/project/src/lib.rs"));
    assert_eq!(resolve(root, "/abs/file"), PathBuf::from("/abs/file"));
    assert_eq!(resolve(root, "../sibling"), PathBuf::from("/sibling"));
}

#[test]
fn relative_path_falls_back_to_absolute() {
    let root = Path::new("/project");
    assert_eq!(
        relative_path(root, Path::new("/project/a/b")),
        PathBuf::from("a/b")
    );
    assert_eq!(
        relative_path(root, Path::new("/elsewhere/x")),
        PathBuf::from("/elsewhere/x")
    );
}

#[test]
fn depth_counts_components() {
    assert_eq!(separator_depth(Path::new("/a/b/c")), 3);
    assert!(separator_depth(Path::new("/a/b/c")) > separator_depth(Path::new("/a")));
}

#[test]
fn matcher_star_stays_in_one_component() {
    let opts = MatcherOptions::new("/project");
    let m = Matcher::compile("*.txt", &[], &opts).unwrap();

    assert!(m.matches(Path::new("/project/a.txt")));
    assert!(!m.matches(Path::new("/project/sub/a.txt")));
    assert!(!m.matches(Path::new("/project/a.rs")));
}

#[test]
fn matcher_globstar_crosses_components() {
    let opts = MatcherOptions::new("/project");
    let m = Matcher::compile("src/**/*.rs", &[], &opts).unwrap();

    assert!(m.matches(Path::new("/project/src/lib.rs")));
    assert!(m.matches(Path::new("/project/src/a/b/mod.rs")));
    assert!(!m.matches(Path::new("/project/other/lib.rs")));
    assert!(m.is_globstar());
    assert_eq!(m.base(), Path::new("/project/src"));
}

#[test]
fn matcher_literal_matches_by_base_equality() {
    let opts = MatcherOptions::new("/project");
    let m = Matcher::compile("config.json", &[], &opts).unwrap();

    assert!(m.is_literal());
    assert!(m.matches(Path::new("/project/config.json")));
    assert!(!m.matches(Path::new("/project/other.json")));
}

#[test]
fn matcher_negatives_exclude() {
    let opts = MatcherOptions::new("/project");
    let m = Matcher::compile(
        "src/**/*.rs",
        &["src/vendor/**".to_string()],
        &opts,
    )
    .unwrap();

    assert!(m.matches(Path::new("/project/src/lib.rs")));
    assert!(!m.matches(Path::new("/project/src/vendor/dep.rs")));
}

#[test]
fn matcher_skips_dotfiles_unless_opted_in() {
    let opts = MatcherOptions::new("/project");
    let m = Matcher::compile("**/*", &[], &opts).unwrap();
    assert!(!m.matches(Path::new("/project/.hidden/file")));
    assert!(!m.matches(Path::new("/project/.env")));

    let dot_opts = MatcherOptions {
        dot: true,
        ..MatcherOptions::new("/project")
    };
    let m = Matcher::compile("**/*", &[], &dot_opts).unwrap();
    assert!(m.matches(Path::new("/project/.env")));
}

#[test]
fn matcher_explicit_hidden_glob_matches() {
    let opts = MatcherOptions::new("/project");
    let m = Matcher::compile(".cache/*", &[], &opts).unwrap();
    assert!(m.matches(Path::new("/project/.cache/entry")));
}

#[test]
fn name_globs_need_no_recursive_watch() {
    let opts = MatcherOptions::new("/project");
    assert!(!Matcher::compile("*", &[], &opts).unwrap().needs_recursive_watch());
    assert!(Matcher::compile("**/*.rs", &[], &opts)
        .unwrap()
        .needs_recursive_watch());
    assert!(Matcher::compile("a/*.rs", &[], &opts)
        .unwrap()
        .needs_recursive_watch());
}

#[test]
fn registry_orders_by_descending_depth() {
    let mut reg = PatternRegistry::new();
    reg.add(
        &["*.txt".to_string()],
        &MatcherOptions::new("/project"),
    )
    .unwrap();
    reg.add(
        &["*.txt".to_string()],
        &MatcherOptions::new("/project/a/b"),
    )
    .unwrap();
    reg.add(
        &["*.txt".to_string()],
        &MatcherOptions::new("/project/a"),
    )
    .unwrap();

    let depths: Vec<usize> = reg.matchers().iter().map(|m| m.depth()).collect();
    let mut sorted = depths.clone();
    sorted.sort_by(|a, b| b.cmp(a));
    assert_eq!(depths, sorted, "most specific matcher must come first");
}

#[test]
fn registry_deduplicates_reregistered_patterns() {
    let mut reg = PatternRegistry::new();
    let opts = MatcherOptions::new("/project");
    reg.add(&["src/**/*.rs".to_string()], &opts).unwrap();
    reg.add(&["src/**/*.rs".to_string()], &opts).unwrap();
    assert_eq!(reg.len(), 1);
}

#[test]
fn registry_splits_negations() {
    let mut reg = PatternRegistry::new();
    reg.add(
        &["**/*.rs".to_string(), "!target/**".to_string()],
        &MatcherOptions::new("/project"),
    )
    .unwrap();

    assert!(reg.matches(Path::new("/project/src/lib.rs")));
    assert!(!reg.matches(Path::new("/project/target/out.rs")));
}

#[test]
fn name_matcher_ignores_separators_and_dotfiles() {
    let m = NameMatcher::compile(&["*.json".to_string()], false, false).unwrap();
    assert!(m.matches("package.json"));
    assert!(!m.matches(".hidden.json"));

    let dotted = NameMatcher::compile(&[".git".to_string()], false, false).unwrap();
    assert!(dotted.matches(".git"));
}
