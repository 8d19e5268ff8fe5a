//! Image path extraction from free-text intentions.

use std::sync::OnceLock;

use regex::Regex;

const EXTENSIONS: &str = "jpg|jpeg|png|bmp|gif|tiff|webp";

struct PathPattern {
    regex: Regex,
    /// Match must begin a rooted Unix path rather than continue another token.
    rooted: bool,
}

/// Patterns tried in order: quoted, absolute Unix, drive letter, relative.
fn path_patterns() -> &'static [PathPattern] {
    static PATTERNS: OnceLock<Vec<PathPattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (format!(r#"(?i)["']([^"']*\.(?:{EXTENSIONS}))["']"#), false),
            (format!(r"(?i)(/[^\s]*\.(?:{EXTENSIONS}))"), true),
            (format!(r"(?i)([A-Za-z]:[^\s]*\.(?:{EXTENSIONS}))"), false),
            (format!(r"(?i)(?:^|[^A-Za-z0-9_./])(\.{{1,2}}/[^\s]*\.(?:{EXTENSIONS}))"), false),
        ]
        .into_iter()
        .filter_map(|(pattern, rooted)| match Regex::new(&pattern) {
            Ok(regex) => Some(PathPattern { regex, rooted }),
            Err(e) => {
                tracing::error!("Invalid image path pattern {pattern}: {e}");
                None
            }
        })
        .collect()
    })
}

/// Whether a `/` at byte `start` opens an absolute path. Slashes inside words,
/// relative paths and drive prefixes such as `C:` do not.
fn opens_rooted_path(text: &str, start: usize) -> bool {
    let mut before = text[..start].chars().rev();
    match before.next() {
        None => true,
        Some(':') => !is_drive_letter(before),
        Some(c) => !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '~' | '/')),
    }
}

/// A single ASCII letter not preceded by another letter or digit.
fn is_drive_letter(mut before: impl Iterator<Item = char>) -> bool {
    matches!(before.next(), Some(c) if c.is_ascii_alphabetic())
        && !matches!(before.next(), Some(c) if c.is_ascii_alphanumeric())
}

/// Find the first image path mentioned in `intention`.
pub fn extract_image_path(intention: &str) -> Option<String> {
    path_patterns().iter().find_map(|pattern| {
        pattern
            .regex
            .captures_iter(intention)
            .filter_map(|caps| caps.get(1))
            .find(|m| !pattern.rooted || opens_rooted_path(intention, m.start()))
            .map(|m| m.as_str().to_string())
    })
}
