//! Archive entry name validation.
//!
//! Entry names are relative paths. Before an entry is materialized on disk
//! its name must pass [`validate_name`]; the contract is that joining any
//! validated name onto an output root can never escape that root.
//!
//! Canonicalization is purely lexical: `.` segments and redundant separators
//! collapse, interior `..` segments cancel against the segment before them.
//! Both `/` and `\` are treated as separators so a name crafted on one
//! platform cannot smuggle a traversal past a validator on another.

/// Characters that are never allowed in an entry name.
const RESERVED: &[char] = &['<', '>', '?', ':', '*', '|'];

/// Lexically canonicalize a relative path.
///
/// Empty segments and `.` vanish; `..` cancels the preceding segment when one
/// exists, otherwise it is kept (so any surviving `..` sits at the front).
/// Segments are re-joined with `/`. The result is empty when nothing
/// survives, e.g. for `"."`, `"a/.."`, or `""`.
pub(crate) fn clean(path: &str) -> String {
    let mut stack: Vec<&str> = Vec::new();

    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                if matches!(stack.last(), None | Some(&"..")) {
                    stack.push("..");
                } else {
                    stack.pop();
                }
            }
            _ => stack.push(segment),
        }
    }

    stack.join("/")
}

/// Whether `path` is safe to materialize under an output root.
///
/// Rejects names containing any of `<>?:*|`, absolute names, names that are
/// empty after canonicalization, and names whose canonical form starts with a
/// `..` segment. Filenames may *contain* dots (`..txt`, `...`) — only the
/// exact traversal segment is refused.
pub fn validate_name(path: &str) -> bool {
    if path.contains(RESERVED) {
        return false;
    }

    // Absolute paths keep their leading separator through canonicalization;
    // checking the raw first byte covers both separator styles.
    if matches!(path.as_bytes().first(), Some(b'/') | Some(b'\\')) {
        return false;
    }

    let canonical = clean(path);
    if canonical.is_empty() {
        return false;
    }

    canonical != ".." && !canonical.starts_with("../")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn accepts_plain_names() {
        for path in [
            "0",
            "00",
            "aaa",
            "...",
            "FILE.TXT",
            ".txt",
            "..txt",
            ".../txt",
            "some/file.txt",
            "normal/path/going/../somewhere/groceries.txt",
            "absolute/../home.txt",
        ] {
            assert!(validate_name(path), "expected {path:?} to validate");
        }
    }

    #[test]
    fn rejects_traversal_and_absolute() {
        for path in [
            "..",
            "../",
            "../etc/passwd",
            "..\\etc\\passwd",
            "name/../../",
            "name/path/../something/../../x/../../",
            "/absolute/path",
            "\\absolute\\path",
            "/",
            "\\",
        ] {
            assert!(!validate_name(path), "expected {path:?} to be rejected");
        }
    }

    #[test]
    fn rejects_reserved_characters() {
        for path in ["a<b", "a>b", "a?b", "c:file", "a*b", "a|b"] {
            assert!(!validate_name(path));
        }
    }

    #[test]
    fn rejects_empty_canonical_forms() {
        for path in ["", ".", "./", "a/..", "a/b/../.."] {
            assert!(!validate_name(path));
        }
    }

    #[test]
    fn clean_collapses_segments() {
        assert_eq!(clean("a//b/./c"), "a/b/c");
        assert_eq!(clean("a\\b"), "a/b");
        assert_eq!(clean("a/../b"), "b");
        assert_eq!(clean("../a"), "../a");
        assert_eq!(clean("."), "");
    }

    proptest! {
        // Any name with a leading separator is absolute and must be refused.
        #[test]
        fn prefixed_separator_always_rejected(path in ".{0,64}") {
            let with_slash = format!("/{}", path);
            let with_backslash = format!("\\{}", path);
            prop_assert!(!validate_name(&with_slash));
            prop_assert!(!validate_name(&with_backslash));
        }

        // Joining a validated name onto a root never escapes it: the
        // canonical form is non-empty, relative, and free of `..` segments.
        #[test]
        fn validated_names_stay_under_root(path in ".{0,64}") {
            if validate_name(&path) {
                let canonical = clean(&path);
                prop_assert!(!canonical.is_empty());
                prop_assert!(!canonical.starts_with('/'));
                prop_assert!(canonical.split('/').all(|seg| seg != ".."));
            }
        }
    }
}
