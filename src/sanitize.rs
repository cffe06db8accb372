#![forbid(unsafe_code)]

//! Filesystem-safe names for playlist folders and video files.

/// Characters rejected by at least one common filesystem.
const ILLEGAL: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Removes characters that are illegal in file names, collapses whitespace
/// runs into a single space and trims both ends.
///
/// The result is never truncated; overly long names surface as I/O errors when
/// the file is written.
pub fn sanitize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;

    for ch in text.chars().filter(|ch| !ILLEGAL.contains(ch)) {
        if ch.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLES: &[&str] = &[
        "",
        "   ",
        "plain",
        "  Lesson 1: Intro / Setup?  ",
        "a\t\tb\n\nc",
        "\"quoted\" <tag> |pipe| *star*",
        "space :  colon",
        "trailing\\",
        "  ü nicode   ✓ ",
    ];

    #[test]
    fn strips_illegal_characters() {
        assert_eq!(sanitize("Lesson 1: Intro / Setup?"), "Lesson 1 Intro Setup");
        assert_eq!(sanitize(r#"a\b/c:d*e?f"g<h>i|j"#), "abcdefghij");
    }

    #[test]
    fn collapses_and_trims_whitespace() {
        assert_eq!(sanitize("  a \t b\n\nc  "), "a b c");
        assert_eq!(sanitize("   "), "");
    }

    #[test]
    fn removal_does_not_leave_double_spaces() {
        assert_eq!(sanitize("space :  colon"), "space colon");
        assert_eq!(sanitize("x | y"), "x y");
    }

    #[test]
    fn never_truncates() {
        let long = "x".repeat(600);
        assert_eq!(sanitize(&long).len(), 600);
    }

    #[test]
    fn is_idempotent_and_clean() {
        for sample in SAMPLES {
            let once = sanitize(sample);
            assert_eq!(sanitize(&once), once, "not idempotent for {sample:?}");
            assert!(!once.contains(ILLEGAL), "illegal char left in {once:?}");
            assert_eq!(once.trim(), once);
            assert!(!once.contains("  "));
        }
    }
}
