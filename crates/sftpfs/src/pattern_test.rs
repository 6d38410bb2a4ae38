// Copyright (c) Contributors to the sftpfs project.
// SPDX-License-Identifier: Apache-2.0

use std::time::{Duration, Instant};

use rstest::rstest;

use super::{is_match, Pattern};

#[rstest]
#[case("", "anything.bin", true)]
#[case("*", ".hidden", true)]
#[case("*.txt", "notes.txt", true)]
#[case("*.txt", "NOTES.TXT", true)]
#[case("*.TXT", "notes.txt", true)]
#[case("*.txt", "notes.txt.bak", false)]
#[case("*.txt", "notes.md", false)]
#[case("a?c", "abc", true)]
#[case("a?c", "ac", false)]
#[case("a?c", "abbc", false)]
#[case("report", "Report", true)]
#[case("report", "reports", false)]
#[case("*a*b*", "xxaYYbzz", true)]
#[case("*a*b*", "xxbYYa", false)]
fn test_standard_wildcards(#[case] pattern: &str, #[case] name: &str, #[case] expected: bool) {
    assert_eq!(is_match(pattern, name), expected, "{pattern} vs {name}");
}

#[rstest]
// `<` stops at the final dot
#[case("<.txt", "archive.tar.txt", true)]
#[case("<.tar", "archive.tar.txt", false)]
#[case("<", "noextension", true)]
// `>` tolerates a missing character before a dot or at the end
#[case("ab>>", "ab", true)]
#[case("ab>>", "abc", true)]
#[case("ab>>", "abcd", true)]
#[case("ab>>", "abcde", false)]
#[case("ab>.c", "ab.c", true)]
// `"` matches a dot, or nothing at the end
#[case("file\"*", "file.txt", true)]
#[case("file\"*", "file", true)]
#[case("file\"*", "filex", false)]
// the host sends `<"*` for a user typed `*.*`
#[case("<\"*", "readme", true)]
#[case("<\"*", "readme.md", true)]
fn test_dos_wildcards(#[case] pattern: &str, #[case] name: &str, #[case] expected: bool) {
    assert_eq!(is_match(pattern, name), expected, "{pattern} vs {name}");
}

#[rstest]
fn test_pattern_matches_all() {
    assert!(Pattern::new("").matches_all());
    assert!(Pattern::new("*").matches_all());
    assert!(!Pattern::new("*.txt").matches_all());
}

#[rstest]
fn test_non_ascii_case_folding() {
    assert!(is_match("ÄRGER.*", "ärger.doc"));
    assert!(!is_match("ÄRGER.*", "arger.doc"));
}

#[rstest]
#[case("*a*a*a*a*a*a*a*b", 40, false)]
#[case("*a*a*a*a*a*a*a*a", 40, true)]
#[case("<a<a<a<a<a<a<a<b", 40, false)]
#[case("*?*?*?*?*?*?*?*?>", 200, true)]
fn test_many_wildcards_on_long_names(
    #[case] pattern: &str,
    #[case] length: usize,
    #[case] expected: bool,
) {
    let name = "a".repeat(length);
    let start = Instant::now();
    assert_eq!(is_match(pattern, &name), expected, "{pattern} vs {name}");
    assert!(
        start.elapsed() < Duration::from_secs(1),
        "{pattern} took {:?}",
        start.elapsed()
    );
}
