//! Line-based three-way merge
//!
//! The merge walks the base alongside both versions and splits them into
//! stable regions (lines all three share) and unstable chunks. An unstable
//! chunk changed on one side only takes that side; a chunk changed
//! identically on both sides is taken once; anything else is a conflict
//! and is emitted between markers.
//!
//! Markers are wrapped in backticks so that markdown renders them as
//! literal text and no tool mistakes them for a pending merge.
//!
//! When there is no common ancestor, the longest common subsequence of the
//! two versions serves as the base.

use vaultsync_core::domain::Entity;

/// Largest file (in bytes) eligible for content merge
pub const MAX_MERGE_SIZE: u64 = 1024 * 1024;

/// Above this many DP cells, only the common prefix and suffix are matched
const MAX_LCS_CELLS: usize = 4_000_000;

const MARKER_LOCAL: &str = "`<<<<<<< local`";
const MARKER_SEPARATOR: &str = "`=======`";
const MARKER_REMOTE: &str = "`>>>>>>> remote`";

/// Result of a merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub text: String,
    /// Number of conflicting chunks emitted between markers
    pub conflicts: usize,
}

impl MergeOutcome {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.conflicts == 0
    }
}

/// Markdown file, not a folder, within the merge size ceiling
#[must_use]
pub fn is_mergeable(entity: &Entity) -> bool {
    !entity.is_folder()
        && entity.key.to_ascii_lowercase().ends_with(".md")
        && entity.size <= MAX_MERGE_SIZE
}

/// Merge two versions that share no recorded ancestor
pub fn merge_two_way(local: &str, remote: &str) -> MergeOutcome {
    let a = lines(local);
    let b = lines(remote);
    let base: String = lcs_pairs(&a, &b).into_iter().map(|(i, _)| a[i]).collect();
    merge_three_way(&base, local, remote)
}

/// Merge two versions against their common ancestor
pub fn merge_three_way(base: &str, local: &str, remote: &str) -> MergeOutcome {
    let o = lines(base);
    let a = lines(local);
    let b = lines(remote);

    let ma = match_map(&o, &a);
    let mb = match_map(&o, &b);

    // Base lines matched on both sides, in order
    let aligned: Vec<(usize, usize, usize)> = (0..o.len())
        .filter_map(|x| match (ma[x], mb[x]) {
            (Some(ja), Some(kb)) => Some((x, ja, kb)),
            _ => None,
        })
        .collect();

    let mut out = String::with_capacity(local.len().max(remote.len()));
    let mut conflicts = 0;
    let (mut i, mut j, mut k) = (0, 0, 0);
    let mut next = 0;

    while i < o.len() || j < a.len() || k < b.len() {
        while next < aligned.len() && aligned[next].0 < i {
            next += 1;
        }
        let (ni, nj, nk) = aligned
            .get(next)
            .copied()
            .unwrap_or((o.len(), a.len(), b.len()));

        if (ni, nj, nk) == (i, j, k) {
            out.push_str(o[i]);
            i += 1;
            j += 1;
            k += 1;
            continue;
        }

        let oc = &o[i..ni];
        let ac = &a[j..nj];
        let bc = &b[k..nk];

        if ac == oc || ac == bc {
            push_lines(&mut out, bc);
        } else if bc == oc {
            push_lines(&mut out, ac);
        } else {
            conflicts += 1;
            push_marker(&mut out, MARKER_LOCAL);
            push_lines(&mut out, ac);
            push_marker(&mut out, MARKER_SEPARATOR);
            push_lines(&mut out, bc);
            push_marker(&mut out, MARKER_REMOTE);
        }

        i = ni;
        j = nj;
        k = nk;
    }

    MergeOutcome {
        text: out,
        conflicts,
    }
}

fn lines(text: &str) -> Vec<&str> {
    text.split_inclusive('\n').collect()
}

fn push_lines(out: &mut String, chunk: &[&str]) {
    for line in chunk {
        out.push_str(line);
    }
}

fn push_marker(out: &mut String, marker: &str) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(marker);
    out.push('\n');
}

/// For each line of `base`, the index of its partner in `other`
fn match_map(base: &[&str], other: &[&str]) -> Vec<Option<usize>> {
    let mut map = vec![None; base.len()];
    for (i, j) in lcs_pairs(base, other) {
        map[i] = Some(j);
    }
    map
}

/// Index pairs of a longest common subsequence of two line lists
fn lcs_pairs(a: &[&str], b: &[&str]) -> Vec<(usize, usize)> {
    let mut prefix = 0;
    while prefix < a.len() && prefix < b.len() && a[prefix] == b[prefix] {
        prefix += 1;
    }
    let mut suffix = 0;
    while suffix < a.len() - prefix
        && suffix < b.len() - prefix
        && a[a.len() - 1 - suffix] == b[b.len() - 1 - suffix]
    {
        suffix += 1;
    }

    let mut pairs: Vec<(usize, usize)> = (0..prefix).map(|i| (i, i)).collect();

    let am = &a[prefix..a.len() - suffix];
    let bm = &b[prefix..b.len() - suffix];
    let (n, m) = (am.len(), bm.len());
    if n > 0 && m > 0 && n.saturating_mul(m) <= MAX_LCS_CELLS {
        let w = m + 1;
        let mut dp = vec![0u32; (n + 1) * w];
        for x in (0..n).rev() {
            for y in (0..m).rev() {
                dp[x * w + y] = if am[x] == bm[y] {
                    dp[(x + 1) * w + y + 1] + 1
                } else {
                    dp[(x + 1) * w + y].max(dp[x * w + y + 1])
                };
            }
        }

        let (mut x, mut y) = (0, 0);
        while x < n && y < m {
            if am[x] == bm[y] {
                pairs.push((prefix + x, prefix + y));
                x += 1;
                y += 1;
            } else if dp[(x + 1) * w + y] >= dp[x * w + y + 1] {
                x += 1;
            } else {
                y += 1;
            }
        }
    }

    let a_tail = a.len() - suffix;
    let b_tail = b.len() - suffix;
    pairs.extend((0..suffix).map(|s| (a_tail + s, b_tail + s)));
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_raw_marker(text: &str) -> bool {
        text.lines().any(|l| {
            l.starts_with("<<<<<<<") || l.starts_with("=======") || l.starts_with(">>>>>>>")
        })
    }

    #[test]
    fn test_identical_inputs() {
        let base = "a\nb\nc\n";
        let out = merge_three_way(base, base, base);
        assert_eq!(out.text, base);
        assert!(out.is_clean());
    }

    #[test]
    fn test_one_sided_change_wins() {
        let base = "a\nb\nc\n";
        let out = merge_three_way(base, "a\nB\nc\n", base);
        assert_eq!(out.text, "a\nB\nc\n");

        let out = merge_three_way(base, base, "a\nb\nc\nd\n");
        assert_eq!(out.text, "a\nb\nc\nd\n");
    }

    #[test]
    fn test_disjoint_changes_both_survive() {
        let base = "title\n\none\ntwo\nthree\n";
        let local = "TITLE\n\none\ntwo\nthree\n";
        let remote = "title\n\none\ntwo\nthree\nfour\n";
        let out = merge_three_way(base, local, remote);
        assert_eq!(out.text, "TITLE\n\none\ntwo\nthree\nfour\n");
        assert!(out.is_clean());
    }

    #[test]
    fn test_same_change_on_both_sides() {
        let base = "a\nb\n";
        let out = merge_three_way(base, "a\nX\n", "a\nX\n");
        assert_eq!(out.text, "a\nX\n");
        assert!(out.is_clean());
    }

    #[test]
    fn test_overlapping_change_is_defused_conflict() {
        let base = "a\nb\nc\n";
        let out = merge_three_way(base, "a\nlocal\nc\n", "a\nremote\nc\n");
        assert_eq!(out.conflicts, 1);
        assert!(out.text.contains("local\n"));
        assert!(out.text.contains("remote\n"));
        assert!(out.text.contains(MARKER_LOCAL));
        assert!(!has_raw_marker(&out.text));
        assert!(out.text.starts_with("a\n"));
        assert!(out.text.ends_with("c\n"));
    }

    #[test]
    fn test_two_way_keeps_insertions_from_both() {
        let out = merge_two_way("x\na\n", "a\ny\n");
        assert_eq!(out.text, "x\na\ny\n");
        assert!(out.is_clean());
    }

    #[test]
    fn test_two_way_divergent_lines_conflict() {
        let out = merge_two_way("same\nmine\n", "same\ntheirs\n");
        assert_eq!(out.conflicts, 1);
        assert!(out.text.starts_with("same\n"));
        assert!(out.text.contains("mine\n") && out.text.contains("theirs\n"));
        assert!(!has_raw_marker(&out.text));
    }

    #[test]
    fn test_missing_trailing_newline_before_marker() {
        let out = merge_two_way("head\nmine", "head\ntheirs");
        assert_eq!(out.conflicts, 1);
        assert!(out.text.contains("mine\n`=======`\n"));
        assert!(out.text.ends_with("`>>>>>>> remote`\n"));
    }

    #[test]
    fn test_empty_inputs() {
        assert_eq!(merge_two_way("", "").text, "");
        assert_eq!(merge_two_way("", "only remote\n").text, "only remote\n");
    }

    #[test]
    fn test_lcs_pairs() {
        let a = ["a\n", "b\n", "c\n", "d\n"];
        let b = ["b\n", "x\n", "d\n"];
        assert_eq!(lcs_pairs(&a, &b), vec![(1, 0), (3, 2)]);
    }

    #[test]
    fn test_is_mergeable() {
        assert!(is_mergeable(&Entity::file("notes/a.md", 1, 10)));
        assert!(is_mergeable(&Entity::file("A.MD", 1, 10)));
        assert!(!is_mergeable(&Entity::file("img.png", 1, 10)));
        assert!(!is_mergeable(&Entity::file("big.md", 1, MAX_MERGE_SIZE + 1)));
        assert!(!is_mergeable(&Entity::folder("dir.md/")));
    }
}
