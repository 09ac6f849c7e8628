//! Line diffs between manuscript versions.

use serde::Serialize;

/// How a line differs between two texts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineChange {
    Added,
    Removed,
    Unchanged,
}

/// One line of a diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffLine {
    #[serde(rename = "type")]
    pub change: LineChange,
    pub content: String,
}

/// Diffs two texts line by line.
///
/// The result is a shortest edit script: the `unchanged` and `removed` lines
/// read in order give `old`, the `unchanged` and `added` lines give `new`.
#[must_use]
pub fn diff_lines(old: &str, new: &str) -> Vec<DiffLine> {
    let a: Vec<&str> = old.lines().collect();
    let b: Vec<&str> = new.lines().collect();

    let prefix = a.iter().zip(&b).take_while(|(x, y)| x == y).count();
    let suffix = a[prefix..]
        .iter()
        .rev()
        .zip(b[prefix..].iter().rev())
        .take_while(|(x, y)| x == y)
        .count();

    let mut lines = Vec::with_capacity(a.len().max(b.len()));
    lines.extend(a[..prefix].iter().map(|l| line(LineChange::Unchanged, l)));
    lines.extend(edit_script(
        &a[prefix..a.len() - suffix],
        &b[prefix..b.len() - suffix],
    ));
    lines.extend(
        a[a.len() - suffix..]
            .iter()
            .map(|l| line(LineChange::Unchanged, l)),
    );
    lines
}

fn line(change: LineChange, content: &str) -> DiffLine {
    DiffLine {
        change,
        content: content.to_string(),
    }
}

/// Myers' greedy diff with a full trace for backtracking.
///
/// Coordinates are signed: diagonals `k = x - y` run from `-d` to `d`.
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
fn edit_script(a: &[&str], b: &[&str]) -> Vec<DiffLine> {
    let (n, m) = (a.len() as isize, b.len() as isize);
    let max = n + m;
    let offset = max + 1;
    let at = |k: isize| (k + offset) as usize;

    // Furthest x reached on each diagonal, snapshotted before each round.
    let mut v = vec![0_isize; at(max + 1) + 1];
    let mut trace = Vec::new();
    'search: for d in 0..=max {
        trace.push(v.clone());
        for k in (-d..=d).step_by(2) {
            let mut x = if k == -d || (k != d && v[at(k - 1)] < v[at(k + 1)]) {
                v[at(k + 1)]
            } else {
                v[at(k - 1)] + 1
            };
            let mut y = x - k;
            while x < n && y < m && a[x as usize] == b[y as usize] {
                x += 1;
                y += 1;
            }
            v[at(k)] = x;
            if x >= n && y >= m {
                break 'search;
            }
        }
    }

    let (mut x, mut y) = (n, m);
    let mut script = Vec::new();
    for (d, v) in trace.iter().enumerate().rev() {
        let d = d as isize;
        let k = x - y;
        let prev_k = if k == -d || (k != d && v[at(k - 1)] < v[at(k + 1)]) {
            k + 1
        } else {
            k - 1
        };
        let prev_x = v[at(prev_k)];
        let prev_y = prev_x - prev_k;

        while x > prev_x && y > prev_y {
            script.push(line(LineChange::Unchanged, a[(x - 1) as usize]));
            x -= 1;
            y -= 1;
        }
        if d > 0 {
            if x == prev_x {
                script.push(line(LineChange::Added, b[prev_y as usize]));
            } else {
                script.push(line(LineChange::Removed, a[prev_x as usize]));
            }
        }
        x = prev_x;
        y = prev_y;
    }
    script.reverse();
    script
}

#[cfg(test)]
mod tests {
    use super::*;

    fn changes(old: &str, new: &str) -> Vec<(LineChange, String)> {
        diff_lines(old, new)
            .into_iter()
            .map(|l| (l.change, l.content))
            .collect()
    }

    fn side(lines: &[DiffLine], skip: LineChange) -> Vec<&str> {
        lines
            .iter()
            .filter(|l| l.change != skip)
            .map(|l| l.content.as_str())
            .collect()
    }

    #[test]
    fn identical_texts_are_all_unchanged() {
        let diff = diff_lines("one\ntwo\n", "one\ntwo\n");
        assert_eq!(diff.len(), 2);
        assert!(diff.iter().all(|l| l.change == LineChange::Unchanged));
        assert!(diff_lines("", "").is_empty());
    }

    #[test]
    fn replaced_line_is_removed_then_added() {
        use LineChange::{Added, Removed, Unchanged};
        assert_eq!(
            changes("a\nb\nc", "a\nx\nc"),
            vec![
                (Unchanged, "a".into()),
                (Removed, "b".into()),
                (Added, "x".into()),
                (Unchanged, "c".into()),
            ]
        );
    }

    #[test]
    fn insertions_and_deletions_at_the_edges() {
        use LineChange::{Added, Removed, Unchanged};
        assert_eq!(
            changes("a\nb\nc\nd", "b\nc\nd\ne"),
            vec![
                (Removed, "a".into()),
                (Unchanged, "b".into()),
                (Unchanged, "c".into()),
                (Unchanged, "d".into()),
                (Added, "e".into()),
            ]
        );
        assert_eq!(
            changes("", "x\ny"),
            vec![(Added, "x".into()), (Added, "y".into())]
        );
        assert_eq!(
            changes("x\ny", ""),
            vec![(Removed, "x".into()), (Removed, "y".into())]
        );
    }

    #[test]
    fn both_sides_can_be_rebuilt_from_the_diff() {
        let old = "It was late.\nThe harbor slept.\nMara waited.\nRain.\nThe end.";
        let new = "It was late.\nMara waited, soaked.\nRain.\nThunder.\nThe end.";

        let diff = diff_lines(old, new);

        assert_eq!(side(&diff, LineChange::Added), old.lines().collect::<Vec<_>>());
        assert_eq!(side(&diff, LineChange::Removed), new.lines().collect::<Vec<_>>());
        let edits = diff
            .iter()
            .filter(|l| l.change != LineChange::Unchanged)
            .count();
        assert_eq!(edits, 4);
    }

    #[test]
    fn serializes_with_type_field() {
        let json = serde_json::to_value(&diff_lines("a", "b")[0]).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "removed", "content": "a" }));
    }
}
