//! Levenshtein alignment over token sequences.
//!
//! One dynamic program (unit-cost insert/delete/substitute) produces the
//! match/substitution/deletion/insertion counts that every accuracy
//! metric is derived from. The backtrace uses a fixed preference order,
//! diagonal before deletion before insertion, so equal-cost alignments
//! resolve the same way on every run and every platform.

/// Operation counts derived from one alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignmentCounts {
    pub matches: usize,
    pub substitutions: usize,
    pub deletions: usize,
    pub insertions: usize,
}

impl AlignmentCounts {
    /// Reference token count: every reference token is matched,
    /// substituted, or deleted.
    pub fn reference_len(&self) -> usize {
        self.matches + self.substitutions + self.deletions
    }

    /// Hypothesis token count: every hypothesis token is matched,
    /// substituted, or inserted.
    pub fn hypothesis_len(&self) -> usize {
        self.matches + self.substitutions + self.insertions
    }

    /// Total edit operations (the error numerator).
    pub fn edits(&self) -> usize {
        self.substitutions + self.deletions + self.insertions
    }
}

/// Align `hypothesis` against `reference` and count edit operations.
pub fn align<T: PartialEq>(reference: &[T], hypothesis: &[T]) -> AlignmentCounts {
    let n = reference.len();
    let m = hypothesis.len();

    // dist[i][j] = edit distance between reference[..i] and hypothesis[..j]
    let mut dist = vec![vec![0usize; m + 1]; n + 1];
    for (i, row) in dist.iter_mut().enumerate() {
        row[0] = i;
    }
    for j in 0..=m {
        dist[0][j] = j;
    }

    for i in 1..=n {
        for j in 1..=m {
            let sub_cost = usize::from(reference[i - 1] != hypothesis[j - 1]);
            let diagonal = dist[i - 1][j - 1] + sub_cost;
            let deletion = dist[i - 1][j] + 1;
            let insertion = dist[i][j - 1] + 1;
            dist[i][j] = diagonal.min(deletion).min(insertion);
        }
    }

    // Backtrace with the fixed tie-break: substitution/match over
    // deletion, deletion over insertion.
    let mut counts = AlignmentCounts {
        matches: 0,
        substitutions: 0,
        deletions: 0,
        insertions: 0,
    };
    let (mut i, mut j) = (n, m);
    while i > 0 || j > 0 {
        if i > 0 && j > 0 {
            let sub_cost = usize::from(reference[i - 1] != hypothesis[j - 1]);
            if dist[i][j] == dist[i - 1][j - 1] + sub_cost {
                if sub_cost == 0 {
                    counts.matches += 1;
                } else {
                    counts.substitutions += 1;
                }
                i -= 1;
                j -= 1;
                continue;
            }
        }
        if i > 0 && dist[i][j] == dist[i - 1][j] + 1 {
            counts.deletions += 1;
            i -= 1;
        } else {
            counts.insertions += 1;
            j -= 1;
        }
    }

    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(s: &str) -> Vec<&str> {
        s.split_whitespace().collect()
    }

    #[test]
    fn identical_sequences_are_all_matches() {
        let tokens = words("the quick brown fox");
        let counts = align(&tokens, &tokens);
        assert_eq!(counts.matches, 4);
        assert_eq!(counts.edits(), 0);
    }

    #[test]
    fn single_insertion_is_counted() {
        let counts = align(&words("the quick fox"), &words("the quick brown fox"));
        assert_eq!(counts.matches, 3);
        assert_eq!(counts.insertions, 1);
        assert_eq!(counts.substitutions, 0);
        assert_eq!(counts.deletions, 0);
    }

    #[test]
    fn empty_hypothesis_is_all_deletions() {
        let counts = align(&words("a b c"), &words(""));
        assert_eq!(counts.deletions, 3);
        assert_eq!(counts.hypothesis_len(), 0);
    }

    #[test]
    fn empty_reference_is_all_insertions() {
        let counts = align(&words(""), &words("a b"));
        assert_eq!(counts.insertions, 2);
        assert_eq!(counts.reference_len(), 0);
    }

    /// When delete+insert and substitute cost the same, the backtrace
    /// must pick substitution so counts are reproducible.
    #[test]
    fn ties_prefer_substitution() {
        let counts = align(&words("a x b"), &words("a y b"));
        assert_eq!(counts.substitutions, 1);
        assert_eq!(counts.deletions, 0);
        assert_eq!(counts.insertions, 0);
    }

    #[test]
    fn length_identities_hold() {
        let reference = words("one two three four five");
        let hypothesis = words("one too three five six");
        let counts = align(&reference, &hypothesis);
        assert_eq!(counts.reference_len(), reference.len());
        assert_eq!(counts.hypothesis_len(), hypothesis.len());
    }
}
