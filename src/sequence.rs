//! Residue sequence matching for the `sequence` selection.
//!
//! Patterns containing regex metacharacters go to the external regex
//! engine; anything else is a literal subsequence. Matches are resolved
//! per chain against the one-letter codes and every residue in a matched
//! span is selected.

use rustc_hash::FxHashSet;

use crate::context::ChainSequence;
use crate::error::SelectError;

fn is_regex_pattern(pattern: &str) -> bool {
    pattern
        .chars()
        .any(|c| matches!(c, '.' | '^' | '$' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '\\'))
}

/// Residue group ids covered by any match of `pattern` in any chain.
pub fn matching_residues(
    chains: &[ChainSequence],
    pattern: &str,
) -> Result<FxHashSet<usize>, SelectError> {
    let mut selected = FxHashSet::default();
    if is_regex_pattern(pattern) {
        let re = regex::Regex::new(pattern).map_err(|source| SelectError::Pattern {
            pattern: pattern.to_string(),
            source,
        })?;
        for chain in chains {
            for found in re.find_iter(&chain.codes) {
                selected.extend(&chain.residues[found.start()..found.end()]);
            }
        }
    } else {
        for chain in chains {
            for (start, matched) in chain.codes.match_indices(pattern) {
                selected.extend(&chain.residues[start..start + matched.len()]);
            }
        }
    }
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(id: &str, codes: &str, first_group: usize) -> ChainSequence {
        ChainSequence {
            chain: id.into(),
            codes: codes.into(),
            residues: (first_group..first_group + codes.len()).collect(),
        }
    }

    #[test]
    fn test_literal_match() {
        let chains = vec![chain("A", "MIEIKGG", 0)];
        let hit = matching_residues(&chains, "MIEIK").unwrap();
        assert_eq!(hit, FxHashSet::from_iter([0, 1, 2, 3, 4]));
    }

    #[test]
    fn test_literal_no_match() {
        let chains = vec![chain("A", "MIEIK", 0)];
        assert!(matching_residues(&chains, "WWW").unwrap().is_empty());
    }

    #[test]
    fn test_regex_match() {
        let chains = vec![chain("A", "MIEIKG", 0)];
        let hit = matching_residues(&chains, "I.I").unwrap();
        assert_eq!(hit, FxHashSet::from_iter([1, 2, 3]));
    }

    #[test]
    fn test_anchored_regex() {
        let chains = vec![chain("A", "GMG", 0), chain("B", "MGG", 10)];
        let hit = matching_residues(&chains, "^M").unwrap();
        assert_eq!(hit, FxHashSet::from_iter([10]));
    }

    #[test]
    fn test_matches_do_not_cross_chains() {
        let chains = vec![chain("A", "GM", 0), chain("B", "IE", 10)];
        assert!(matching_residues(&chains, "MI").unwrap().is_empty());
    }

    #[test]
    fn test_multiple_matches() {
        let chains = vec![chain("A", "GAGAG", 0)];
        let hit = matching_residues(&chains, "GA").unwrap();
        assert_eq!(hit, FxHashSet::from_iter([0, 1, 2, 3]));
    }

    #[test]
    fn test_bad_regex() {
        let chains = vec![chain("A", "MIEIK", 0)];
        assert!(matches!(
            matching_residues(&chains, "(unclosed"),
            Err(SelectError::Pattern { .. })
        ));
    }
}
