//! Import-merge reconciliation.
//!
//! Applies an externally supplied match list against the current state in
//! one pass over the input, in input order, with no backtracking. Later
//! entries observe the effects of earlier ones, so two imported entries
//! can conflict with each other within a single call; that is accepted,
//! not corrected.

use crate::model::Match;
use crate::state::SessionState;

/// What to do when an imported match's reference is already matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Keep the existing match, count the entry as skipped.
    Skip,
    /// Free the existing match's path and install the imported one.
    Replace,
}

/// Per-entry conflict that prevented an import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeConflict {
    pub reference: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeReport {
    pub added: usize,
    pub skipped: usize,
    pub replaced: usize,
    pub errors: Vec<MergeConflict>,
}

const PATH_ALREADY_USED: &str = "Path already used";

/// Merge `imported` into `state` under `strategy`. Returns the next state
/// and a report of what happened to each entry.
pub fn merge(
    mut state: SessionState,
    imported: Vec<Match>,
    strategy: MergeStrategy,
) -> (SessionState, MergeReport) {
    let mut report = MergeReport::default();

    for incoming in imported {
        let existing = state
            .matches
            .iter()
            .position(|m| m.reference == incoming.reference);

        if let Some(index) = existing {
            match strategy {
                MergeStrategy::Skip => report.skipped += 1,
                MergeStrategy::Replace => {
                    let claimed_elsewhere = state
                        .matches
                        .iter()
                        .any(|m| m.path == incoming.path && m.reference != incoming.reference);
                    if claimed_elsewhere {
                        report.errors.push(MergeConflict {
                            reference: incoming.reference,
                            error: PATH_ALREADY_USED.to_string(),
                        });
                        continue;
                    }
                    let old_path = state.matches[index].path.clone();
                    state.used_paths.remove(&old_path);
                    state.used_paths.insert(incoming.path.clone());
                    state.matches[index] = incoming;
                    report.replaced += 1;
                }
            }
        } else if state.matches.iter().any(|m| m.path == incoming.path) {
            report.errors.push(MergeConflict {
                reference: incoming.reference,
                error: PATH_ALREADY_USED.to_string(),
            });
        } else {
            state.used_paths.insert(incoming.path.clone());
            if let Some(pos) = state
                .unmatched
                .iter()
                .position(|r| r.description == incoming.reference)
            {
                state.unmatched.remove(pos);
            }
            state.matches.push(incoming);
            report.added += 1;
        }
    }

    (state, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MatchMethod, Reference};
    use crate::state::ScoredCandidate;

    fn imported(reference: &str, path: &str) -> Match {
        Match {
            reference: reference.into(),
            path: path.into(),
            score: 0.9,
            method: MatchMethod::Imported,
            timestamp: "2026-08-05T00:00:00Z".into(),
            session_id: Some("import".into()),
            original_date: None,
            original_reference: None,
        }
    }

    fn session_with_match() -> SessionState {
        SessionState::new(vec![Reference::new("a"), Reference::new("b")]).confirm_match(
            &ScoredCandidate {
                path: "/p/a.pdf".into(),
                score: 0.85,
            },
        )
    }

    #[test]
    fn adds_unseen_entries() {
        let (state, report) = merge(
            session_with_match(),
            vec![imported("b", "/p/b.pdf")],
            MergeStrategy::Skip,
        );
        assert_eq!(report.added, 1);
        assert_eq!(state.matches.len(), 2);
        assert!(state.unmatched.is_empty());
        assert!(state.used_paths.contains("/p/b.pdf"));
    }

    #[test]
    fn skip_never_alters_existing_matches() {
        let before = session_with_match();
        let original_path = before.matches[0].path.clone();

        let (state, report) = merge(
            before,
            vec![imported("a", "/p/other.pdf")],
            MergeStrategy::Skip,
        );
        assert_eq!(report.skipped, 1);
        assert_eq!(report.added, 0);
        assert_eq!(state.matches[0].path, original_path);
        assert!(!state.used_paths.contains("/p/other.pdf"));
    }

    #[test]
    fn replace_frees_old_path() {
        let (state, report) = merge(
            session_with_match(),
            vec![imported("a", "/p/new.pdf")],
            MergeStrategy::Replace,
        );
        assert_eq!(report.replaced, 1);
        assert_eq!(state.matches[0].path, "/p/new.pdf");
        assert_eq!(state.matches[0].method, MatchMethod::Imported);
        assert!(!state.used_paths.contains("/p/a.pdf"));
        assert!(state.used_paths.contains("/p/new.pdf"));
    }

    #[test]
    fn path_claimed_by_different_reference_is_an_error() {
        let (state, report) = merge(
            session_with_match(),
            vec![imported("b", "/p/a.pdf")],
            MergeStrategy::Skip,
        );
        assert_eq!(report.added, 0);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].reference, "b");
        assert_eq!(report.errors[0].error, "Path already used");
        assert_eq!(state.matches.len(), 1);
        // the conflicting entry's reference stays unmatched
        assert!(state.unmatched.iter().any(|r| r.description == "b"));
    }

    #[test]
    fn replace_refuses_path_claimed_by_different_reference() {
        let with_two = merge(
            session_with_match(),
            vec![imported("b", "/p/b.pdf")],
            MergeStrategy::Skip,
        )
        .0;

        let (state, report) = merge(
            with_two,
            vec![imported("a", "/p/b.pdf")],
            MergeStrategy::Replace,
        );
        assert_eq!(report.replaced, 0);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(state.matches[0].path, "/p/a.pdf");
    }

    #[test]
    fn entries_within_one_call_see_earlier_effects() {
        let base = SessionState::new(vec![Reference::new("x"), Reference::new("y")]);
        let (state, report) = merge(
            base,
            vec![imported("x", "/p/shared.pdf"), imported("y", "/p/shared.pdf")],
            MergeStrategy::Skip,
        );
        assert_eq!(report.added, 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].reference, "y");
        assert_eq!(state.matches.len(), 1);
    }
}
