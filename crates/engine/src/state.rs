//! Selection state machine.
//!
//! One `SessionState` value owns the unmatched references, the confirmed
//! matches, the used-path set and both selection sets. Every operation is
//! a pure transition consuming the state and returning the next one;
//! structurally invalid input returns the state unchanged. Nothing here
//! panics and nothing returns an error; a bad call is a no-op.
//!
//! Two invariants hold after every transition: a path belongs to at most
//! one match (`used_paths` mirrors the matched paths), and a reference is
//! in `unmatched` exactly when no match names it.

use std::collections::BTreeSet;

use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::model::{Match, MatchMethod, Reference};

/// One selected item with its 1-based pairing order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub item: String,
    pub order: u32,
}

/// A candidate path with its similarity score, chosen out-of-band by the
/// caller (e.g. from a search result) for [`SessionState::confirm_match`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub path: String,
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionState {
    pub unmatched: Vec<Reference>,
    pub matches: Vec<Match>,
    pub used_paths: BTreeSet<String>,
    pub selected_references: Vec<Selection>,
    pub selected_paths: Vec<Selection>,
    pub current_reference: Option<String>,
}

impl SessionState {
    /// Start a session from an authored reference list. The first entry
    /// becomes the current reference.
    pub fn new(references: Vec<Reference>) -> Self {
        let current_reference = references.first().map(|r| r.description.clone());
        Self {
            unmatched: references,
            current_reference,
            ..Self::default()
        }
    }

    // -- selection ----------------------------------------------------------

    /// Focus a reference. Clears both selection sets.
    pub fn select_reference(mut self, description: &str) -> Self {
        self.current_reference = Some(description.to_string());
        self.selected_references.clear();
        self.selected_paths.clear();
        self
    }

    /// Add or remove a reference from the bulk selection. Removal leaves
    /// the other order numbers untouched; addition takes the lowest unused
    /// positive order.
    pub fn toggle_reference_selection(mut self, description: &str) -> Self {
        if let Some(pos) = self
            .selected_references
            .iter()
            .position(|s| s.item == description)
        {
            self.selected_references.remove(pos);
        } else {
            let order = lowest_unused_order(&self.selected_references);
            self.selected_references.push(Selection {
                item: description.to_string(),
                order,
            });
        }
        self
    }

    /// Add or remove a path from the bulk selection. Adding is refused
    /// once the path selection has reached the reference selection's size:
    /// 1:1 pairing capacity is enforced before commit.
    pub fn toggle_path_selection(mut self, path: &str) -> Self {
        if let Some(pos) = self.selected_paths.iter().position(|s| s.item == path) {
            self.selected_paths.remove(pos);
        } else {
            if self.selected_paths.len() >= self.selected_references.len() {
                return self;
            }
            let order = lowest_unused_order(&self.selected_paths);
            self.selected_paths.push(Selection {
                item: path.to_string(),
                order,
            });
        }
        self
    }

    /// Toggle between no references selected and all unmatched references
    /// selected, ordered by their position in the unmatched list.
    pub fn select_all_references(mut self) -> Self {
        if self.selected_references.is_empty() {
            self.selected_references = self
                .unmatched
                .iter()
                .enumerate()
                .map(|(i, r)| Selection {
                    item: r.description.clone(),
                    order: i as u32 + 1,
                })
                .collect();
        } else {
            self.selected_references.clear();
            self.selected_paths.clear();
        }
        self
    }

    // -- confirm / skip / remove --------------------------------------------

    /// Confirm the current reference against one chosen candidate path.
    /// No-op without a current unmatched reference or with an already
    /// consumed path.
    pub fn confirm_match(mut self, candidate: &ScoredCandidate) -> Self {
        let Some(current) = self.current_reference.clone() else {
            return self;
        };
        if self.used_paths.contains(&candidate.path) {
            return self;
        }
        let Some(pos) = self
            .unmatched
            .iter()
            .position(|r| r.description == current)
        else {
            return self;
        };

        let reference = self.unmatched.remove(pos);
        self.used_paths.insert(candidate.path.clone());
        self.matches.push(Match {
            reference: reference.description,
            path: candidate.path.clone(),
            score: candidate.score,
            method: MatchMethod::Manual,
            timestamp: Utc::now().to_rfc3339(),
            session_id: None,
            original_date: reference.date,
            original_reference: reference.external_code,
        });
        self.current_reference = self.unmatched.first().map(|r| r.description.clone());
        self
    }

    /// Pair the selected references with the selected paths by order rank.
    /// Both selections are sorted by their `order` field (not insertion
    /// sequence) before pairing; this ordering rule is the correctness
    /// contract for bulk matching. No-op unless both selections have equal
    /// size >= 2, every selected reference is unmatched, and every
    /// selected path is unused.
    pub fn confirm_bulk_match(mut self) -> Self {
        let n = self.selected_references.len();
        if n < 2 || self.selected_paths.len() != n {
            return self;
        }
        if self.selected_references.iter().any(|s| {
            !self
                .unmatched
                .iter()
                .any(|r| r.description == s.item)
        }) {
            return self;
        }
        if self
            .selected_paths
            .iter()
            .any(|s| self.used_paths.contains(&s.item))
        {
            return self;
        }

        let mut references = self.selected_references.clone();
        references.sort_by_key(|s| s.order);
        let mut paths = self.selected_paths.clone();
        paths.sort_by_key(|s| s.order);

        let timestamp = Utc::now().to_rfc3339();
        for (reference_sel, path_sel) in references.iter().zip(paths.iter()) {
            let Some(pos) = self
                .unmatched
                .iter()
                .position(|r| r.description == reference_sel.item)
            else {
                continue;
            };
            let reference = self.unmatched.remove(pos);
            self.used_paths.insert(path_sel.item.clone());
            self.matches.push(Match {
                reference: reference.description,
                path: path_sel.item.clone(),
                score: 1.0,
                method: MatchMethod::ManualBulk,
                timestamp: timestamp.clone(),
                session_id: None,
                original_date: reference.date,
                original_reference: reference.external_code,
            });
        }

        self.selected_references.clear();
        self.selected_paths.clear();
        self.current_reference = self.unmatched.first().map(|r| r.description.clone());
        self
    }

    /// Defer the current reference to the tail of the unmatched list and
    /// move on to the new head (round-robin deferral).
    pub fn skip_reference(mut self) -> Self {
        let Some(current) = self.current_reference.clone() else {
            return self;
        };
        let Some(pos) = self
            .unmatched
            .iter()
            .position(|r| r.description == current)
        else {
            return self;
        };
        let reference = self.unmatched.remove(pos);
        self.unmatched.push(reference);
        self.current_reference = self.unmatched.first().map(|r| r.description.clone());
        self
    }

    /// Defer every selected reference to the tail, preserving their
    /// relative order in the unmatched list. Clears the selections.
    pub fn bulk_skip_references(mut self) -> Self {
        if self.selected_references.is_empty() {
            return self;
        }
        let selected: BTreeSet<&str> = self
            .selected_references
            .iter()
            .map(|s| s.item.as_str())
            .collect();
        let (deferred, kept): (Vec<Reference>, Vec<Reference>) = self
            .unmatched
            .into_iter()
            .partition(|r| selected.contains(r.description.as_str()));
        self.unmatched = kept;
        self.unmatched.extend(deferred);
        self.selected_references.clear();
        self.selected_paths.clear();
        self.current_reference = self.unmatched.first().map(|r| r.description.clone());
        self
    }

    /// Remove a match, free its path and reinsert the reference at the
    /// head of the unmatched list.
    ///
    /// The reference is rebuilt from the fields persisted on the match
    /// (`reference`, `original_date`, `original_reference`); anything
    /// else, notably a `generated` flag it carried before matching, is
    /// lost. This lossy restore is accepted behavior.
    pub fn remove_match(mut self, reference: &str, path: &str) -> Self {
        let Some(pos) = self
            .matches
            .iter()
            .position(|m| m.reference == reference && m.path == path)
        else {
            return self;
        };
        let removed = self.matches.remove(pos);
        self.used_paths.remove(&removed.path);
        self.unmatched.insert(
            0,
            Reference {
                description: removed.reference,
                date: removed.original_date,
                external_code: removed.original_reference,
                generated: false,
            },
        );
        self
    }

    /// Install an externally produced candidate match (pattern suggestion
    /// or auto-high-confidence result) as-is, re-checking `used_paths` at
    /// commit time: detection and commitment are not atomic, so a path
    /// consumed since detection makes this a no-op.
    pub fn accept_candidate(mut self, candidate: Match) -> Self {
        if self.used_paths.contains(&candidate.path) {
            return self;
        }
        let Some(pos) = self
            .unmatched
            .iter()
            .position(|r| r.description == candidate.reference)
        else {
            return self;
        };
        self.unmatched.remove(pos);
        self.used_paths.insert(candidate.path.clone());
        self.matches.push(candidate);
        if self
            .current_reference
            .as_ref()
            .map(|c| !self.unmatched.iter().any(|r| &r.description == c))
            .unwrap_or(true)
        {
            self.current_reference = self.unmatched.first().map(|r| r.description.clone());
        }
        self
    }

    // -- generation / import ------------------------------------------------

    /// Derive references from corpus paths not yet consumed by a match.
    /// Idempotent: descriptions already present in the unmatched list are
    /// not appended again.
    pub fn detect_remaining_files(mut self, corpus_paths: &[String]) -> Self {
        for path in corpus_paths {
            if self.used_paths.contains(path) {
                continue;
            }
            let Some(candidate) = reference_from_path(path) else {
                continue;
            };
            if self
                .unmatched
                .iter()
                .any(|r| r.description == candidate.description)
            {
                continue;
            }
            self.unmatched.push(candidate);
        }
        self
    }

    /// Merge an imported snapshot: union the new references into the known
    /// set, append the mappings, union the used paths, then recompute the
    /// unmatched list as known-minus-matched. Clears all selections.
    pub fn import_mappings(
        mut self,
        mappings: Vec<Match>,
        new_references: Vec<Reference>,
        used_paths: Vec<String>,
    ) -> Self {
        let mut known = std::mem::take(&mut self.unmatched);
        for reference in new_references {
            if !known.iter().any(|k| k.description == reference.description) {
                known.push(reference);
            }
        }

        self.matches.extend(mappings);
        self.used_paths.extend(used_paths);
        for m in &self.matches {
            self.used_paths.insert(m.path.clone());
        }

        let matched: BTreeSet<&str> = self.matches.iter().map(|m| m.reference.as_str()).collect();
        self.unmatched = known
            .into_iter()
            .filter(|r| !matched.contains(r.description.as_str()))
            .collect();

        self.selected_references.clear();
        self.selected_paths.clear();
        let current_still_unmatched = self
            .current_reference
            .as_ref()
            .map(|c| self.unmatched.iter().any(|r| &r.description == c))
            .unwrap_or(false);
        if !current_still_unmatched {
            self.current_reference = self.unmatched.first().map(|r| r.description.clone());
        }
        self
    }
}

fn lowest_unused_order(selections: &[Selection]) -> u32 {
    let mut order = 1;
    while selections.iter().any(|s| s.order == order) {
        order += 1;
    }
    order
}

/// Build a reference description from a corpus path.
///
/// Filename stem, then ordered substitutions: strip appendix numbering,
/// strip a lettered-numeric document code (kept as the external code),
/// strip a trailing "dated <date>" phrase. Whitespace is collapsed. Paths
/// deeper than two segments contribute their parent folder as a prefix
/// unless the remaining text already mentions it.
fn reference_from_path(path: &str) -> Option<Reference> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let filename = segments.last()?;
    let stem = match filename.rfind('.') {
        Some(pos) if pos > 0 => &filename[..pos],
        _ => filename,
    };

    let appendix_re = Regex::new(r"(?i)^appendix\s*\d+\s*[-_.]*\s*").unwrap();
    let code_re = Regex::new(r"^([A-Za-z]{1,4}\d{0,3}-\d+[A-Za-z]?)\s*[-_.]*\s*").unwrap();
    let dated_re = Regex::new(r"(?i)[\s,_]*\bdated\b\s+.*$").unwrap();

    let mut text = stem.replace('_', " ");
    text = appendix_re.replace(&text, "").into_owned();
    let external_code = code_re
        .captures(&text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string());
    text = code_re.replace(&text, "").into_owned();
    text = dated_re.replace(&text, "").into_owned();
    let mut description = text.split_whitespace().collect::<Vec<_>>().join(" ");

    if description.is_empty() {
        description = stem.replace('_', " ");
    }

    if segments.len() > 2 {
        let parent = segments[segments.len() - 2];
        if !description.to_lowercase().contains(&parent.to_lowercase()) {
            description = format!("{parent} - {description}");
        }
    }

    Some(Reference {
        description,
        date: None,
        external_code,
        generated: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(description: &str) -> Reference {
        Reference::new(description)
    }

    fn session(descriptions: &[&str]) -> SessionState {
        SessionState::new(descriptions.iter().map(|d| reference(d)).collect())
    }

    fn assert_invariants(state: &SessionState) {
        let matched_paths: BTreeSet<&str> =
            state.matches.iter().map(|m| m.path.as_str()).collect();
        assert_eq!(
            matched_paths.len(),
            state.matches.len(),
            "a path appears in two matches"
        );
        for path in &matched_paths {
            assert!(state.used_paths.contains(*path), "matched path not in used set");
        }
        for m in &state.matches {
            assert!(
                !state.unmatched.iter().any(|r| r.description == m.reference),
                "matched reference still listed as unmatched"
            );
        }
    }

    #[test]
    fn new_session_focuses_first_reference() {
        let state = session(&["a", "b"]);
        assert_eq!(state.current_reference.as_deref(), Some("a"));
    }

    #[test]
    fn toggle_assigns_lowest_unused_order() {
        let state = session(&["a", "b", "c"])
            .toggle_reference_selection("a")
            .toggle_reference_selection("b")
            .toggle_reference_selection("c")
            .toggle_reference_selection("b"); // leaves orders 1 and 3
        let orders: Vec<u32> = state.selected_references.iter().map(|s| s.order).collect();
        assert_eq!(orders, vec![1, 3]);

        let state = state.toggle_reference_selection("b"); // refills order 2
        let b = state
            .selected_references
            .iter()
            .find(|s| s.item == "b")
            .unwrap();
        assert_eq!(b.order, 2);
    }

    #[test]
    fn path_selection_capped_by_reference_selection() {
        let state = session(&["a", "b", "c"])
            .toggle_reference_selection("a")
            .toggle_reference_selection("b")
            .toggle_path_selection("/p/1.pdf")
            .toggle_path_selection("/p/2.pdf")
            .toggle_path_selection("/p/3.pdf"); // capacity reached, refused
        assert_eq!(state.selected_paths.len(), 2);
        assert!(!state.selected_paths.iter().any(|s| s.item == "/p/3.pdf"));
    }

    #[test]
    fn select_all_toggles() {
        let state = session(&["a", "b", "c"]).select_all_references();
        assert_eq!(state.selected_references.len(), 3);
        let orders: Vec<u32> = state.selected_references.iter().map(|s| s.order).collect();
        assert_eq!(orders, vec![1, 2, 3]);

        let state = state.select_all_references();
        assert!(state.selected_references.is_empty());
    }

    #[test]
    fn confirm_match_advances_current() {
        let state = session(&["a", "b"]).confirm_match(&ScoredCandidate {
            path: "/p/a.pdf".into(),
            score: 0.91,
        });
        assert_eq!(state.matches.len(), 1);
        assert_eq!(state.matches[0].method, MatchMethod::Manual);
        assert_eq!(state.matches[0].score, 0.91);
        assert_eq!(state.current_reference.as_deref(), Some("b"));
        assert!(state.used_paths.contains("/p/a.pdf"));
        assert_invariants(&state);
    }

    #[test]
    fn confirm_match_refuses_used_path() {
        let state = session(&["a", "b"])
            .confirm_match(&ScoredCandidate { path: "/p/x.pdf".into(), score: 0.9 })
            .confirm_match(&ScoredCandidate { path: "/p/x.pdf".into(), score: 0.9 });
        assert_eq!(state.matches.len(), 1);
        assert_eq!(state.unmatched.len(), 1);
        assert_invariants(&state);
    }

    #[test]
    fn bulk_confirm_requires_equal_sizes_of_at_least_two() {
        let base = session(&["a", "b", "c"]);

        let one_each = base
            .clone()
            .toggle_reference_selection("a")
            .toggle_path_selection("/p/1.pdf")
            .confirm_bulk_match();
        assert!(one_each.matches.is_empty());

        let unequal = base
            .clone()
            .toggle_reference_selection("a")
            .toggle_reference_selection("b")
            .toggle_path_selection("/p/1.pdf")
            .confirm_bulk_match();
        assert!(unequal.matches.is_empty());
        assert_eq!(unequal.selected_references.len(), 2);
    }

    #[test]
    fn bulk_confirm_pairs_by_order_rank() {
        // Select references a, b (orders 1, 2) but paths in reverse
        // insertion sequence; pairing must follow order, not insertion.
        let mut state = session(&["a", "b"])
            .toggle_reference_selection("a")
            .toggle_reference_selection("b")
            .toggle_path_selection("/p/first.pdf")
            .toggle_path_selection("/p/second.pdf");
        // Rewire orders out of insertion sequence.
        state.selected_paths[0].order = 2;
        state.selected_paths[1].order = 1;

        let state = state.confirm_bulk_match();
        assert_eq!(state.matches.len(), 2);
        let a = state.matches.iter().find(|m| m.reference == "a").unwrap();
        let b = state.matches.iter().find(|m| m.reference == "b").unwrap();
        assert_eq!(a.path, "/p/second.pdf");
        assert_eq!(b.path, "/p/first.pdf");
        assert!(state.matches.iter().all(|m| m.method == MatchMethod::ManualBulk));
        assert!(state.matches.iter().all(|m| m.score == 1.0));
        assert!(state.selected_references.is_empty());
        assert!(state.selected_paths.is_empty());
        assert_invariants(&state);
    }

    #[test]
    fn skip_defers_to_tail() {
        let state = session(&["a", "b", "c"]).skip_reference();
        let order: Vec<&str> = state.unmatched.iter().map(|r| r.description.as_str()).collect();
        assert_eq!(order, vec!["b", "c", "a"]);
        assert_eq!(state.current_reference.as_deref(), Some("b"));
    }

    #[test]
    fn bulk_skip_preserves_relative_order() {
        let state = session(&["a", "b", "c", "d"])
            .toggle_reference_selection("c")
            .toggle_reference_selection("a")
            .bulk_skip_references();
        let order: Vec<&str> = state.unmatched.iter().map(|r| r.description.as_str()).collect();
        assert_eq!(order, vec!["b", "d", "a", "c"]);
        assert!(state.selected_references.is_empty());
    }

    #[test]
    fn remove_match_restores_reference_at_head() {
        let mut initial = session(&["a", "b"]);
        initial.unmatched[0].date = Some("2021-03-12".into());
        initial.unmatched[0].external_code = Some("C-0045".into());

        let matched = initial.confirm_match(&ScoredCandidate {
            path: "/p/a.pdf".into(),
            score: 0.88,
        });
        let state = matched.remove_match("a", "/p/a.pdf");

        assert!(state.matches.is_empty());
        assert!(!state.used_paths.contains("/p/a.pdf"));
        let restored = &state.unmatched[0];
        assert_eq!(restored.description, "a");
        assert_eq!(restored.date.as_deref(), Some("2021-03-12"));
        assert_eq!(restored.external_code.as_deref(), Some("C-0045"));
        assert!(!restored.generated);
        assert_invariants(&state);
    }

    #[test]
    fn remove_then_reconfirm_reproduces_pairing() {
        let candidate = ScoredCandidate { path: "/p/a.pdf".into(), score: 0.88 };
        let state = session(&["a", "b"])
            .confirm_match(&candidate)
            .remove_match("a", "/p/a.pdf")
            .select_reference("a")
            .confirm_match(&candidate);
        assert_eq!(state.matches.len(), 1);
        assert_eq!(state.matches[0].reference, "a");
        assert_eq!(state.matches[0].path, "/p/a.pdf");
        assert_invariants(&state);
    }

    #[test]
    fn accept_candidate_rechecks_used_paths() {
        let candidate = Match {
            reference: "b".into(),
            path: "/p/shared.pdf".into(),
            score: 0.95,
            method: MatchMethod::AutoHighConfidence,
            timestamp: Utc::now().to_rfc3339(),
            session_id: None,
            original_date: None,
            original_reference: None,
        };
        let state = session(&["a", "b"])
            .confirm_match(&ScoredCandidate { path: "/p/shared.pdf".into(), score: 0.9 })
            .accept_candidate(candidate);
        // Path was consumed between detection and commit: no-op.
        assert_eq!(state.matches.len(), 1);
        assert_eq!(state.matches[0].reference, "a");
        assert_invariants(&state);
    }

    #[test]
    fn detect_remaining_files_is_idempotent() {
        let corpus = vec![
            "/corpus/pleadings/C-0012 - Request for Arbitration.pdf".to_string(),
            "/corpus/exhibits/Appendix 2 - Damages model.pdf".to_string(),
        ];
        let state = session(&[]).detect_remaining_files(&corpus);
        assert_eq!(state.unmatched.len(), 2);

        let again = state.clone().detect_remaining_files(&corpus);
        assert_eq!(again.unmatched.len(), 2);
        assert_eq!(state, again);
    }

    #[test]
    fn detect_remaining_files_slug_rules() {
        let corpus = vec![
            "/corpus/pleadings/C-0012 - Request for Arbitration.pdf".to_string(),
            "/corpus/letters/Letter to Tribunal dated 12 March 2021.pdf".to_string(),
            "/corpus/Letter.pdf".to_string(),
        ];
        let state = session(&[]).detect_remaining_files(&corpus);

        let first = &state.unmatched[0];
        assert_eq!(first.description, "pleadings - Request for Arbitration");
        assert_eq!(first.external_code.as_deref(), Some("C-0012"));
        assert!(first.generated);

        let second = &state.unmatched[1];
        assert_eq!(second.description, "letters - Letter to Tribunal");

        // depth 2: no parent prefix
        let third = &state.unmatched[2];
        assert_eq!(third.description, "Letter");
    }

    #[test]
    fn detect_remaining_files_skips_used_paths() {
        let corpus = vec!["/corpus/a/Notice.pdf".to_string()];
        let state = session(&["x"])
            .confirm_match(&ScoredCandidate { path: "/corpus/a/Notice.pdf".into(), score: 0.8 })
            .detect_remaining_files(&corpus);
        assert!(state.unmatched.is_empty());
    }

    #[test]
    fn import_mappings_recomputes_unmatched() {
        let imported = Match {
            reference: "a".into(),
            path: "/p/a.pdf".into(),
            score: 0.9,
            method: MatchMethod::Imported,
            timestamp: Utc::now().to_rfc3339(),
            session_id: Some("s1".into()),
            original_date: None,
            original_reference: None,
        };
        let state = session(&["a", "b"]).import_mappings(
            vec![imported],
            vec![reference("c")],
            vec!["/p/a.pdf".to_string()],
        );

        let unmatched: Vec<&str> = state.unmatched.iter().map(|r| r.description.as_str()).collect();
        assert_eq!(unmatched, vec!["b", "c"]);
        assert!(state.used_paths.contains("/p/a.pdf"));
        assert_eq!(state.current_reference.as_deref(), Some("b"));
        assert_invariants(&state);
    }
}
