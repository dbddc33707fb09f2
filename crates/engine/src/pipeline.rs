//! Batched auto-matching.
//!
//! References are scored against the unconsumed corpus in fixed-size
//! batches, strictly one batch at a time, through a [`ScoreBackend`]
//! chosen at construction. Results are candidates: the caller presents
//! them for review and commits accepted ones through the state machine,
//! which re-checks the used-path set (detection and commitment are not
//! atomic).

use std::collections::BTreeSet;
use std::sync::mpsc;
use std::thread;

use chrono::Utc;

use crate::model::{Match, MatchMethod, Reference};
use crate::scorer;

pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Best corpus path found for one reference.
#[derive(Debug, Clone, PartialEq)]
pub struct BestPath {
    pub path: String,
    pub score: f64,
}

/// A reference whose best match cleared the threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchHit {
    pub reference: String,
    pub best: BestPath,
}

/// Progress event emitted after each batch. `processed` and `found` are
/// monotonically non-decreasing within one pipeline call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub processed: usize,
    pub total: usize,
    pub found: usize,
}

/// Scoring strategy. Implementations own a copy of the candidate paths;
/// nothing is shared mutably with the orchestrator.
pub trait ScoreBackend {
    fn score_batch(&self, batch: &[Reference], threshold: f64) -> Vec<BatchHit>;
}

/// Best scorer match per reference over the given paths, kept only at or
/// above the threshold. Shared by both backends so they are
/// interchangeable by construction.
fn score_against(references: &[Reference], paths: &[String], threshold: f64) -> Vec<BatchHit> {
    references
        .iter()
        .filter_map(|reference| {
            let mut best: Option<(usize, f64)> = None;
            for (i, path) in paths.iter().enumerate() {
                let s = scorer::score(&reference.description, path, false);
                if best.map_or(true, |(_, bs)| s > bs) {
                    best = Some((i, s));
                }
            }
            let (i, s) = best?;
            if s < threshold {
                return None;
            }
            Some(BatchHit {
                reference: reference.description.clone(),
                best: BestPath {
                    path: paths[i].clone(),
                    score: s,
                },
            })
        })
        .collect()
}

fn available_paths(candidate_paths: &[String], used_paths: &BTreeSet<String>) -> Vec<String> {
    candidate_paths
        .iter()
        .filter(|p| !used_paths.contains(*p))
        .cloned()
        .collect()
}

// ---------------------------------------------------------------------------
// Inline backend
// ---------------------------------------------------------------------------

/// Scores on the calling thread.
pub struct InlineBackend {
    paths: Vec<String>,
}

impl InlineBackend {
    pub fn new(candidate_paths: &[String], used_paths: &BTreeSet<String>) -> Self {
        Self {
            paths: available_paths(candidate_paths, used_paths),
        }
    }
}

impl ScoreBackend for InlineBackend {
    fn score_batch(&self, batch: &[Reference], threshold: f64) -> Vec<BatchHit> {
        score_against(batch, &self.paths, threshold)
    }
}

// ---------------------------------------------------------------------------
// Threaded backend
// ---------------------------------------------------------------------------

struct ScoreJob {
    references: Vec<Reference>,
    threshold: f64,
}

/// Scores on a worker thread. Batches and results cross the channel by
/// value; the worker holds its own copy of the paths. If the worker is
/// unreachable the batch is scored inline over a retained path copy; the
/// fallback is invisible to callers except through timing.
pub struct ThreadedBackend {
    jobs: mpsc::Sender<ScoreJob>,
    results: mpsc::Receiver<Vec<BatchHit>>,
    fallback_paths: Vec<String>,
}

impl ThreadedBackend {
    pub fn new(candidate_paths: &[String], used_paths: &BTreeSet<String>) -> Self {
        let paths = available_paths(candidate_paths, used_paths);
        let worker_paths = paths.clone();
        let (job_tx, job_rx) = mpsc::channel::<ScoreJob>();
        let (result_tx, result_rx) = mpsc::channel::<Vec<BatchHit>>();

        thread::spawn(move || {
            while let Ok(job) = job_rx.recv() {
                let hits = score_against(&job.references, &worker_paths, job.threshold);
                if result_tx.send(hits).is_err() {
                    break;
                }
            }
        });

        Self {
            jobs: job_tx,
            results: result_rx,
            fallback_paths: paths,
        }
    }
}

impl ScoreBackend for ThreadedBackend {
    fn score_batch(&self, batch: &[Reference], threshold: f64) -> Vec<BatchHit> {
        let job = ScoreJob {
            references: batch.to_vec(),
            threshold,
        };
        if self.jobs.send(job).is_ok() {
            if let Ok(hits) = self.results.recv() {
                return hits;
            }
        }
        tracing::debug!("scoring worker unreachable, scoring batch inline");
        score_against(batch, &self.fallback_paths, threshold)
    }
}

impl ScoreBackend for Box<dyn ScoreBackend> {
    fn score_batch(&self, batch: &[Reference], threshold: f64) -> Vec<BatchHit> {
        (**self).score_batch(batch, threshold)
    }
}

/// Construct the backend selected by configuration. Selection happens
/// explicitly at construction time, never by probing the runtime.
pub fn backend_for(
    kind: crate::config::BackendKind,
    candidate_paths: &[String],
    used_paths: &BTreeSet<String>,
) -> Box<dyn ScoreBackend> {
    match kind {
        crate::config::BackendKind::Inline => {
            Box::new(InlineBackend::new(candidate_paths, used_paths))
        }
        crate::config::BackendKind::Threaded => {
            Box::new(ThreadedBackend::new(candidate_paths, used_paths))
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

pub struct BatchMatchPipeline<B: ScoreBackend> {
    backend: B,
    batch_size: usize,
}

impl<B: ScoreBackend> BatchMatchPipeline<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(backend: B, batch_size: usize) -> Self {
        Self {
            backend,
            batch_size: batch_size.max(1),
        }
    }

    /// Score `references` in sequential batches and return the candidates
    /// whose best match cleared `threshold`, as `auto-high-confidence`
    /// matches. The observer fires once per completed batch.
    pub fn find_high_confidence_matches(
        &self,
        threshold: f64,
        references: &[Reference],
        mut on_progress: impl FnMut(Progress),
    ) -> Vec<Match> {
        let threshold = threshold.clamp(0.0, 1.0);
        let total = references.len();
        let timestamp = Utc::now().to_rfc3339();

        let mut candidates = Vec::new();
        let mut processed = 0;

        for batch in references.chunks(self.batch_size) {
            let hits = self.backend.score_batch(batch, threshold);
            processed += batch.len();

            for hit in hits {
                let source = batch.iter().find(|r| r.description == hit.reference);
                candidates.push(Match {
                    reference: hit.reference,
                    path: hit.best.path,
                    score: hit.best.score,
                    method: MatchMethod::AutoHighConfidence,
                    timestamp: timestamp.clone(),
                    session_id: None,
                    original_date: source.and_then(|r| r.date.clone()),
                    original_reference: source.and_then(|r| r.external_code.clone()),
                });
            }

            on_progress(Progress {
                processed,
                total,
                found: candidates.len(),
            });
        }

        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scorer::score;

    fn references(descriptions: &[&str]) -> Vec<Reference> {
        descriptions.iter().map(|d| Reference::new(*d)).collect()
    }

    #[test]
    fn below_threshold_returns_empty() {
        let corpus = vec!["/exhibits/bundle-index.pdf".to_string()];
        let refs = references(&["Exhibit A5-01"]);
        // Best similarity is well under the threshold.
        assert!(score("Exhibit A5-01", &corpus[0], false) < 0.8);

        let pipeline = BatchMatchPipeline::new(InlineBackend::new(&corpus, &BTreeSet::new()));
        let found = pipeline.find_high_confidence_matches(0.8, &refs, |_| {});
        assert!(found.is_empty());
    }

    #[test]
    fn above_threshold_returns_one_candidate() {
        let corpus = vec![
            "/exhibits/bundle-index.pdf".to_string(),
            "/e/Exhibit A5-01.pdf".to_string(),
        ];
        let refs = references(&["Exhibit A5-01"]);
        assert!(score("Exhibit A5-01", &corpus[1], false) >= 0.8);

        let pipeline = BatchMatchPipeline::new(InlineBackend::new(&corpus, &BTreeSet::new()));
        let found = pipeline.find_high_confidence_matches(0.8, &refs, |_| {});
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, "/e/Exhibit A5-01.pdf");
        assert_eq!(found[0].method, MatchMethod::AutoHighConfidence);
        assert!(found[0].score >= 0.8);
    }

    #[test]
    fn used_paths_excluded_from_scoring() {
        let corpus = vec!["/e/Exhibit A5-01.pdf".to_string()];
        let used: BTreeSet<String> = corpus.iter().cloned().collect();
        let refs = references(&["Exhibit A5-01"]);

        let pipeline = BatchMatchPipeline::new(InlineBackend::new(&corpus, &used));
        let found = pipeline.find_high_confidence_matches(0.5, &refs, |_| {});
        assert!(found.is_empty());
    }

    #[test]
    fn progress_is_monotonic_per_batch() {
        let corpus = vec![
            "/e/Exhibit A5-01.pdf".to_string(),
            "/e/Exhibit A5-02.pdf".to_string(),
        ];
        let refs = references(&["Exhibit A5-01", "Exhibit A5-02", "Unrelated note"]);

        let backend = InlineBackend::new(&corpus, &BTreeSet::new());
        let pipeline = BatchMatchPipeline::with_batch_size(backend, 1);

        let mut events = Vec::new();
        pipeline.find_high_confidence_matches(0.8, &refs, |p| events.push(p));

        assert_eq!(events.len(), 3);
        assert!(events.windows(2).all(|w| w[0].processed <= w[1].processed));
        assert!(events.windows(2).all(|w| w[0].found <= w[1].found));
        assert_eq!(events.last().map(|p| p.processed), Some(3));
        assert!(events.iter().all(|p| p.total == 3));
    }

    #[test]
    fn threaded_backend_matches_inline_results() {
        let corpus = vec![
            "/e/Exhibit A5-01.pdf".to_string(),
            "/e/Exhibit A5-02.pdf".to_string(),
            "/exhibits/bundle-index.pdf".to_string(),
        ];
        let refs = references(&["Exhibit A5-01", "Exhibit A5-02"]);
        let used = BTreeSet::new();

        let inline = InlineBackend::new(&corpus, &used);
        let threaded = ThreadedBackend::new(&corpus, &used);

        let a = inline.score_batch(&refs, 0.8);
        let b = threaded.score_batch(&refs, 0.8);
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn candidates_carry_reference_fields() {
        let corpus = vec!["/e/Exhibit A5-01.pdf".to_string()];
        let mut refs = references(&["Exhibit A5-01"]);
        refs[0].date = Some("2020-06-01".into());
        refs[0].external_code = Some("A5-01".into());

        let pipeline = BatchMatchPipeline::new(InlineBackend::new(&corpus, &BTreeSet::new()));
        let found = pipeline.find_high_confidence_matches(0.8, &refs, |_| {});
        assert_eq!(found[0].original_date.as_deref(), Some("2020-06-01"));
        assert_eq!(found[0].original_reference.as_deref(), Some("A5-01"));
    }
}
