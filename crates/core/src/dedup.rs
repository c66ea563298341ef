use crate::models::IdentifiedChunk;
use std::collections::HashSet;
use tracing::info;

#[derive(Debug, Default)]
pub struct DedupOutcome {
    pub admitted: Vec<IdentifiedChunk>,
    pub skipped: usize,
}

/// Admits candidates whose id is neither in the stored snapshot nor already
/// admitted earlier in the same batch. Nothing stored is touched.
pub fn filter_new(candidates: Vec<IdentifiedChunk>, existing_ids: &HashSet<String>) -> DedupOutcome {
    let mut seen = HashSet::with_capacity(candidates.len());
    let mut outcome = DedupOutcome::default();

    for candidate in candidates {
        if existing_ids.contains(&candidate.id) || !seen.insert(candidate.id.clone()) {
            outcome.skipped += 1;
            continue;
        }
        outcome.admitted.push(candidate);
    }

    info!(
        admitted = outcome.admitted.len(),
        skipped = outcome.skipped,
        "dedup gate"
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;

    fn candidate(id: &str, content: &str) -> IdentifiedChunk {
        IdentifiedChunk {
            id: id.to_string(),
            chunk: Chunk {
                content: content.to_string(),
                source: "a.pdf".to_string(),
                page_index: 0,
                sequence_index: 0,
                extra_metadata: Default::default(),
            },
        }
    }

    #[test]
    fn existing_and_repeated_ids_are_skipped() {
        let existing: HashSet<String> = ["A", "B"].iter().map(|id| id.to_string()).collect();
        let outcome = filter_new(
            vec![
                candidate("A", "stored"),
                candidate("C", "first"),
                candidate("C", "second"),
            ],
            &existing,
        );

        assert_eq!(outcome.admitted.len(), 1);
        assert_eq!(outcome.admitted[0].id, "C");
        assert_eq!(outcome.admitted[0].chunk.content, "first");
        assert_eq!(outcome.skipped, 2);
    }

    #[test]
    fn empty_snapshot_admits_everything_unique() {
        let outcome = filter_new(vec![candidate("x", "1"), candidate("y", "2")], &HashSet::new());
        assert_eq!(outcome.admitted.len(), 2);
        assert_eq!(outcome.skipped, 0);
    }
}
