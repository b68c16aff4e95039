//! Property tests for chunking bounds and search ranking.

use medrag_core::chunking::{Chunker, RecursiveChunker};
use medrag_core::index::{FlatIndex, HnswIndex, HnswParams, Neighbor, VectorIndex};
use proptest::prelude::*;

/// Text made of unique, space- or newline-separated words, each shorter than
/// any chunk size used below, so chunk boundaries always fall between words.
fn arb_document() -> impl Strategy<Value = (Vec<String>, String)> {
    let separator = prop_oneof![4 => Just(" "), 1 => Just("\n"), 1 => Just("\n\n")];
    // Stems never contain 'w', so a 'w' always starts a word.
    proptest::collection::vec(("[a-v]{1,8}", separator), 1..120).prop_map(|parts| {
        let words: Vec<String> =
            parts.iter().enumerate().map(|(i, (stem, _))| format!("w{i}{stem}")).collect();
        let mut text = String::new();
        for (word, (_, separator)) in words.iter().zip(&parts) {
            text.push_str(word);
            text.push_str(separator);
        }
        (words, text)
    })
}

/// Prose: sentences of lowercase words (some longer than the smaller chunk
/// sizes) ending in a full stop, separated by a space, a line break or a
/// blank line.
fn arb_prose() -> impl Strategy<Value = String> {
    let sentence = proptest::collection::vec("[a-z]{1,40}", 1..14)
        .prop_map(|words| format!("{}.", words.join(" ")));
    let separator = prop_oneof![4 => Just(" "), 1 => Just("\n"), 1 => Just("\n\n")];
    proptest::collection::vec((sentence, separator), 1..40).prop_map(|parts| {
        let mut text = String::new();
        for (i, (sentence, separator)) in parts.iter().enumerate() {
            if i > 0 {
                text.push_str(separator);
            }
            text.push_str(sentence);
        }
        text
    })
}

/// A run with no separator at all, so only the per-character level applies.
fn arb_unbroken_run() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9]{1,600}"
}

fn without_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Generate a non-zero L2-normalized embedding of the given dimension.
fn arb_normalized_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter_map("non-zero embedding", |mut v| {
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm < 1e-3 {
            return None;
        }
        for val in &mut v {
            *val /= norm;
        }
        Some(v)
    })
}

/// Length in characters of the longest suffix of `a` that is also a prefix of `b`.
fn shared_boundary(a: &str, b: &str) -> usize {
    b.char_indices()
        .map(|(i, c)| i + c.len_utf8())
        .filter(|&end| a.ends_with(&b[..end]))
        .map(|end| b[..end].chars().count())
        .max()
        .unwrap_or(0)
}

/// **Chunk bounds**
/// *For any* text, every chunk is non-empty, trimmed and at most `chunk_size`
/// characters; every word of the input survives, in order; and consecutive
/// chunks share at most `chunk_overlap` characters.
mod prop_chunk_bounds {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn chunks_cover_input_within_size_and_overlap(
            (words, text) in arb_document(),
            chunk_size in 20usize..200,
            overlap_ratio in 0.0f64..0.5,
        ) {
            let chunk_overlap = (chunk_size as f64 * overlap_ratio) as usize;
            let chunker = RecursiveChunker::new(chunk_size, chunk_overlap).unwrap();
            let chunks = chunker.split_text(&text);

            prop_assert!(!chunks.is_empty());
            for chunk in &chunks {
                prop_assert!(!chunk.is_empty());
                prop_assert_eq!(chunk.trim(), chunk.as_str());
                prop_assert!(chunk.chars().count() <= chunk_size, "chunk too long: {:?}", chunk);
            }

            // Every word appears, and first appearances never go backwards.
            let mut last_seen = 0usize;
            for word in &words {
                let position = chunks.iter().position(|c| {
                    c.split_whitespace().any(|w| w == word)
                });
                prop_assert!(position.is_some(), "word {} lost", word);
                let position = position.unwrap();
                prop_assert!(position >= last_seen);
                last_seen = position;
            }

            for pair in chunks.windows(2) {
                prop_assert!(
                    shared_boundary(&pair[0], &pair[1]) <= chunk_overlap,
                    "{:?} and {:?} overlap by more than {}", pair[0], pair[1], chunk_overlap
                );
            }
        }
    }
}

/// **Chunk coverage and overlap**
/// *For any* prose or unbroken run, dropping from each chunk the part it
/// shares with its predecessor and concatenating the rest rebuilds the input
/// up to whitespace; consecutive chunks share at most `chunk_overlap`
/// characters, and at least one when the text is longer than
/// `chunk_size + chunk_overlap`.
mod prop_chunk_coverage {
    use super::*;

    fn check_spans(text: &str, chunk_size: usize, chunk_overlap: usize) -> Result<(), TestCaseError> {
        let chunker = RecursiveChunker::new(chunk_size, chunk_overlap).unwrap();
        let spans = chunker.split_spans(text);
        let long_text = text.chars().count() > chunk_size + chunk_overlap;

        let mut rebuilt = String::new();
        let mut previous_end = 0usize;
        for (i, span) in spans.iter().enumerate() {
            let chunk = &text[span.clone()];
            prop_assert!(!chunk.is_empty());
            prop_assert_eq!(chunk.trim(), chunk);
            prop_assert!(chunk.chars().count() <= chunk_size, "chunk too long: {:?}", chunk);

            if i > 0 {
                prop_assert!(span.start > spans[i - 1].start && span.end > previous_end);
                let shared = if span.start < previous_end {
                    text[span.start..previous_end].chars().count()
                } else {
                    0
                };
                prop_assert!(shared <= chunk_overlap, "{} shared, limit {}", shared, chunk_overlap);
                if long_text && chunk_overlap > 0 {
                    prop_assert!(shared > 0, "no overlap between {:?} and {:?}", spans[i - 1], span);
                }
            }
            rebuilt.push_str(&text[span.start.max(previous_end)..span.end]);
            previous_end = span.end;
        }

        prop_assert_eq!(without_whitespace(&rebuilt), without_whitespace(text));
        Ok(())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prose_chunks_rebuild_the_input(
            text in arb_prose(),
            chunk_size in 20usize..300,
            overlap_ratio in 0.0f64..0.5,
        ) {
            let chunk_overlap = (chunk_size as f64 * overlap_ratio) as usize;
            check_spans(&text, chunk_size, chunk_overlap)?;
        }

        #[test]
        fn unbroken_runs_rebuild_the_input(
            text in arb_unbroken_run(),
            chunk_size in 2usize..120,
            overlap_ratio in 0.0f64..0.5,
        ) {
            let chunk_overlap = (chunk_size as f64 * overlap_ratio) as usize;
            check_spans(&text, chunk_size, chunk_overlap)?;
        }

        #[test]
        fn default_sizes_overlap_on_prose(text in arb_prose()) {
            check_spans(&text, 500, 50)?;
        }
    }
}

/// **Ranking order**
/// *For any* set of unit vectors and query, exact search returns
/// `min(k, n)` results by descending score with ties broken by ascending ID,
/// and HNSW results obey the same order and bound.
mod prop_search_ordering {
    use super::*;

    const DIM: usize = 8;

    fn assert_ranked(results: &[Neighbor]) -> Result<(), TestCaseError> {
        for pair in results.windows(2) {
            prop_assert!(
                pair[0].score > pair[1].score
                    || (pair[0].score == pair[1].score && pair[0].id < pair[1].id),
                "{:?} ranked before {:?}", pair[0], pair[1]
            );
        }
        Ok(())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn flat_results_match_exhaustive_ranking(
            vectors in proptest::collection::vec(arb_normalized_embedding(DIM), 1..40),
            duplicates in 0usize..4,
            query in arb_normalized_embedding(DIM),
            k in 1usize..50,
        ) {
            let mut index = FlatIndex::new(DIM).unwrap();
            for vector in &vectors {
                index.insert(vector.clone()).unwrap();
            }
            // Exact duplicates force score ties.
            for _ in 0..duplicates {
                index.insert(vectors[0].clone()).unwrap();
            }

            let results = index.search(&query, k).unwrap();
            prop_assert_eq!(results.len(), k.min(index.len()));
            assert_ranked(&results)?;

            let mut expected: Vec<Neighbor> = (0..index.len() as u32)
                .map(|id| {
                    let v = index.vector(id).unwrap();
                    Neighbor { id, score: v.iter().zip(&query).map(|(a, b)| a * b).sum() }
                })
                .collect();
            expected.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.id.cmp(&b.id)));
            let expected_ids: Vec<u32> = expected.iter().take(k).map(|n| n.id).collect();
            let result_ids: Vec<u32> = results.iter().map(|n| n.id).collect();
            prop_assert_eq!(result_ids, expected_ids);
        }

        #[test]
        fn hnsw_results_are_ranked_and_bounded(
            vectors in proptest::collection::vec(arb_normalized_embedding(DIM), 1..60),
            query in arb_normalized_embedding(DIM),
            k in 1usize..20,
        ) {
            let mut index = HnswIndex::new(DIM, HnswParams::default()).unwrap();
            for vector in &vectors {
                index.insert(vector.clone()).unwrap();
            }
            let results = index.search(&query, k).unwrap();
            prop_assert!(results.len() <= k);
            prop_assert!(!results.is_empty());
            assert_ranked(&results)?;
        }
    }
}
