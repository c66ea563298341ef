use crate::error::ChunkingError;
use crate::models::{Chunk, PageRecord, PipelineConfig};
use regex::Regex;
use std::collections::VecDeque;

/// Measures a piece of text in the unit `chunk_size` is expressed in.
pub type LengthFn = fn(&str) -> usize;

/// Paragraph, line, sentence, word, then raw characters.
pub const DEFAULT_SEPARATORS: [&str; 7] = ["\n\n", "\n", ". ", "! ", "? ", " ", ""];

pub fn char_length(text: &str) -> usize {
    text.chars().count()
}

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub length: LengthFn,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        PipelineConfig::default().into()
    }
}

impl From<PipelineConfig> for ChunkingConfig {
    fn from(value: PipelineConfig) -> Self {
        Self {
            chunk_size: value.chunk_size,
            chunk_overlap: value.chunk_overlap,
            length: char_length,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), ChunkingError> {
        if self.chunk_size == 0 {
            return Err(ChunkingError::InvalidConfig(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ChunkingError::InvalidConfig(format!(
                "chunk_overlap {} must be smaller than chunk_size {}",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

pub fn normalize_page_text(text: &str, blank_runs: &Regex) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n").replace('\u{a0}', " ");
    let trimmed_lines = unified
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");
    blank_runs.replace_all(&trimmed_lines, "\n\n").trim().to_string()
}

/// Splits page text hierarchically, falling back to finer separators only for
/// pieces that are still too long.
#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    config: ChunkingConfig,
    separators: Vec<&'static str>,
    blank_runs: Regex,
}

impl RecursiveSplitter {
    pub fn new(config: ChunkingConfig) -> Result<Self, ChunkingError> {
        config.validate()?;
        Ok(Self {
            config,
            separators: DEFAULT_SEPARATORS.to_vec(),
            blank_runs: Regex::new(r"\n{3,}")?,
        })
    }

    pub fn config(&self) -> ChunkingConfig {
        self.config
    }

    /// Turns pages into chunks; `sequence_index` restarts whenever the
    /// `(source, page_index)` pair changes. Pages without text yield nothing.
    pub fn split(&self, pages: &[PageRecord]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut previous: Option<(&str, u32)> = None;
        let mut sequence_index = 0u32;

        for page in pages {
            for content in self.split_text(&page.content) {
                let key = (page.source.as_str(), page.page_index);
                if previous == Some(key) {
                    sequence_index = sequence_index.saturating_add(1);
                } else {
                    sequence_index = 0;
                    previous = Some(key);
                }

                chunks.push(Chunk {
                    content,
                    source: page.source.clone(),
                    page_index: page.page_index,
                    sequence_index,
                    extra_metadata: page.extra_metadata.clone(),
                });
            }
        }

        chunks
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        let normalized = normalize_page_text(text, &self.blank_runs);
        if normalized.is_empty() {
            return Vec::new();
        }
        if (self.config.length)(&normalized) <= self.config.chunk_size {
            return vec![normalized];
        }
        self.split_recursive(&normalized, &self.separators)
    }

    fn split_recursive(&self, text: &str, separators: &[&'static str]) -> Vec<String> {
        let (separator, finer) = pick_separator(text, separators);
        let pieces: Vec<&str> = if separator.is_empty() {
            text.char_indices()
                .map(|(start, ch)| &text[start..start + ch.len_utf8()])
                .collect()
        } else {
            text.split_inclusive(separator).collect()
        };

        let mut output = Vec::new();
        let mut pending: Vec<&str> = Vec::new();

        for piece in pieces {
            if (self.config.length)(piece) < self.config.chunk_size {
                pending.push(piece);
                continue;
            }

            if !pending.is_empty() {
                output.extend(self.merge(&pending));
                pending.clear();
            }

            if finer.is_empty() {
                push_trimmed(&mut output, piece);
            } else {
                output.extend(self.split_recursive(piece, finer));
            }
        }

        if !pending.is_empty() {
            output.extend(self.merge(&pending));
        }

        output
    }

    /// Packs small pieces into windows of at most `chunk_size`, carrying up to
    /// `chunk_overlap` of the tail into the next window.
    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let length = self.config.length;
        let mut merged = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let piece_len = length(piece);

            if total + piece_len > self.config.chunk_size && !window.is_empty() {
                push_trimmed(&mut merged, &window.iter().copied().collect::<String>());

                while total > self.config.chunk_overlap
                    || (total + piece_len > self.config.chunk_size && total > 0)
                {
                    match window.pop_front() {
                        Some(front) => total = total.saturating_sub(length(front)),
                        None => break,
                    }
                }
            }

            window.push_back(piece);
            total += piece_len;
        }

        push_trimmed(&mut merged, &window.iter().copied().collect::<String>());
        merged
    }
}

fn pick_separator<'s>(
    text: &str,
    separators: &'s [&'static str],
) -> (&'static str, &'s [&'static str]) {
    for (index, separator) in separators.iter().enumerate() {
        if separator.is_empty() {
            return ("", &[]);
        }
        if text.contains(separator) {
            return (*separator, &separators[index + 1..]);
        }
    }
    ("", &[])
}

fn push_trimmed(target: &mut Vec<String>, text: &str) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        target.push(trimmed.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn splitter(chunk_size: usize, chunk_overlap: usize) -> RecursiveSplitter {
        RecursiveSplitter::new(ChunkingConfig {
            chunk_size,
            chunk_overlap,
            length: char_length,
        })
        .unwrap()
    }

    fn page(index: u32, content: &str) -> PageRecord {
        PageRecord::new("docs/manual.pdf", index, content)
    }

    #[test]
    fn short_page_yields_exactly_one_chunk() {
        let chunks = splitter(1_000, 200).split(&[page(0, "A short page of text.")]);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "A short page of text.");
        assert_eq!(chunks[0].sequence_index, 0);
    }

    #[test]
    fn page_of_three_chunk_sizes_without_overlap_yields_three_chunks() {
        let text = "x".repeat(30);
        let chunks = splitter(10, 0).split(&[page(0, &text)]);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|chunk| chunk.content.len() == 10));
    }

    #[test]
    fn empty_pages_emit_no_chunks() {
        let chunks = splitter(100, 10).split(&[page(0, ""), page(1, " \n\n \t"), page(2, "text")]);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].page_index, 2);
    }

    #[test]
    fn paragraphs_are_preferred_over_words() {
        let text = "First paragraph about pumps.\n\nSecond paragraph about valves.";
        let chunks = splitter(40, 0).split_text(text);
        assert_eq!(
            chunks,
            vec![
                "First paragraph about pumps.".to_string(),
                "Second paragraph about valves.".to_string()
            ]
        );
    }

    #[test]
    fn long_paragraph_falls_back_to_words_with_overlap() {
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa";
        let chunks = splitter(20, 6).split_text(text);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|chunk| chunk.chars().count() <= 20));
        assert!(chunks
            .iter()
            .all(|chunk| chunk.split(' ').all(|word| text.contains(word))));
        let shared = chunks
            .windows(2)
            .filter(|pair| {
                let last_word = pair[0].rsplit(' ').next().unwrap_or_default();
                pair[1].starts_with(last_word)
            })
            .count();
        assert!(shared > 0, "consecutive chunks should overlap: {chunks:?}");
    }

    #[test]
    fn sequence_index_resets_per_page() {
        let long = "one two three four five six seven eight nine ten";
        let chunks = splitter(12, 0).split(&[page(0, long), page(1, long)]);
        let first_page: Vec<u32> = chunks
            .iter()
            .filter(|chunk| chunk.page_index == 0)
            .map(|chunk| chunk.sequence_index)
            .collect();
        let second_page: Vec<u32> = chunks
            .iter()
            .filter(|chunk| chunk.page_index == 1)
            .map(|chunk| chunk.sequence_index)
            .collect();
        assert!(first_page.len() > 1);
        assert_eq!(first_page, (0..first_page.len() as u32).collect::<Vec<_>>());
        assert_eq!(first_page, second_page);
    }

    #[test]
    fn windows_line_endings_are_normalized() {
        let chunks = splitter(1_000, 0).split_text("line one\r\nline two\u{a0}end\n\n\n\nnext");
        assert_eq!(chunks, vec!["line one\nline two end\n\nnext".to_string()]);
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let result = RecursiveSplitter::new(ChunkingConfig {
            chunk_size: 10,
            chunk_overlap: 10,
            length: char_length,
        });
        assert!(matches!(result, Err(ChunkingError::InvalidConfig(_))));
    }
}
