//! Stable chunk identifiers.
//!
//! A collection is written with exactly one strategy. Positional ids follow the
//! chunk's place in its file (`source:page:sequence`) and change whenever the
//! chunking parameters change. Content ids are a name-based UUID of the chunk
//! text, so byte-identical text from different pages maps to one record.

use crate::error::IdentityError;
use crate::models::{Chunk, IdentifiedChunk};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

const CONTENT_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2b7e_93a4_5d08_b1e2_4c7d_9a05_3e61);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum IdentityStrategy {
    #[default]
    Positional,
    Content,
}

impl IdentityStrategy {
    pub fn assign_id(&self, chunk: &Chunk) -> Result<String, IdentityError> {
        match self {
            Self::Positional => {
                if chunk.source.trim().is_empty() {
                    return Err(IdentityError::MissingField("source"));
                }
                Ok(format!(
                    "{}:{}:{}",
                    chunk.source, chunk.page_index, chunk.sequence_index
                ))
            }
            Self::Content => {
                if chunk.content.is_empty() {
                    return Err(IdentityError::MissingField("content"));
                }
                Ok(Uuid::new_v5(&CONTENT_NAMESPACE, chunk.content.as_bytes()).to_string())
            }
        }
    }

    pub fn identify(&self, chunks: Vec<Chunk>) -> Result<Vec<IdentifiedChunk>, IdentityError> {
        chunks
            .into_iter()
            .map(|chunk| {
                let id = self.assign_id(&chunk)?;
                Ok(IdentifiedChunk { id, chunk })
            })
            .collect()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positional => "positional",
            Self::Content => "content",
        }
    }
}

impl fmt::Display for IdentityStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdentityStrategy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "positional" => Ok(Self::Positional),
            "content" => Ok(Self::Content),
            other => Err(format!("unknown identity strategy: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(content: &str, source: &str, page_index: u32, sequence_index: u32) -> Chunk {
        Chunk {
            content: content.to_string(),
            source: source.to_string(),
            page_index,
            sequence_index,
            extra_metadata: Default::default(),
        }
    }

    #[test]
    fn positional_id_is_source_page_sequence() {
        let id = IdentityStrategy::Positional
            .assign_id(&chunk("text", "data/manual.pdf", 3, 1))
            .unwrap();
        assert_eq!(id, "data/manual.pdf:3:1");
    }

    #[test]
    fn ids_are_deterministic() {
        let input = chunk("Hydraulic pressure", "a.pdf", 0, 0);
        for strategy in [IdentityStrategy::Positional, IdentityStrategy::Content] {
            assert_eq!(
                strategy.assign_id(&input).unwrap(),
                strategy.assign_id(&input.clone()).unwrap()
            );
        }
    }

    #[test]
    fn positional_ids_differ_by_sequence_index() {
        let first = IdentityStrategy::Positional
            .assign_id(&chunk("same", "a.pdf", 0, 0))
            .unwrap();
        let second = IdentityStrategy::Positional
            .assign_id(&chunk("same", "a.pdf", 0, 1))
            .unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn content_ids_collapse_identical_text_across_pages() {
        let first = IdentityStrategy::Content
            .assign_id(&chunk("shared footer", "a.pdf", 0, 0))
            .unwrap();
        let second = IdentityStrategy::Content
            .assign_id(&chunk("shared footer", "b.pdf", 7, 2))
            .unwrap();
        assert_eq!(first, second);
        assert!(Uuid::parse_str(&first).is_ok());
    }

    #[test]
    fn missing_identity_fields_are_rejected() {
        assert!(matches!(
            IdentityStrategy::Positional.assign_id(&chunk("text", " ", 0, 0)),
            Err(IdentityError::MissingField("source"))
        ));
        assert!(matches!(
            IdentityStrategy::Content.assign_id(&chunk("", "a.pdf", 0, 0)),
            Err(IdentityError::MissingField("content"))
        ));
    }

    #[test]
    fn strategy_parses_from_cli_names() {
        assert_eq!("Content".parse::<IdentityStrategy>(), Ok(IdentityStrategy::Content));
        assert!("hash".parse::<IdentityStrategy>().is_err());
    }
}
