//! Text chunking module
//!
//! Splits notes into sentence-aligned chunks measured in words, with each
//! chunk repeating the trailing sentences of its predecessor.

use crate::loader::Document;
use geoqa_common::config::RetrievalConfig;
use tracing::debug;

/// Configuration for text chunking
#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    /// Target chunk size in words
    pub chunk_size: usize,
    /// Overlap carried into the next chunk, in words
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 400,
            chunk_overlap: 100,
        }
    }
}

impl From<&RetrievalConfig> for ChunkingConfig {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            chunk_size: config.chunk_size.max(1),
            chunk_overlap: config.chunk_overlap,
        }
    }
}

/// A text chunk with metadata
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    /// `{stem}_chunk_{index}`
    pub chunk_id: String,
    pub source: String,
    pub title: String,
    pub content: String,
    /// Index of this chunk in the document
    pub index: usize,
    pub word_count: usize,
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Split on `.`, `!` or `?` followed by whitespace or end of text, keeping
/// the terminator.
///
/// Decimal points ("1.5 m") do not end a sentence. Markdown headings are
/// dropped (the title is kept on each chunk), list items and blank lines
/// end the running sentence, and `**` emphasis is removed. Whitespace inside
/// a sentence is collapsed to single spaces.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            push_sentence(&mut sentences, &current);
            current.clear();
            continue;
        }

        let line = match line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) {
            Some(item) => {
                push_sentence(&mut sentences, &current);
                current.clear();
                item
            }
            None => line,
        };
        let line = line.replace("**", "");

        let mut chars = line.chars().peekable();
        while let Some(c) = chars.next() {
            current.push(c);
            if matches!(c, '.' | '!' | '?') && chars.peek().map_or(true, |n| n.is_whitespace()) {
                push_sentence(&mut sentences, &current);
                current.clear();
            }
        }
        current.push(' ');
    }
    push_sentence(&mut sentences, &current);

    sentences
}

fn push_sentence(sentences: &mut Vec<String>, raw: &str) {
    let sentence = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    // Runs like "?!" leave punctuation-only fragments behind
    if sentence.chars().any(|c| c.is_alphanumeric()) {
        sentences.push(sentence);
    }
}

/// Trailing sentences totalling at most `overlap` words
fn overlap_sentences(sentences: &[String], overlap: usize) -> Vec<String> {
    let mut taken = Vec::new();
    let mut words = 0;
    for sentence in sentences.iter().rev() {
        let n = word_count(sentence);
        if words + n > overlap {
            break;
        }
        taken.push(sentence.clone());
        words += n;
    }
    taken.reverse();
    taken
}

/// Split one document into chunks
pub fn chunk_document(document: &Document, config: &ChunkingConfig) -> Vec<TextChunk> {
    let sentences = split_sentences(&document.content);
    let mut chunks: Vec<TextChunk> = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_words = 0;

    let emit = |sentences: &[String], chunks: &mut Vec<TextChunk>| {
        let content = sentences.join(" ");
        let index = chunks.len();
        chunks.push(TextChunk {
            chunk_id: format!("{}_chunk_{}", document.stem, index),
            source: document.source.clone(),
            title: document.title.clone(),
            word_count: word_count(&content),
            content,
            index,
        });
    };

    for sentence in sentences {
        let n = word_count(&sentence);
        if current_words + n > config.chunk_size && !current.is_empty() {
            emit(&current, &mut chunks);
            current = overlap_sentences(&current, config.chunk_overlap);
            current.push(sentence);
            current_words = current.iter().map(|s| word_count(s)).sum();
        } else {
            current.push(sentence);
            current_words += n;
        }
    }
    if !current.is_empty() {
        emit(&current, &mut chunks);
    }

    debug!(
        source = %document.source,
        chunk_count = chunks.len(),
        chunk_size = config.chunk_size,
        "Document chunked"
    );

    chunks
}

/// Chunk every document, preserving document order
pub fn chunk_documents(documents: &[Document], config: &ChunkingConfig) -> Vec<TextChunk> {
    documents
        .iter()
        .flat_map(|doc| chunk_document(doc, config))
        .collect()
}
