//! Splits documents into bounded chunks for embedding.
//! Prefers paragraph boundaries, then line breaks; adjacent pieces are merged up to the
//! size limit with a small overlap of trailing context.

use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;

use serde_json::Value;

use crate::documents::Document;

const SEPARATORS: [&str; 2] = ["\n\n", "\n"];

pub type Metadata = BTreeMap<String, Value>;

/// A chunk of a document, the unit of embedding and storage.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// `doc-<n>` where n is the chunk's position in ingestion order.
    pub id: String,
    pub text: String,
    /// `source`, `start_index` and `text`, stored alongside the vector.
    pub metadata: Metadata,
    pub source_path: PathBuf,
}

pub fn chunk_id(position: usize) -> String {
    format!("doc-{position}")
}

/// Chunk all documents, numbering chunks across the whole corpus.
pub fn chunk_documents(docs: &[Document], chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    for doc in docs {
        let mut search_from = 0usize;
        for text in split_text(&doc.text, chunk_size, overlap) {
            let start = locate(&doc.text, &text, search_from);
            if let Some((byte_start, _)) = start {
                search_from = byte_start + 1;
            }
            let source = doc.path.to_string_lossy().into_owned();
            let mut metadata = Metadata::new();
            metadata.insert("source".into(), Value::from(source));
            metadata.insert(
                "start_index".into(),
                start.map_or(Value::from(-1), |(_, chars)| Value::from(chars)),
            );
            metadata.insert("text".into(), Value::from(text.clone()));
            chunks.push(Chunk {
                id: chunk_id(chunks.len()),
                text,
                metadata,
                source_path: doc.path.clone(),
            });
        }
    }
    chunks
}

/// Byte and char offset of `needle` in `haystack`, searching from byte `from`.
fn locate(haystack: &str, needle: &str, from: usize) -> Option<(usize, usize)> {
    let from = (from..=haystack.len()).find(|i| haystack.is_char_boundary(*i))?;
    let byte = haystack[from..].find(needle)? + from;
    Some((byte, haystack[..byte].chars().count()))
}

/// Splits `text` into trimmed, non-empty pieces of at most `chunk_size` chars where a
/// separator allows it. A piece with no separator left is kept whole.
///
/// Separators stay attached to the piece that follows them, so every chunk is a
/// verbatim slice of `text` (modulo surrounding whitespace).
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    if chunk_size == 0 {
        let t = text.trim();
        return if t.is_empty() { Vec::new() } else { vec![t.to_string()] };
    }
    split_recursive(text, &SEPARATORS, chunk_size, overlap)
}

fn split_recursive(text: &str, separators: &[&str], chunk_size: usize, overlap: usize) -> Vec<String> {
    let position = separators
        .iter()
        .position(|s| text.contains(s))
        .unwrap_or(separators.len() - 1);
    let separator = separators[position];
    let remaining = &separators[position + 1..];

    let mut result = Vec::new();
    let mut pending: Vec<&str> = Vec::new();
    for piece in split_keeping_separator(text, separator) {
        if char_len(piece) < chunk_size {
            pending.push(piece);
            continue;
        }
        if !pending.is_empty() {
            result.extend(merge_pieces(&pending, chunk_size, overlap));
            pending.clear();
        }
        if remaining.is_empty() {
            let t = piece.trim();
            if !t.is_empty() {
                result.push(t.to_string());
            }
        } else {
            result.extend(split_recursive(piece, remaining, chunk_size, overlap));
        }
    }
    if !pending.is_empty() {
        result.extend(merge_pieces(&pending, chunk_size, overlap));
    }
    result
}

/// Slices of `text` that each start at an occurrence of `separator` (except the first).
/// Concatenated, they reproduce `text` exactly.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for (at, _) in text.match_indices(separator) {
        if at > start {
            pieces.push(&text[start..at]);
            start = at;
        }
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

/// Greedily concatenates adjacent pieces up to `chunk_size`, carrying at most `overlap`
/// chars of the previous chunk's tail into the next one.
fn merge_pieces(pieces: &[&str], chunk_size: usize, overlap: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut window: VecDeque<&str> = VecDeque::new();
    let mut total = 0usize;

    for &piece in pieces {
        let len = char_len(piece);
        if total + len > chunk_size && !window.is_empty() {
            push_joined(&mut out, &window);
            while total > overlap || (total > 0 && total + len > chunk_size) {
                let Some(first) = window.pop_front() else { break };
                total -= char_len(first);
            }
        }
        window.push_back(piece);
        total += len;
    }
    push_joined(&mut out, &window);
    out
}

fn push_joined(out: &mut Vec<String>, window: &VecDeque<&str>) {
    let joined: String = window.iter().copied().collect();
    let t = joined.trim();
    if !t.is_empty() {
        out.push(t.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(path: &str, text: &str) -> Document {
        Document {
            path: PathBuf::from(path),
            text: text.to_string(),
        }
    }

    #[test]
    fn short_document_is_one_chunk() {
        let c = chunk_documents(&[doc("a.txt", "One paragraph.")], 1000, 20);
        assert_eq!(c.len(), 1);
        assert_eq!(c[0].id, "doc-0");
        assert_eq!(c[0].text, "One paragraph.");
        assert_eq!(c[0].metadata["source"], "a.txt");
        assert_eq!(c[0].metadata["start_index"], 0);
    }

    #[test]
    fn paragraphs_merge_up_to_size() {
        let parts = split_text("P1\n\nP2\n\nP3", 6, 0);
        assert_eq!(parts, ["P1\n\nP2", "P3"]);
    }

    #[test]
    fn paragraphs_split_when_each_is_large() {
        let a = "a".repeat(30);
        let b = "b".repeat(30);
        let parts = split_text(&format!("{a}\n\n{b}"), 40, 0);
        assert_eq!(parts, [a, b]);
    }

    #[test]
    fn long_paragraph_falls_back_to_lines() {
        let text = (0..10).map(|i| format!("line {i:02} here")).collect::<Vec<_>>().join("\n");
        let parts = split_text(&text, 40, 0);
        assert!(parts.len() > 1);
        assert!(parts.iter().all(|p| p.chars().count() <= 40));
        assert!(parts[0].starts_with("line 00"));
    }

    #[test]
    fn overlap_repeats_tail_piece() {
        let parts = split_text("aaaa\nbbbb\ncccc", 10, 5);
        assert_eq!(parts, ["aaaa\nbbbb", "bbbb\ncccc"]);
    }

    #[test]
    fn unsplittable_piece_is_kept_whole() {
        let long = "x".repeat(50);
        let parts = split_text(&long, 10, 0);
        assert_eq!(parts, [long]);
    }

    #[test]
    fn ids_run_across_documents() {
        let docs = [doc("a.txt", "alpha\n\nbeta"), doc("b.txt", "gamma")];
        let c = chunk_documents(&docs, 6, 0);
        let ids: Vec<_> = c.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["doc-0", "doc-1", "doc-2"]);
        assert_eq!(c[1].metadata["start_index"], 7);
        assert_eq!(c[2].source_path, PathBuf::from("b.txt"));
    }

    #[test]
    fn chunking_is_deterministic() {
        let docs = [doc("a.txt", &"word ".repeat(500))];
        assert_eq!(chunk_documents(&docs, 100, 20), chunk_documents(&docs, 100, 20));
    }

    #[test]
    fn blank_line_runs_are_kept_verbatim() {
        let text = "Title\n\n\n\nFirst paragraph.\n\n\nSecond paragraph.";
        let whole = chunk_documents(&[doc("a.txt", text)], 1000, 20);
        assert_eq!(whole.len(), 1);
        assert_eq!(whole[0].text, text);
        assert_eq!(whole[0].metadata["start_index"], 0);

        let chunks = chunk_documents(&[doc("a.txt", text)], 20, 5);
        assert!(chunks.len() > 1);
        for c in &chunks {
            let start = c.metadata["start_index"].as_u64().unwrap() as usize;
            let at: String = text.chars().skip(start).take(c.text.chars().count()).collect();
            assert_eq!(at, c.text, "chunk {} is not a slice at its start_index", c.id);
        }
    }

    #[test]
    fn pieces_reassemble_the_input() {
        let text = "a\n\n\n\nb\n\nc\n";
        assert_eq!(split_keeping_separator(text, "\n\n").concat(), text);
        assert_eq!(split_keeping_separator(text, "\n\n"), ["a", "\n\n", "\n\nb", "\n\nc\n"]);
    }
}
