use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default window size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 800;
/// Default overlap between consecutive windows.
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;

// Boundary preference order: paragraph, line, sentence, word. A raw
// character cut is the final fallback.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// A bounded piece of a source document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique chunk ID, freshly generated at chunking time
    pub id: Uuid,
    /// Original file name
    pub source: String,
    /// Chunk order within the source, contiguous from 0
    pub chunk_index: usize,
    /// Actual text content
    pub content: String,
}

/// Splits text into overlapping character windows, cutting at natural
/// boundaries where the window allows it.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        ensure!(chunk_size > 0, "chunk_size must be positive");
        ensure!(
            chunk_overlap < chunk_size,
            "chunk_overlap ({}) must be smaller than chunk_size ({})",
            chunk_overlap,
            chunk_size
        );

        Ok(TextSplitter {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split `text` into windows of at most `chunk_size` characters.
    ///
    /// Consecutive windows share exactly `chunk_overlap` characters. Nothing
    /// is trimmed or rewritten, so dropping the trailing overlap of every
    /// non-final window and concatenating reproduces `text`.
    pub fn split(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();

        if total == 0 {
            return Vec::new();
        }
        if total <= self.chunk_size {
            return vec![text.to_string()];
        }

        let mut chunks = Vec::new();
        let mut start = 0;

        // The tail that fits in a single window becomes the final chunk.
        while total - start > self.chunk_size {
            let end = self.find_break(&chars, start);
            chunks.push(chars[start..end].iter().collect());
            start = end - self.chunk_overlap;
        }
        chunks.push(chars[start..].iter().collect());

        chunks
    }

    /// Pick the end of the window starting at `start`.
    ///
    /// Separators are tried in preference order; a candidate position must
    /// leave room for forward progress, since the next window starts at
    /// `end - chunk_overlap`.
    fn find_break(&self, chars: &[char], start: usize) -> usize {
        let max_end = start + self.chunk_size;
        let min_end = start + self.chunk_overlap + 1;

        for sep in SEPARATORS {
            if let Some(end) = last_boundary(chars, sep, min_end, max_end) {
                return end;
            }
        }

        max_end
    }
}

/// Rightmost `end` in `[min_end, max_end]` such that `chars[..end]` ends with
/// `sep`. The separator stays with the leading chunk.
fn last_boundary(chars: &[char], sep: &str, min_end: usize, max_end: usize) -> Option<usize> {
    let sep: Vec<char> = sep.chars().collect();
    let len = sep.len();
    if max_end < min_end || max_end < len {
        return None;
    }

    let high = max_end - len;
    let low = min_end.saturating_sub(len);
    for p in (low..=high).rev() {
        if chars[p..p + len] == sep[..] && p + len >= min_end {
            return Some(p + len);
        }
    }

    None
}

/// Wrap the windows of `text` into `Chunk` records for `source`.
pub fn chunk_text(splitter: &TextSplitter, text: &str, source: &str) -> Vec<Chunk> {
    splitter
        .split(text)
        .into_iter()
        .enumerate()
        .map(|(chunk_index, content)| Chunk {
            id: Uuid::new_v4(),
            source: source.to_string(),
            chunk_index,
            content,
        })
        .collect()
}
