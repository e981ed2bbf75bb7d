//! Splits the reference text into overlapping passages.

/// A passage cut from the source document, before embedding.
#[derive(Debug, Clone)]
pub struct TextChunk {
    pub text: String,
    pub source: String,
    /// Character offset of the window start in the original document.
    pub start_offset: usize,
    /// Passage index within the source.
    pub seq: usize,
}

pub struct Chunker {
    size: usize,
    overlap: usize,
}

impl Chunker {
    pub fn new(size: usize, overlap: usize) -> Self {
        Self { size, overlap }
    }

    /// Split text into overlapping character windows, trimming each window
    /// back to the last sentence ending near its end when one exists.
    pub fn split(&self, text: &str, source: &str) -> Vec<TextChunk> {
        let chars: Vec<char> = text.chars().collect();
        let total_chars = chars.len();

        let mut chunks = Vec::new();
        if total_chars == 0 {
            return chunks;
        }

        let step = self.size.saturating_sub(self.overlap).max(1);
        let mut start = 0;
        let mut seq = 0;

        while start < total_chars {
            let end = (start + self.size).min(total_chars);
            let window: String = chars[start..end].iter().collect();

            let cut = if end < total_chars {
                trim_to_sentence_boundary(&window)
            } else {
                window
            };

            let trimmed = cut.trim();
            if !trimmed.is_empty() {
                chunks.push(TextChunk {
                    text: trimmed.to_string(),
                    source: source.to_string(),
                    start_offset: start,
                    seq,
                });
                seq += 1;
            }

            start += step;
        }

        chunks
    }
}

/// Cut the window back to a sentence ending found in its last fifth,
/// or return it unchanged when none is there.
fn trim_to_sentence_boundary(text: &str) -> String {
    let sentence_endings = [". ", "! ", "? ", ".\n", "!\n", "?\n"];

    let mut search_start = (text.len() * 80) / 100;
    while search_start > 0 && !text.is_char_boundary(search_start) {
        search_start -= 1;
    }
    let tail = &text[search_start..];

    for ending in sentence_endings.iter() {
        if let Some(pos) = tail.rfind(ending) {
            let cut_pos = search_start + pos + ending.len();
            return text[..cut_pos].to_string();
        }
    }

    text.to_string()
}
