use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub index: usize,
    /// Char offset of the window start in the source text.
    pub offset: usize,
    pub text: String,
}

pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<Chunk> {
    let mut overlap = overlap;

    if size == 0 {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return vec![];
        }
        return vec![Chunk {
            index: 0,
            offset: 0,
            text: trimmed.to_string(),
        }];
    }
    if overlap >= size {
        overlap = size / 4;
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;
    let chars: Vec<char> = text.chars().collect();
    let len_chars = chars.len();

    while start < len_chars {
        let mut end = (start + size).min(len_chars);
        if end < len_chars {
            end = snap_to_boundary(&chars, start, end);
        }
        let chunk_str: String = chars[start..end].iter().collect();
        let trimmed = chunk_str.trim();
        if !trimmed.is_empty() {
            chunks.push(Chunk {
                index: chunks.len(),
                offset: start,
                text: trimmed.to_string(),
            });
        }
        if end == len_chars {
            break;
        }
        let next = end.saturating_sub(overlap);
        start = if next > start {
            align_start(&chars, next, end)
        } else {
            end
        };
    }

    chunks
}

/// Moves `end` back to the best break found in the second half of the window.
fn snap_to_boundary(chars: &[char], start: usize, end: usize) -> usize {
    let floor = start + (end - start) / 2;
    let window = &chars[floor..end];

    let paragraph = window
        .windows(2)
        .rposition(|w| w[0] == '\n' && w[1] == '\n')
        .map(|i| floor + i + 2);
    let newline = || window.iter().rposition(|c| *c == '\n').map(|i| floor + i + 1);
    let space = || window.iter().rposition(|c| c.is_whitespace()).map(|i| floor + i + 1);

    paragraph
        .or_else(newline)
        .or_else(space)
        .filter(|&cut| cut > start)
        .unwrap_or(end)
}

/// Moves an overlap start that lands mid-word to the next word, when there is one.
fn align_start(chars: &[char], next: usize, end: usize) -> usize {
    if next == 0 || chars[next - 1].is_whitespace() {
        return next;
    }
    chars[next..end]
        .iter()
        .position(|c| c.is_whitespace())
        .map(|i| next + i + 1)
        .unwrap_or(next)
}
