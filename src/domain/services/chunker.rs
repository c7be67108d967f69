/// Punctuation kept by `clean_text`; everything else outside alphanumerics
/// and whitespace is dropped.
const PERMITTED: &str = "-.,;:!?()[]{}\"'`_/\\#@&%+=*<>|~";

/// Splits cleaned text into overlapping, boundary-respecting chunks.
///
/// Windows prefer to end on a paragraph break, then a sentence terminator,
/// then fall back to a hard cut. The next window starts `overlap` characters
/// before the previous end.
#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(1000, 200)
    }
}

impl Chunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            overlap: overlap.min(chunk_size - 1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    pub fn chunk(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();
        if len == 0 || text.trim().is_empty() {
            return Vec::new();
        }
        if len <= self.chunk_size {
            return vec![text.to_string()];
        }

        let mut chunks = Vec::new();
        let mut start = 0usize;
        while start < len {
            let mut end = (start + self.chunk_size).min(len);
            if end < len {
                if let Some(pos) = rfind_paragraph(&chars, start, end) {
                    end = pos + 2;
                } else if let Some(pos) = rfind_char(&chars, start, end, '.') {
                    end = pos + 1;
                }
            }

            let piece: String = chars[start..end].iter().collect();
            let piece = piece.trim();
            if !piece.is_empty() {
                chunks.push(piece.to_string());
            }

            if end >= len {
                break;
            }
            let next = end.saturating_sub(self.overlap);
            start = if next > start { next } else { end };
        }
        chunks
    }
}

/// Last `\n\n` strictly inside `(start, end)`, or None.
fn rfind_paragraph(chars: &[char], start: usize, end: usize) -> Option<usize> {
    if end < start + 2 {
        return None;
    }
    for i in (start + 1..end - 1).rev() {
        if chars[i] == '\n' && chars[i + 1] == '\n' {
            return Some(i);
        }
    }
    None
}

/// Last occurrence of `needle` strictly after `start` and before `end`.
fn rfind_char(chars: &[char], start: usize, end: usize, needle: char) -> Option<usize> {
    (start + 1..end).rev().find(|&i| chars[i] == needle)
}

/// Conservative, idempotent cleaning: CRLF normalised, runs of spaces and
/// tabs collapsed to one space, runs of blank lines collapsed to a single
/// paragraph break, and punctuation outside the permitted alphabet dropped.
pub fn clean_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_newlines = 0usize;
    let mut pending_space = false;

    for c in text.chars() {
        match c {
            '\r' => {}
            '\n' => {
                pending_newlines += 1;
                pending_space = false;
            }
            c if c.is_whitespace() => {
                if pending_newlines == 0 {
                    pending_space = true;
                }
            }
            c if c.is_alphanumeric() || PERMITTED.contains(c) => {
                if pending_newlines > 0 {
                    if !out.is_empty() {
                        out.push('\n');
                        if pending_newlines > 1 {
                            out.push('\n');
                        }
                    }
                    pending_newlines = 0;
                } else if pending_space && !out.is_empty() {
                    out.push(' ');
                }
                pending_space = false;
                out.push(c);
            }
            _ => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_single_chunk() {
        let chunker = Chunker::default();
        let text = "alpha beta gamma.";
        let chunks = chunker.chunk(text);
        assert_eq!(chunks, vec![text.to_string()]);
    }

    #[test]
    fn test_empty_and_whitespace_dropped() {
        let chunker = Chunker::default();
        assert!(chunker.chunk("").is_empty());
        assert!(chunker.chunk("   \n\n  ").is_empty());
    }

    #[test]
    fn test_window_count_and_overlap() {
        // 3200 chars with no boundaries: hard cuts at 1000 with next start
        // at end - 200 yields windows [0,1000) [800,1800) [1600,2600) [2400,3200).
        let chunker = Chunker::new(1000, 200);
        let text: String = ('a'..='z').cycle().take(3200).collect();
        let chunks = chunker.chunk(&text);
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].chars().count(), 1000);
        // 200-char overlap between successive chunks
        let tail: String = chunks[0].chars().skip(800).collect();
        let head: String = chunks[1].chars().take(200).collect();
        assert_eq!(tail, head);
        let total: usize = chunks.last().map(|c| c.chars().count()).unwrap_or(0);
        assert_eq!(total, 800);
    }

    #[test]
    fn test_prefers_paragraph_break() {
        let chunker = Chunker::new(100, 20);
        let mut text = String::new();
        text.push_str(&"x".repeat(60));
        text.push_str("\n\n");
        text.push_str(&"y".repeat(100));
        let chunks = chunker.chunk(&text);
        // First window [0,100) contains the paragraph break at 60 and
        // truncates there.
        assert_eq!(chunks[0], "x".repeat(60));
    }

    #[test]
    fn test_prefers_sentence_terminator_over_hard_cut() {
        let chunker = Chunker::new(100, 20);
        let mut text = String::new();
        text.push_str(&"x".repeat(70));
        text.push('.');
        text.push_str(&"y".repeat(100));
        let chunks = chunker.chunk(&text);
        assert_eq!(chunks[0], format!("{}.", "x".repeat(70)));
    }

    #[test]
    fn test_rechunk_is_byte_identical() {
        let chunker = Chunker::new(50, 10);
        let text = "First sentence here. Second sentence follows.\n\nA new paragraph with more words. And a final one.";
        assert_eq!(chunker.chunk(text), chunker.chunk(text));
    }

    #[test]
    fn test_clean_collapses_whitespace() {
        assert_eq!(clean_text("a  \t b"), "a b");
        assert_eq!(clean_text("a\r\nb"), "a\nb");
        assert_eq!(clean_text("a\n\n\n\nb"), "a\n\nb");
    }

    #[test]
    fn test_clean_strips_disallowed_punctuation() {
        assert_eq!(clean_text("hello\u{2603} world!"), "hello world!");
        assert_eq!(clean_text("key: value (ok)"), "key: value (ok)");
    }

    #[test]
    fn test_clean_is_idempotent() {
        let raw = "  Some\ttext,\r\nwith  \u{00a7}junk\n\n\nand   gaps.  ";
        let once = clean_text(raw);
        assert_eq!(clean_text(&once), once);
    }
}
