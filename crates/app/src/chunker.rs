//! Accumulates generation deltas into sentence-sized synthesis chunks.
//!
//! A chunk closes at terminal punctuation, or at a size cap as a
//! fallback that bounds latency when the model produces long unbroken
//! spans.

const TERMINALS: &[char] = &['.', '!', '?', ';', ':', '\n'];

pub struct SentenceChunker {
    pending: String,
    max_chars: usize,
}

impl SentenceChunker {
    pub fn new(max_chars: usize) -> Self {
        Self {
            pending: String::new(),
            max_chars: max_chars.max(8),
        }
    }

    /// Feeds one delta; returns zero or more completed chunks, in
    /// order.
    pub fn push(&mut self, delta: &str) -> Vec<String> {
        self.pending.push_str(delta);
        let mut chunks = Vec::new();
        loop {
            if let Some(end) = self.boundary() {
                self.take_chunk(end, &mut chunks);
            } else if self.pending.chars().count() >= self.max_chars {
                let end = self.cap_split();
                self.take_chunk(end, &mut chunks);
            } else {
                break;
            }
        }
        chunks
    }

    /// Remaining text at end of reply, if any.
    pub fn flush(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        let rest = rest.trim();
        if rest.is_empty() {
            None
        } else {
            Some(rest.to_string())
        }
    }

    /// Byte index one past a terminal character that ends a sentence.
    /// A terminal followed by a non-space character (as in "3.14")
    /// does not close a chunk.
    fn boundary(&self) -> Option<usize> {
        let mut iter = self.pending.char_indices().peekable();
        while let Some((i, c)) = iter.next() {
            if !TERMINALS.contains(&c) {
                continue;
            }
            if c == '\n' {
                return Some(i + c.len_utf8());
            }
            match iter.peek() {
                None => return Some(i + c.len_utf8()),
                Some((_, next)) if next.is_whitespace() => return Some(i + c.len_utf8()),
                Some(_) => {}
            }
        }
        None
    }

    /// Split point when the cap is hit: the last whitespace inside the
    /// cap, or a hard cut at the cap when there is none.
    fn cap_split(&self) -> usize {
        let mut cut = None;
        let mut last_ws = None;
        for (chars, (i, c)) in self.pending.char_indices().enumerate() {
            if chars >= self.max_chars {
                cut = Some(i);
                break;
            }
            if c.is_whitespace() {
                last_ws = Some(i + c.len_utf8());
            }
        }
        let cap = cut.unwrap_or(self.pending.len());
        last_ws.unwrap_or(cap)
    }

    fn take_chunk(&mut self, end: usize, out: &mut Vec<String>) {
        let chunk: String = self.pending.drain(..end).collect();
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            out.push(chunk.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(chunker: &mut SentenceChunker, deltas: &[&str]) -> Vec<String> {
        let mut out = Vec::new();
        for d in deltas {
            out.extend(chunker.push(d));
        }
        out
    }

    #[test]
    fn partial_deltas_form_exactly_one_chunk() {
        let mut c = SentenceChunker::new(200);
        let chunks = collect(&mut c, &["Hello", " there", "."]);
        assert_eq!(chunks, vec!["Hello there."]);
        assert!(c.flush().is_none());
    }

    #[test]
    fn two_sentences_make_two_chunks_in_order() {
        let mut c = SentenceChunker::new(200);
        let chunks = collect(&mut c, &["Hi! ", "How can I help?"]);
        assert_eq!(chunks, vec!["Hi!", "How can I help?"]);
    }

    #[test]
    fn decimal_point_does_not_split() {
        let mut c = SentenceChunker::new(200);
        assert!(c.push("pi is 3.14").is_empty());
        assert_eq!(c.push(" roughly."), vec!["pi is 3.14 roughly."]);
    }

    #[test]
    fn size_cap_bounds_unbroken_spans() {
        let mut c = SentenceChunker::new(16);
        let chunks = c.push("one two three four five six");
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 20, "chunk too long: {chunk:?}");
        }
        // Nothing lost: concatenation preserves the words.
        let mut all = chunks.join(" ");
        if let Some(rest) = c.flush() {
            all.push(' ');
            all.push_str(&rest);
        }
        assert_eq!(all, "one two three four five six");
    }

    #[test]
    fn cap_without_whitespace_hard_cuts() {
        let mut c = SentenceChunker::new(8);
        let chunks = c.push("abcdefghijkl");
        assert_eq!(chunks[0], "abcdefgh");
    }

    #[test]
    fn flush_returns_trailing_text_once() {
        let mut c = SentenceChunker::new(200);
        assert!(c.push("unterminated tail").is_empty());
        assert_eq!(c.flush().as_deref(), Some("unterminated tail"));
        assert!(c.flush().is_none());
    }

    #[test]
    fn newline_closes_a_chunk() {
        let mut c = SentenceChunker::new(200);
        let chunks = c.push("line one\nline two.");
        assert_eq!(chunks, vec!["line one", "line two."]);
    }
}
