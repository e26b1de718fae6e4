//! Sentence segmentation with one sentence of look-ahead.
//!
//! Tokens from a text generator are buffered until a sentence boundary shows
//! up. A finished sentence is only released once the next one is also
//! complete, which gives the synthesizer the following context for free and
//! adds no latency beyond waiting for that one sentence.

use std::collections::VecDeque;

/// Sentences kept back while input is still arriving.
const LOOKAHEAD: usize = 1;

/// Split `text` at every boundary: `.`, `?` or `!` followed by whitespace,
/// or a line break. Returns the complete segments and the unfinished tail.
fn split_at_boundaries(text: &str) -> (Vec<&str>, &str) {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match c {
            '\n' => {
                segments.push(&text[start..i]);
                start = i + 1;
            }
            '.' | '?' | '!' => {
                if let Some(&(next_at, next)) = chars.peek() {
                    if next.is_whitespace() {
                        segments.push(&text[start..next_at]);
                        start = next_at;
                    }
                }
            }
            _ => {}
        }
    }
    (segments, &text[start..])
}

/// Incremental segmenter. Returned sentences are trimmed, non-empty and in
/// arrival order.
#[derive(Debug, Default)]
pub struct SentenceSegmenter {
    buffer: String,
    queue: VecDeque<String>,
}

impl SentenceSegmenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one token; returns the sentences now ready for dispatch.
    pub fn push_token(&mut self, token: &str) -> Vec<String> {
        self.buffer.push_str(token);
        let (complete, tail) = split_at_boundaries(&self.buffer);
        if complete.is_empty() {
            return Vec::new();
        }
        let complete: Vec<String> = complete.into_iter().map(str::to_string).collect();
        self.buffer = tail.to_string();

        let mut ready = Vec::new();
        for sentence in complete {
            self.enqueue(&sentence, &mut ready);
        }
        ready
    }

    /// End of input: flush the unfinished tail and everything still queued.
    pub fn finish(&mut self) -> Vec<String> {
        let tail = std::mem::take(&mut self.buffer);
        let mut ready = Vec::new();
        self.enqueue(&tail, &mut ready);
        ready.extend(self.queue.drain(..));
        ready
    }

    /// Sentences held back for look-ahead, oldest first.
    pub fn pending(&self) -> impl Iterator<Item = &str> {
        self.queue.iter().map(String::as_str)
    }

    fn enqueue(&mut self, sentence: &str, ready: &mut Vec<String>) {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            return;
        }
        self.queue.push_back(sentence.to_string());
        while self.queue.len() > LOOKAHEAD {
            if let Some(oldest) = self.queue.pop_front() {
                ready.push(oldest);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(tokens: &[&str]) -> Vec<String> {
        let mut seg = SentenceSegmenter::new();
        let mut out = Vec::new();
        for t in tokens {
            out.extend(seg.push_token(t));
        }
        out.extend(seg.finish());
        out
    }

    #[test]
    fn test_boundaries() {
        let (segs, tail) = split_at_boundaries("One. Two? Three!\nFour");
        assert_eq!(segs, vec!["One.", " Two?", " Three!", ""]);
        assert_eq!(tail, "Four");

        let (segs, tail) = split_at_boundaries("v1.2 is out.");
        assert!(segs.is_empty());
        assert_eq!(tail, "v1.2 is out.");

        let (segs, tail) = split_at_boundaries("line one\nline two\n");
        assert_eq!(segs, vec!["line one", "line two"]);
        assert_eq!(tail, "");
    }

    #[test]
    fn test_hello_world_lookahead() {
        let mut seg = SentenceSegmenter::new();
        assert!(seg.push_token("Hello").is_empty());
        assert!(seg.push_token(".").is_empty());
        // boundary seen: "Hello." queued but held back
        assert!(seg.push_token(" Wor").is_empty());
        assert_eq!(seg.pending().collect::<Vec<_>>(), vec!["Hello."]);
        assert!(seg.push_token("ld.").is_empty());
        // "World." completes on the trailing whitespace, depth 2 releases "Hello."
        assert_eq!(seg.push_token(" "), vec!["Hello."]);
        assert_eq!(seg.pending().collect::<Vec<_>>(), vec!["World."]);
        assert_eq!(seg.finish(), vec!["World."]);
    }

    #[test]
    fn test_hello_world_without_trailing_space() {
        assert_eq!(run(&["Hello.", " World."]), vec!["Hello.", "World."]);
    }

    #[test]
    fn test_dispatch_order_matches_arrival() {
        let text = "First one. Second one! Third one? Fourth\nFifth. Sixth";
        let expected = vec!["First one.", "Second one!", "Third one?", "Fourth", "Fifth.", "Sixth"];
        // whole text at once
        assert_eq!(run(&[text]), expected);
        // one character at a time
        let chars: Vec<String> = text.chars().map(String::from).collect();
        let tokens: Vec<&str> = chars.iter().map(String::as_str).collect();
        assert_eq!(run(&tokens), expected);
        // uneven chunks
        assert_eq!(run(&["First one. Sec", "ond one! Third one? Fo", "urth\nFifth. Si", "xth"]), expected);
    }

    #[test]
    fn test_blank_segments_dropped() {
        assert_eq!(run(&["\n\n  \nHi.  \n\n"]), vec!["Hi."]);
        assert!(run(&[]).is_empty());
        assert!(run(&["   "]).is_empty());
    }

    #[test]
    fn test_unicode_tokens() {
        assert_eq!(run(&["Grüße. ", "¿Qué tal? ", "日本語"]), vec!["Grüße.", "¿Qué tal?", "日本語"]);
    }
}
