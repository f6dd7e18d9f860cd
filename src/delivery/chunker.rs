//! Splits oversized text into platform-sized chunks at paragraph or sentence
//! boundaries, falling back to a hard cut.
//!
//! Lengths are counted in characters. Every split records the separator it
//! removed, so `head + separator + tail` always reproduces the input.

use std::iter::FusedIterator;

const SENTENCE_DELIMITER: &str = ". ";

fn char_count(text: &str) -> usize {
    text.chars().count()
}

/// One split of `text` into a sendable head and the unsent remainder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Split<'a> {
    pub head: &'a str,
    pub separator: &'a str,
    pub tail: &'a str,
}

/// Split once. Text within `limit` comes back whole with an empty tail.
pub fn split_nicely(text: &str, limit: usize) -> Split<'_> {
    if char_count(text) <= limit {
        return Split {
            head: text,
            separator: "",
            tail: "",
        };
    }

    split_on_paragraph(text, limit)
        .or_else(|| split_on_sentence(text, limit))
        .unwrap_or_else(|| hard_split(text, limit))
}

/// Cut before the first line that would push the head past `limit`.
fn split_on_paragraph(text: &str, limit: usize) -> Option<Split<'_>> {
    let mut running = 0;
    let mut start = 0;

    for paragraph in text.split('\n') {
        let len = char_count(paragraph);
        if running + len + 2 > limit {
            // The very first paragraph is already too long.
            if start == 0 {
                return None;
            }
            return Some(Split {
                head: &text[..start - 1],
                separator: "\n",
                tail: &text[start..],
            });
        }
        running += len + 1;
        start += paragraph.len() + 1;
    }

    None
}

/// Cut after the last `". "` that keeps the head within `limit`. The head
/// keeps its full stop; the space, plus one stray leading space on the
/// remainder, become the separator.
fn split_on_sentence(text: &str, limit: usize) -> Option<Split<'_>> {
    let mut running = 0;
    let mut start = 0;

    for sentence in text.split(SENTENCE_DELIMITER) {
        let len = char_count(sentence);
        if running + len + 2 > limit {
            if start == 0 {
                return None;
            }
            let tail_start = if text[start..].starts_with(' ') {
                start + 1
            } else {
                start
            };
            return Some(Split {
                head: &text[..start - 1],
                separator: &text[start - 1..tail_start],
                tail: &text[tail_start..],
            });
        }
        running += len + 2;
        start += sentence.len() + SENTENCE_DELIMITER.len();
    }

    None
}

fn hard_split(text: &str, limit: usize) -> Split<'_> {
    let cut = text
        .char_indices()
        .nth(limit)
        .map_or(text.len(), |(index, _)| index);
    Split {
        head: &text[..cut],
        separator: "",
        tail: &text[cut..],
    }
}

/// A chunk ready to send, with the separator dropped after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    pub text: &'a str,
    pub separator: &'a str,
}

/// Lazy sequence of chunks over a borrowed response. Cloning restarts from
/// the clone point.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    remaining: &'a str,
    limit: usize,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining.is_empty() {
            return None;
        }
        let split = split_nicely(self.remaining, self.limit);
        self.remaining = split.tail;
        Some(Chunk {
            text: split.head,
            separator: split.separator,
        })
    }
}

impl FusedIterator for Chunks<'_> {}

/// Chunk `text` for a platform accepting at most `limit` characters per
/// message. A zero limit is treated as one.
pub fn chunks(text: &str, limit: usize) -> Chunks<'_> {
    Chunks {
        remaining: text,
        limit: limit.max(1),
    }
}
