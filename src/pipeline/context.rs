//! Prior-page context carried between extraction calls.
//!
//! The model sees one page at a time. Sending the text of the last few pages
//! along with each page lets it continue a register table, a pin list or a
//! numbered section that started earlier instead of re-introducing it.

use std::collections::VecDeque;

/// Bounded FIFO of the most recent page texts.
#[derive(Debug, Clone)]
pub struct ContextWindow {
    capacity: usize,
    max_chars: usize,
    pages: VecDeque<String>,
}

impl ContextWindow {
    /// A window holding up to `capacity` pages and at most `max_chars`
    /// characters when rendered.
    pub fn new(capacity: usize, max_chars: usize) -> Self {
        Self {
            capacity,
            max_chars,
            pages: VecDeque::with_capacity(capacity),
        }
    }

    /// Remember a successfully extracted page, evicting the oldest one
    /// when the window is full. Blank pages are not remembered.
    pub fn push(&mut self, text: &str) {
        if self.capacity == 0 || text.trim().is_empty() {
            return;
        }
        self.pages.push_back(text.trim().to_string());
        while self.pages.len() > self.capacity {
            self.pages.pop_front();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// The carried text: pages joined by a blank line, cut to the most
    /// recent `max_chars` characters. `None` when nothing is carried.
    pub fn render(&self) -> Option<String> {
        if self.pages.is_empty() || self.max_chars == 0 {
            return None;
        }
        let joined = self
            .pages
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n\n");
        Some(keep_tail(&joined, self.max_chars).to_string())
    }
}

/// The last `max_chars` characters of `s`, starting on a char boundary.
fn keep_tail(s: &str, max_chars: usize) -> &str {
    let count = s.chars().count();
    if count <= max_chars {
        return s;
    }
    let skip = count - max_chars;
    match s.char_indices().nth(skip) {
        Some((byte_idx, _)) => &s[byte_idx..],
        None => "",
    }
}
