//! Balanced delimiter scanning over untrusted text.
//!
//! The scanner reports maximal spans whose `open`/`close` delimiters are fully
//! matched. Delimiters inside double-quoted string literals are ignored, and a
//! backslash escapes the next character inside a literal so `\"` never closes
//! it early. Literals are tracked across the whole text, so brackets quoted inside
//! an object never open an array span. Spans that are still open when the text
//! ends are discarded.

/// A balanced span located in the scanned text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span<'a> {
    /// Byte offset of the opening delimiter.
    pub start: usize,
    /// Byte offset one past the closing delimiter.
    pub end: usize,
    /// The span text, delimiters included.
    pub text: &'a str,
}

/// Lazy iterator over the maximal balanced spans of one delimiter pair.
///
/// The iterator owns no state beyond its cursor, so scanning the same text
/// again always yields the same sequence.
#[derive(Debug, Clone)]
pub struct BalancedSpans<'a> {
    text: &'a str,
    open: u8,
    close: u8,
    pos: usize,
    depth: usize,
    start: Option<usize>,
    in_string: bool,
    escape: bool,
}

/// Scan `text` for spans balanced with respect to `open`/`close`.
///
/// Both delimiters must be ASCII; every byte offset the scanner slices at is
/// therefore a char boundary.
pub fn balanced_spans(text: &str, open: char, close: char) -> BalancedSpans<'_> {
    debug_assert!(open.is_ascii() && close.is_ascii());
    BalancedSpans {
        text,
        open: open as u8,
        close: close as u8,
        pos: 0,
        depth: 0,
        start: None,
        in_string: false,
        escape: false,
    }
}

impl<'a> Iterator for BalancedSpans<'a> {
    type Item = Span<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let bytes = self.text.as_bytes();
        while self.pos < bytes.len() {
            let i = self.pos;
            let byte = bytes[i];
            self.pos += 1;

            if self.in_string {
                if self.escape {
                    self.escape = false;
                } else if byte == b'\\' {
                    self.escape = true;
                } else if byte == b'"' {
                    self.in_string = false;
                }
                continue;
            }

            if byte == b'"' {
                self.in_string = true;
            } else if byte == self.open {
                if self.depth == 0 {
                    self.start = Some(i);
                }
                self.depth += 1;
            } else if byte == self.close && self.depth > 0 {
                self.depth -= 1;
                if self.depth == 0 {
                    if let Some(start) = self.start.take() {
                        return Some(Span {
                            start,
                            end: i + 1,
                            text: &self.text[start..=i],
                        });
                    }
                }
            }
        }
        None
    }
}

/// Pool the `{}` and `[]` spans of `text` into a single candidate list,
/// most recently opened first.
///
/// A nested span opens after its enclosing one, so an array embedded in an
/// object is tried before the object itself.
pub fn candidate_spans(text: &str) -> Vec<Span<'_>> {
    let mut pooled: Vec<Span<'_>> = balanced_spans(text, '{', '}')
        .chain(balanced_spans(text, '[', ']'))
        .collect();
    pooled.sort_unstable_by(|a, b| b.start.cmp(&a.start));
    pooled
}
