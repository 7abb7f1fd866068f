//! Indentation-tracking block scanner shared by both rule dialects.
//!
//! This is deliberately not a YAML reader. It finds the line
//! `{marker} {name}` and collects every following line until the next
//! `{marker}` line at the same or a shallower indentation.

/// Scanner state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Seeking,
    InsideBlock { indent: usize },
    Done,
}

/// Number of leading whitespace characters.
pub(crate) fn indentation(line: &str) -> usize {
    line.chars().take_while(|c| c.is_whitespace()).count()
}

/// Collect the body lines of the rule block introduced by `{marker} {name}`.
///
/// Returns `None` when no line trims to exactly `{marker} {name}`. The
/// marker line itself is not part of the returned body.
pub(crate) fn find_block<'a>(text: &'a str, marker: &str, name: &str) -> Option<Vec<&'a str>> {
    let header = format!("{marker} {name}");
    let mut state = ScanState::Seeking;
    let mut body = Vec::new();

    for line in text.lines() {
        match state {
            ScanState::Seeking => {
                if line.trim() == header {
                    state = ScanState::InsideBlock {
                        indent: indentation(line),
                    };
                }
            }
            ScanState::InsideBlock { indent } => {
                if line.trim().starts_with(marker) && indentation(line) <= indent {
                    state = ScanState::Done;
                } else {
                    body.push(line);
                }
            }
            ScanState::Done => break,
        }
    }

    match state {
        ScanState::Seeking => None,
        ScanState::InsideBlock { .. } | ScanState::Done => Some(body),
    }
}

/// Value after `key` when the trimmed line starts with it.
pub(crate) fn key_value<'a>(trimmed: &'a str, key: &str) -> Option<&'a str> {
    trimmed.strip_prefix(key).map(str::trim)
}

/// Strip one pair of matching surrounding quotes.
pub(crate) fn unquote(value: &str) -> &str {
    let value = value.trim();
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}
