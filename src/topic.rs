//! Matching of published topic names against subscription filters.

/// Outcome of [`matches`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicMatch {
    NoMatch,
    Match,

    /// Matched, with the non-empty segments bound to each `+` in order.
    Captured(Vec<String>),
}

impl TopicMatch {
    pub fn is_match(&self) -> bool {
        !matches!(self, Self::NoMatch)
    }

    /// Segments captured by `+` wildcards, empty when there are none.
    pub fn into_captures(self) -> Vec<String> {
        match self {
            Self::Captured(captures) => captures,
            Self::NoMatch | Self::Match => Vec::new(),
        }
    }
}

fn found(captures: Vec<String>) -> TopicMatch {
    if captures.is_empty() {
        TopicMatch::Match
    } else {
        TopicMatch::Captured(captures)
    }
}

/// Matches `topic` against `filter`.
///
/// Reference: <https://docs.oasis-open.org/mqtt/mqtt/v3.1.1/os/mqtt-v3.1.1-os.html#_Toc398718106>
///
/// Scans both strings character by character:
/// - Literal characters must be equal.
/// - `+` consumes one topic level, up to the next `/` or the end of the topic.
/// - `#` must be the last character of the filter and matches whatever remains,
///   including nothing. A topic equal to the parent level (`foo` for `foo/#`) matches.
///
/// The first mismatch is final.
pub fn matches(topic: &str, filter: &str) -> TopicMatch {
    let t = topic.as_bytes();
    let f = filter.as_bytes();
    let (tlen, flen) = (t.len(), f.len());

    let mut captures = Vec::new();
    let (mut tp, mut fp) = (0, 0);

    while fp < flen && tp < tlen {
        if f[fp] == t[tp] {
            // "foo" against "foo/#"
            if tp == tlen - 1 && fp + 3 == flen && f[fp + 1] == b'/' && f[fp + 2] == b'#' {
                return found(captures);
            }

            fp += 1;
            tp += 1;

            // Both exhausted, or "a/" against "a/+"
            if (fp == flen && tp == tlen) || (tp == tlen && fp + 1 == flen && f[fp] == b'+') {
                return found(captures);
            }
        } else if f[fp] == b'+' {
            fp += 1;

            let start = tp;
            while tp < tlen && t[tp] != b'/' {
                tp += 1;
            }

            if tp > start {
                captures.push(topic[start..tp].to_string());
            }

            if tp == tlen && fp == flen {
                return found(captures);
            }
        } else if f[fp] == b'#' {
            if fp + 1 != flen {
                return TopicMatch::NoMatch;
            }
            return found(captures);
        } else {
            return TopicMatch::NoMatch;
        }
    }

    // "foo/" against "foo/#"
    if tp == tlen && fp + 1 == flen && f[fp] == b'#' {
        return found(captures);
    }

    if tp < tlen || fp < flen {
        TopicMatch::NoMatch
    } else {
        found(captures)
    }
}
