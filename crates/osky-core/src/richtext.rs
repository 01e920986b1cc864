//! # Rich text
//!
//! Facets index post text by UTF-8 *byte* offsets. This module splits text
//! into renderable segments along those offsets and detects new facets
//! (links, mentions) in text about to be posted.

use tracing::debug;

use crate::models::{ByteSlice, Facet, FacetFeature};
use crate::traits::ProtocolClient;

/// A run of post text with its annotation, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    Text(&'a str),
    Mention { text: &'a str, did: &'a str },
    Link { text: &'a str, uri: &'a str },
}

/// Splits `text` along `facets`.
///
/// Facets are applied in byte-start order. A facet that overlaps the
/// previous one, runs past the end of the text, or does not fall on char
/// boundaries is ignored and its text stays plain.
pub fn segments<'a>(text: &'a str, facets: &'a [Facet]) -> Vec<Segment<'a>> {
    let mut sorted: Vec<&Facet> = facets.iter().collect();
    sorted.sort_by_key(|facet| facet.index.byte_start);

    let mut out = Vec::new();
    let mut last = 0;

    for facet in sorted {
        let ByteSlice { byte_start: start, byte_end: end } = facet.index;
        if start < last
            || start > end
            || end > text.len()
            || !text.is_char_boundary(start)
            || !text.is_char_boundary(end)
        {
            continue;
        }

        if start > last {
            out.push(Segment::Text(&text[last..start]));
        }

        let span = &text[start..end];
        let mention = facet.features.iter().find_map(|f| match f {
            FacetFeature::Mention { did } => Some(did.as_str()),
            _ => None,
        });
        let link = facet.features.iter().find_map(|f| match f {
            FacetFeature::Link { uri } => Some(uri.as_str()),
            _ => None,
        });

        match (mention, link) {
            (Some(did), _) => out.push(Segment::Mention { text: span, did }),
            (None, Some(uri)) => out.push(Segment::Link { text: span, uri }),
            (None, None) => out.push(Segment::Text(span)),
        }
        last = end;
    }

    if last < text.len() {
        out.push(Segment::Text(&text[last..]));
    }
    out
}

/// What a detected span refers to, before mentions are resolved to DIDs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detected {
    Mention(String),
    Link(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedSpan {
    pub index: ByteSlice,
    pub kind: Detected,
}

/// Finds `http(s)://` links and `@handle` mentions in `text`.
pub fn detect(text: &str) -> Vec<DetectedSpan> {
    let mut spans = Vec::new();

    for (offset, token) in tokens(text) {
        let opened = token.trim_start_matches('(');
        let lead = token.len() - opened.len();
        let word = opened.trim_end_matches(|c: char| ".,;:!?)\"'".contains(c));
        if word.is_empty() {
            continue;
        }

        let start = offset + lead;
        let index = ByteSlice { byte_start: start, byte_end: start + word.len() };

        if is_link(word) {
            spans.push(DetectedSpan { index, kind: Detected::Link(word.to_string()) });
        } else if let Some(handle) = word.strip_prefix('@').filter(|h| is_handle(h)) {
            spans.push(DetectedSpan {
                index,
                kind: Detected::Mention(handle.to_ascii_lowercase()),
            });
        }
    }
    spans
}

/// Detects facets in `text`, resolving each mention's handle to a DID.
/// Mentions whose handle cannot be resolved are left as plain text.
pub async fn detect_facets(client: &dyn ProtocolClient, text: &str) -> Vec<Facet> {
    let mut facets = Vec::new();

    for span in detect(text) {
        let feature = match span.kind {
            Detected::Link(uri) => FacetFeature::Link { uri },
            Detected::Mention(handle) => match client.get_profile(&handle).await {
                Ok(profile) => FacetFeature::Mention { did: profile.did },
                Err(err) => {
                    debug!(%handle, error = %err, "dropping unresolvable mention");
                    continue;
                }
            },
        };
        facets.push(Facet { index: span.index, features: vec![feature] });
    }
    facets
}

/// Whitespace-separated tokens with their byte offsets.
fn tokens(text: &str) -> Vec<(usize, &str)> {
    let mut out = Vec::new();
    let mut start = None;

    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            if let Some(s) = start.take() {
                out.push((s, &text[s..i]));
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        out.push((s, &text[s..]));
    }
    out
}

fn is_link(word: &str) -> bool {
    ["https://", "http://"]
        .iter()
        .any(|scheme| word.len() > scheme.len() && word.starts_with(scheme))
}

fn is_handle(handle: &str) -> bool {
    let labels: Vec<&str> = handle.split('.').collect();
    labels.len() >= 2
        && labels.iter().all(|label| {
            !label.is_empty()
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}
