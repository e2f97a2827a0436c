// src/ingest/extract.rs
use crate::error::ExtractionError;
use crate::ingest::types::{PostElement, RawPost};

/// Read the fields we need off one exposed element.
///
/// Text and time label are required. A non-empty card link becomes an extra
/// trailing line, so it takes part in the (identity, text) dedupe key.
pub fn extract(identity: &str, el: &PostElement) -> Result<RawPost, ExtractionError> {
    let mut text = el
        .text
        .clone()
        .ok_or(ExtractionError::MissingField("text"))?;
    let raw_timestamp = el
        .time
        .clone()
        .ok_or(ExtractionError::MissingField("time"))?;

    if let Some(link) = el.card_link.as_deref().filter(|l| !l.is_empty()) {
        text.push('\n');
        text.push_str(link);
    }

    Ok(RawPost {
        source_id: el.post_id.clone(),
        identity: identity.to_string(),
        text,
        raw_timestamp,
    })
}
