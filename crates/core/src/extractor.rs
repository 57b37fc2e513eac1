use crate::error::ExtractError;
use crate::models::SourcePage;
use base64::{engine::general_purpose::STANDARD, Engine};
use lopdf::Document;

/// Turns an uploaded document payload into one text entry per physical page.
pub trait TextExtractor: Send + Sync {
    fn extract_pages(&self, raw: &[u8]) -> Result<Vec<String>, ExtractError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl TextExtractor for LopdfExtractor {
    fn extract_pages(&self, raw: &[u8]) -> Result<Vec<String>, ExtractError> {
        let document =
            Document::load_mem(raw).map_err(|error| ExtractError::Parse(error.to_string()))?;

        // get_pages is keyed by page number, so iteration follows reading order.
        let mut pages = Vec::new();
        for page_no in document.get_pages().into_keys() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| ExtractError::Parse(format!("page {page_no}: {error}")))?;
            pages.push(text.trim().to_string());
        }

        Ok(pages)
    }
}

/// Decodes a base64 upload, tolerating a `data:` URL prefix.
pub fn decode_base64_document(payload: &str) -> Result<Vec<u8>, ExtractError> {
    let trimmed = payload.trim();
    let encoded = match trimmed.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => trimmed,
    };

    let compact = encoded
        .chars()
        .filter(|ch| !ch.is_whitespace())
        .collect::<String>();

    Ok(STANDARD.decode(compact)?)
}

pub fn number_pages(pages: Vec<String>) -> Vec<SourcePage> {
    pages
        .into_iter()
        .enumerate()
        .map(|(index, text)| SourcePage {
            ordinal: index as u32 + 1,
            text,
        })
        .collect()
}
