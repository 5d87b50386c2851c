//! Preview container: renderer output → indexed, base64-encoded page blob.
//!
//! The renderer writes page images back to back, each starting with a fixed
//! magic (the PNG signature by default), with no other framing. This module
//! cuts that stream at every magic occurrence and packs the pages into:
//!
//! ```text
//! MAGIC (13 bytes, "EQSPOOLPRVW01")
//! repeat per page:   LEN (u32 LE) | base64(page bytes)
//! repeat per page:   OFFSET (u32 LE)     -- absolute position of that page's LEN
//! PAGE_COUNT (u32 LE)
//! ```
//!
//! A reader finds page `i` by reading the trailing count, jumping to the
//! `i`-th index entry and following it to the length prefix, without
//! decoding any other page. Encoding is a pure function of its input.

use crate::error::PreviewError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;

/// Leading magic of every preview container; the trailing `01` is the format version.
pub const PREVIEW_MAGIC: [u8; 13] = *b"EQSPOOLPRVW01";

const U32_LEN: usize = 4;

/// An encoded preview container with a validated index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewContainer {
    bytes: Vec<u8>,
    page_count: usize,
    index_start: usize,
}

impl PreviewContainer {
    /// Split `raw` renderer output at each `page_magic` and encode the pages.
    pub fn encode(raw: &[u8], page_magic: &[u8]) -> Result<Self, PreviewError> {
        let pages = split_pages(raw, page_magic);
        Self::from_pages(&pages)
    }

    /// Encode already-separated page images, in order.
    pub fn from_pages<P: AsRef<[u8]>>(pages: &[P]) -> Result<Self, PreviewError> {
        let encoded_len: usize = pages
            .iter()
            .map(|p| U32_LEN + p.as_ref().len().div_ceil(3) * 4)
            .sum();
        let mut out =
            Vec::with_capacity(PREVIEW_MAGIC.len() + encoded_len + (pages.len() + 1) * U32_LEN);
        out.extend_from_slice(&PREVIEW_MAGIC);

        let mut offsets = Vec::with_capacity(pages.len());
        for page in pages {
            offsets.push(to_u32(out.len())?);
            let b64 = STANDARD.encode(page.as_ref());
            out.extend_from_slice(&to_u32(b64.len())?.to_le_bytes());
            out.extend_from_slice(b64.as_bytes());
        }

        let index_start = out.len();
        for offset in &offsets {
            out.extend_from_slice(&offset.to_le_bytes());
        }
        out.extend_from_slice(&to_u32(pages.len())?.to_le_bytes());
        to_u32(out.len())?;

        debug!(
            "Preview container: {} pages, {} bytes",
            pages.len(),
            out.len()
        );

        Ok(Self {
            bytes: out,
            page_count: pages.len(),
            index_start,
        })
    }

    /// Validate an existing container and index it for page lookup.
    pub fn parse(bytes: Vec<u8>) -> Result<Self, PreviewError> {
        if !bytes.starts_with(&PREVIEW_MAGIC) {
            return Err(PreviewError::BadMagic);
        }
        if bytes.len() < PREVIEW_MAGIC.len() + U32_LEN {
            return Err(PreviewError::Truncated("page count"));
        }

        let page_count = read_u32(&bytes, bytes.len() - U32_LEN) as usize;
        let index_start = page_count
            .checked_mul(U32_LEN)
            .and_then(|index_len| (bytes.len() - U32_LEN).checked_sub(index_len))
            .filter(|&start| start >= PREVIEW_MAGIC.len())
            .ok_or(PreviewError::Truncated("page index"))?;

        for page in 0..page_count {
            let offset = read_u32(&bytes, index_start + page * U32_LEN);
            let start = offset as usize;
            let bad = PreviewError::BadOffset { page, offset };
            if start < PREVIEW_MAGIC.len() || start + U32_LEN > index_start {
                return Err(bad);
            }
            let len = read_u32(&bytes, start) as usize;
            if start + U32_LEN + len > index_start {
                return Err(bad);
            }
        }

        Ok(Self {
            bytes,
            page_count,
            index_start,
        })
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always false: even an empty preview carries its magic and count.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Absolute offset of page `index`'s length prefix.
    pub fn page_offset(&self, index: usize) -> Option<u32> {
        (index < self.page_count)
            .then(|| read_u32(&self.bytes, self.index_start + index * U32_LEN))
    }

    /// The base64 text of page `index`, as stored.
    pub fn page(&self, index: usize) -> Option<&[u8]> {
        let start = self.page_offset(index)? as usize;
        let len = read_u32(&self.bytes, start) as usize;
        let body = start + U32_LEN;
        self.bytes.get(body..body + len)
    }

    /// The raw image bytes of page `index`.
    pub fn decode_page(&self, index: usize) -> Option<Vec<u8>> {
        STANDARD.decode(self.page(index)?).ok()
    }
}

/// Cut renderer output into pages at each occurrence of `magic`.
///
/// Output without any occurrence is one page (the renderer emitted a single
/// unframed image); empty output is zero pages. Bytes before the first
/// occurrence are not part of any page.
pub fn split_pages<'a>(raw: &'a [u8], magic: &[u8]) -> Vec<&'a [u8]> {
    if raw.is_empty() {
        return Vec::new();
    }
    let starts = find_all(raw, magic);
    let Some(&first) = starts.first() else {
        return vec![raw];
    };
    if first > 0 {
        debug!("Discarding {} bytes before the first page", first);
    }
    starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = starts.get(i + 1).copied().unwrap_or(raw.len());
            &raw[start..end]
        })
        .collect()
}

/// Non-overlapping occurrences of `needle`, left to right.
fn find_all(haystack: &[u8], needle: &[u8]) -> Vec<usize> {
    let mut found = Vec::new();
    if needle.is_empty() {
        return found;
    }
    let mut pos = 0;
    while pos + needle.len() <= haystack.len() {
        match haystack[pos..]
            .windows(needle.len())
            .position(|w| w == needle)
        {
            Some(i) => {
                found.push(pos + i);
                pos += i + needle.len();
            }
            None => break,
        }
    }
    found
}

fn to_u32(n: usize) -> Result<u32, PreviewError> {
    u32::try_from(n).map_err(|_| PreviewError::TooLarge(n))
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut word = [0u8; U32_LEN];
    word.copy_from_slice(&bytes[at..at + U32_LEN]);
    u32::from_le_bytes(word)
}
