//! Placeholder placement: map crops onto the character span of a link.
//!
//! Each band takes two character positions, an image line and a line break,
//! starting at the link's `begin`. The slicer is given
//! `max_rows = (end - begin) / 2` so the bands always fit, and placement
//! stops at `end` regardless. Whatever is left of the span is blanked so no
//! raw link text shows between or after the bands.

use crate::document::{Document, Payload, PlaceholderId};
use crate::error::SliceError;
use crate::pipeline::decode::ImageHandle;
use crate::pipeline::slice::slice;
use tracing::debug;

/// Placeholders written for one link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    /// Every placeholder placed, in position order.
    pub placeholders: Vec<PlaceholderId>,
    /// Number of image bands among them.
    pub bands: usize,
    /// Character positions covered by bands and line breaks.
    pub consumed: usize,
}

/// Hide `[begin, end)` behind one blank placeholder.
pub fn blank<D: Document + ?Sized>(
    document: &mut D,
    begin: usize,
    end: usize,
) -> Result<PlaceholderId, SliceError> {
    document.replace_span(begin, end, Payload::Blank)
}

/// Lay the bands of `image` over `[begin, end)`.
///
/// On error every placeholder written so far is released again.
pub fn place_bands<D: Document + ?Sized>(
    document: &mut D,
    begin: usize,
    end: usize,
    image: &ImageHandle,
    band_height: u32,
) -> Result<Placement, SliceError> {
    let max_rows = end.saturating_sub(begin) / 2;
    let mut placed = Vec::new();
    let mut bands = 0usize;
    let mut pos = begin;

    let result = (|| {
        for (crop, image) in slice(image, max_rows, band_height) {
            if pos >= end {
                break;
            }
            placed.push(document.replace_span(pos, pos + 1, Payload::Band { image, crop })?);
            bands += 1;
            pos += 1;

            if pos >= end {
                break;
            }
            placed.push(document.replace_span(pos, pos + 1, Payload::LineBreak)?);
            pos += 1;
        }
        if pos < end {
            placed.push(document.replace_span(pos, end, Payload::Blank)?);
        }
        Ok::<(), SliceError>(())
    })();

    if let Err(e) = result {
        for id in placed {
            document.release_placeholder(id);
        }
        return Err(e);
    }

    let consumed = pos - begin;

    debug!(
        "Placed {} bands over {}..{} ({} of {} positions)",
        bands,
        begin,
        end,
        consumed,
        end - begin
    );

    Ok(Placement {
        placeholders: placed,
        bands,
        consumed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::TextDocument;
    use image::{DynamicImage, RgbaImage};

    fn handle(w: u32, h: u32) -> ImageHandle {
        ImageHandle::from_image(DynamicImage::ImageRgba8(RgbaImage::new(w, h)))
    }

    #[test]
    fn two_bands_consume_four_of_six_positions() {
        let mut doc = TextDocument::new("abcdef");
        let placement = place_bands(&mut doc, 0, 6, &handle(10, 40), 20).unwrap();
        assert_eq!(placement.bands, 2);
        assert_eq!(placement.consumed, 4);
        // band, break, band, break, trailing blank
        assert_eq!(placement.placeholders.len(), 5);
        assert!(doc.overlay_at(0).unwrap().payload.is_band());
        assert!(matches!(doc.overlay_at(1).unwrap().payload, Payload::LineBreak));
        assert!(doc.overlay_at(2).unwrap().payload.is_band());
        assert!(doc.overlay_at(4).unwrap().payload.is_blank());
        assert!(doc.overlay_at(5).unwrap().payload.is_blank());
    }

    #[test]
    fn placement_never_leaves_the_span() {
        let mut doc = TextDocument::new("xx[[file:/tmp/tall.png]]yy");
        let (begin, end) = (2, 24);
        place_bands(&mut doc, begin, end, &handle(10, 10_000), 20).unwrap();
        for (_, p) in doc.placeholders() {
            assert!(p.begin >= begin && p.end <= end, "{}..{}", p.begin, p.end);
        }
        assert!(doc.overlay_at(1).is_none());
        assert!(doc.overlay_at(24).is_none());
    }

    #[test]
    fn one_character_span_gets_a_single_band() {
        let mut doc = TextDocument::new("z");
        let placement = place_bands(&mut doc, 0, 1, &handle(10, 100), 20).unwrap();
        assert_eq!(placement.bands, 1);
        assert_eq!(placement.consumed, 1);
    }

    #[test]
    fn failed_placement_rolls_back() {
        let mut doc = TextDocument::new("abc");
        // Span claims more text than the document has.
        let err = place_bands(&mut doc, 0, 8, &handle(10, 400), 20);
        assert!(err.is_err());
        assert_eq!(doc.placeholder_count(), 0);
    }

    #[test]
    fn failed_trailing_blank_rolls_back_the_bands() {
        let mut doc = TextDocument::new("abcd");
        // One band and its line break fit; the remainder blank runs past the text.
        let err = place_bands(&mut doc, 0, 6, &handle(10, 20), 20);
        assert!(matches!(err, Err(SliceError::InvalidSpan { .. })));
        assert_eq!(doc.placeholder_count(), 0);
    }

    #[test]
    fn blank_covers_the_whole_span() {
        let mut doc = TextDocument::new("abcdef");
        let id = blank(&mut doc, 1, 5).unwrap();
        let p = doc.placeholder(id).unwrap();
        assert_eq!((p.begin, p.end), (1, 5));
    }
}
