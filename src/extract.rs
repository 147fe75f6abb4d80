//! PDF text extraction: bytes → per-page [`TextBlock`]s via pdfium.
//!
//! pdfium reports text segments in PDF user space, where y grows upward from
//! the bottom of the page. [`TextBlock`] measures `top` from the top edge, so
//! every rectangle is flipped against the page height here and the layout
//! code never sees PDF coordinates.
//!
//! A pdfium segment is a run of text in one style, often only part of a
//! line. Column clustering needs paragraph-sized blocks, so segments are
//! grouped before they leave this module:
//!
//! ```text
//! segments ──▶ lines (shared baseline, left to right)
//!          ──▶ blocks (consecutive, overlapping lines)
//! ```
//!
//! The `pdfium-render` bindings are blocking and keep thread-local state, so
//! all work runs inside `tokio::task::spawn_blocking`.

use crate::error::ExtractionError;
use crate::layout::{ColumnReconstructor, TextBlock};
use async_trait::async_trait;
use pdfium_render::prelude::*;
use tracing::{debug, info};

const PDF_MAGIC: &[u8] = b"%PDF";

/// A horizontal gap wider than this many line heights splits a line.
const LINE_GAP_FACTOR: f64 = 1.0;

/// A vertical gap wider than this many line heights starts a new block.
const BLOCK_GAP_FACTOR: f64 = 1.0;

/// Turns PDF bytes into positioned text blocks, one `Vec` per page.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract_blocks(&self, pdf: &[u8]) -> Result<Vec<Vec<TextBlock>>, ExtractionError>;
}

/// [`TextExtractor`] backed by the pdfium library found on the system.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfiumExtractor;

#[async_trait]
impl TextExtractor for PdfiumExtractor {
    async fn extract_blocks(&self, pdf: &[u8]) -> Result<Vec<Vec<TextBlock>>, ExtractionError> {
        check_magic(pdf)?;
        let bytes = pdf.to_vec();
        tokio::task::spawn_blocking(move || extract_blocks_blocking(&bytes))
            .await
            .map_err(|e| ExtractionError::Internal(format!("Extraction task panicked: {}", e)))?
    }
}

fn check_magic(pdf: &[u8]) -> Result<(), ExtractionError> {
    // Some generators emit a few junk bytes before the header; pdfium accepts
    // those, so only the first kilobyte is searched.
    let head = &pdf[..pdf.len().min(1024)];
    if head.windows(PDF_MAGIC.len()).any(|w| w == PDF_MAGIC) {
        Ok(())
    } else {
        Err(ExtractionError::NotAPdf {
            magic: pdf.iter().take(8).copied().collect(),
        })
    }
}

fn extract_blocks_blocking(pdf: &[u8]) -> Result<Vec<Vec<TextBlock>>, ExtractionError> {
    let pdfium = Pdfium::default();

    let document = pdfium.load_pdf_from_byte_slice(pdf, None).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            ExtractionError::PasswordProtected
        } else {
            ExtractionError::Corrupt { detail: err_str }
        }
    })?;

    let pages = document.pages();
    info!("PDF loaded: {} pages", pages.len());

    let mut result = Vec::with_capacity(pages.len() as usize);
    for (idx, page) in pages.iter().enumerate() {
        let height = f64::from(page.height().value);
        let text = page.text().map_err(|e| ExtractionError::Corrupt {
            detail: format!("page {}: {:?}", idx + 1, e),
        })?;

        let segments: Vec<TextBlock> = text
            .segments()
            .iter()
            .filter_map(|segment| {
                let content = segment.text();
                if content.trim().is_empty() {
                    return None;
                }
                let rect = segment.bounds();
                Some(TextBlock::new(
                    f64::from(rect.left().value),
                    height - f64::from(rect.top().value),
                    f64::from(rect.right().value),
                    height - f64::from(rect.bottom().value),
                    content.trim(),
                ))
            })
            .collect();

        let segment_count = segments.len();
        let blocks = group_lines_into_blocks(group_segments_into_lines(segments));
        debug!(
            "Page {}: {} segments grouped into {} blocks",
            idx + 1,
            segment_count,
            blocks.len()
        );
        result.push(blocks);
    }

    Ok(result)
}

fn line_height(block: &TextBlock) -> f64 {
    (block.bottom - block.top).max(1.0)
}

fn vertical_centre(block: &TextBlock) -> f64 {
    (block.top + block.bottom) / 2.0
}

/// Union of the boxes, texts joined with `sep`. `parts` must not be empty.
fn merge(parts: Vec<TextBlock>, sep: &str) -> TextBlock {
    let mut merged = TextBlock::new(
        f64::INFINITY,
        f64::INFINITY,
        f64::NEG_INFINITY,
        f64::NEG_INFINITY,
        String::new(),
    );
    let mut texts = Vec::with_capacity(parts.len());
    for part in parts {
        merged.left = merged.left.min(part.left);
        merged.top = merged.top.min(part.top);
        merged.right = merged.right.max(part.right);
        merged.bottom = merged.bottom.max(part.bottom);
        texts.push(part.text);
    }
    merged.text = texts.join(sep);
    merged
}

/// Merge text segments that share a baseline into lines.
///
/// Segments whose vertical centres are within half a line height belong to
/// the same row; a row is read left to right and joined with spaces. A gap
/// wider than [`LINE_GAP_FACTOR`] line heights splits the row, so lines of
/// neighbouring columns stay apart.
pub(crate) fn group_segments_into_lines(mut segments: Vec<TextBlock>) -> Vec<TextBlock> {
    segments.sort_by(|a, b| {
        vertical_centre(a)
            .total_cmp(&vertical_centre(b))
            .then(a.left.total_cmp(&b.left))
    });

    let mut rows: Vec<Vec<TextBlock>> = Vec::new();
    for segment in segments {
        let same_row = rows.last().and_then(|row| row.last()).is_some_and(|prev| {
            let tolerance = 0.5 * line_height(prev).min(line_height(&segment));
            (vertical_centre(prev) - vertical_centre(&segment)).abs() <= tolerance
        });
        if same_row {
            if let Some(row) = rows.last_mut() {
                row.push(segment);
                continue;
            }
        }
        rows.push(vec![segment]);
    }

    let mut lines = Vec::new();
    for mut row in rows {
        row.sort_by(|a, b| a.left.total_cmp(&b.left));
        let mut current: Vec<TextBlock> = Vec::new();
        let mut right = f64::NEG_INFINITY;
        for segment in row {
            let gap = segment.left - right;
            if !current.is_empty() && gap > LINE_GAP_FACTOR * line_height(&segment) {
                lines.push(merge(std::mem::take(&mut current), " "));
            }
            right = if current.is_empty() {
                segment.right
            } else {
                right.max(segment.right)
            };
            current.push(segment);
        }
        if !current.is_empty() {
            lines.push(merge(current, " "));
        }
    }
    lines
}

/// Merge consecutive lines into paragraph blocks.
///
/// A line joins the most recent block whose last line ends at most
/// [`BLOCK_GAP_FACTOR`] line heights above it and overlaps it horizontally.
/// Lines of a block are joined with `\n`.
pub(crate) fn group_lines_into_blocks(mut lines: Vec<TextBlock>) -> Vec<TextBlock> {
    lines.sort_by(|a, b| a.top.total_cmp(&b.top).then(a.left.total_cmp(&b.left)));

    let mut blocks: Vec<Vec<TextBlock>> = Vec::new();
    for line in lines {
        let open = blocks.iter().rposition(|block| {
            block.last().is_some_and(|last| {
                let gap = line.top - last.bottom;
                gap <= BLOCK_GAP_FACTOR * line_height(last)
                    && line.left < last.right
                    && line.right > last.left
            })
        });
        match open {
            Some(i) => blocks[i].push(line),
            None => blocks.push(vec![line]),
        }
    }

    blocks.into_iter().map(|lines| merge(lines, "\n")).collect()
}

/// Extract `pdf` and put its text into reading order.
pub async fn extract_text<E: TextExtractor + ?Sized>(
    extractor: &E,
    reconstructor: &ColumnReconstructor,
    pdf: &[u8],
) -> Result<String, ExtractionError> {
    let pages = extractor.extract_blocks(pdf).await?;
    Ok(reconstructor.reconstruct(&pages))
}
