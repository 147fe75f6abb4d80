//! Reading-order reconstruction from text-block geometry.
//!
//! The raw text stream of a PDF follows the order in which the producer drew
//! the glyphs, which for two-column papers often interleaves the columns
//! line by line. This module recovers a left-to-right, top-to-bottom reading
//! order from block positions alone:
//!
//! ```text
//! blocks ──▶ sort by top ──▶ Ward clustering on left edge ──▶ columns
//!        ──▶ each column top-to-bottom ──▶ columns left-to-right ──▶ text
//! ```
//!
//! The number of columns is never given; it falls out of cutting the
//! clustering at a fixed distance. This is a heuristic: nothing checks that
//! the threshold matches the document's real gutter width, and paragraphs
//! are not stitched across pages.

use serde::{Deserialize, Serialize};

/// Default Ward-distance cut, in PDF points.
pub const DEFAULT_COLUMN_THRESHOLD: f64 = 50.0;

/// A run of text with its bounding box, `top` measured from the page top.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub text: String,
}

impl TextBlock {
    pub fn new(left: f64, top: f64, right: f64, bottom: f64, text: impl Into<String>) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
            text: text.into(),
        }
    }
}

/// Orders text blocks into reading order across an unknown number of columns.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnReconstructor {
    threshold: f64,
}

impl Default for ColumnReconstructor {
    fn default() -> Self {
        Self::new(DEFAULT_COLUMN_THRESHOLD)
    }
}

impl ColumnReconstructor {
    /// `threshold` is the largest Ward merge distance still treated as "same column".
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Reconstruct the text of a whole document.
    ///
    /// Each non-empty page is prefixed with `--- Page N ---` (N is the page's
    /// 1-based position in `pages`, so skipped empty pages still count) and
    /// pages are separated by a blank line.
    pub fn reconstruct(&self, pages: &[Vec<TextBlock>]) -> String {
        pages
            .iter()
            .enumerate()
            .filter(|(_, blocks)| !blocks.is_empty())
            .map(|(idx, blocks)| {
                let lines: Vec<&str> = self
                    .order_page(blocks)
                    .into_iter()
                    .map(|b| b.text.as_str())
                    .collect();
                format!("--- Page {} ---\n{}", idx + 1, lines.join("\n"))
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Return the blocks of one page in reading order.
    pub fn order_page<'a>(&self, blocks: &'a [TextBlock]) -> Vec<&'a TextBlock> {
        let mut sorted: Vec<&TextBlock> = blocks.iter().collect();
        sorted.sort_by(|a, b| a.top.total_cmp(&b.top));

        let lefts: Vec<f64> = sorted.iter().map(|b| b.left).collect();
        let mut columns: Vec<(f64, Vec<&TextBlock>)> = ward_clusters(&lefts, self.threshold)
            .into_iter()
            .map(|members| {
                let mean = members.iter().map(|&i| lefts[i]).sum::<f64>() / members.len() as f64;
                let mut column: Vec<&TextBlock> = members.into_iter().map(|i| sorted[i]).collect();
                column.sort_by(|a, b| a.top.total_cmp(&b.top));
                (mean, column)
            })
            .collect();

        columns.sort_by(|a, b| a.0.total_cmp(&b.0));
        columns.into_iter().flat_map(|(_, column)| column).collect()
    }
}

struct Cluster {
    members: Vec<usize>,
    sum: f64,
}

impl Cluster {
    fn mean(&self) -> f64 {
        self.sum / self.members.len() as f64
    }

    fn ward_distance(&self, other: &Cluster) -> f64 {
        let (na, nb) = (self.members.len() as f64, other.members.len() as f64);
        (2.0 * na * nb / (na + nb)).sqrt() * (self.mean() - other.mean()).abs()
    }
}

/// Agglomerative Ward clustering of 1-D points, cut at `threshold`.
///
/// Returns the member indices of each flat cluster. Ward merge heights are
/// monotone, so stopping at the first merge above the threshold yields the
/// same partition as cutting the full dendrogram.
fn ward_clusters(points: &[f64], threshold: f64) -> Vec<Vec<usize>> {
    let mut clusters: Vec<Cluster> = points
        .iter()
        .enumerate()
        .map(|(i, &x)| Cluster {
            members: vec![i],
            sum: x,
        })
        .collect();

    while clusters.len() > 1 {
        let mut best: Option<(usize, usize, f64)> = None;
        for i in 0..clusters.len() {
            for j in (i + 1)..clusters.len() {
                let d = clusters[i].ward_distance(&clusters[j]);
                if best.is_none_or(|(_, _, bd)| d < bd) {
                    best = Some((i, j, d));
                }
            }
        }

        let Some((i, j, d)) = best else { break };
        if d > threshold {
            break;
        }

        let absorbed = clusters.swap_remove(j);
        let target = &mut clusters[i];
        target.members.extend(absorbed.members);
        target.sum += absorbed.sum;
    }

    clusters.into_iter().map(|c| c.members).collect()
}
