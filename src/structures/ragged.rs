//! Ragged per-image batches.
//!
//! A `RaggedBatch` stores the rows of every image back to back in one flat
//! buffer, next to an offset table with one entry per image boundary. Each
//! row has the same `width` (number of elements). Image `i` owns flat rows
//! `offsets[i]..offsets[i + 1]`; splitting and concatenation are defined only
//! through that table, so any per-image row count (including zero) works.

use crate::util::{HoiError, HoiResult};

/// Flat row-major data for a batch of images with variable row counts.
#[derive(Clone, Debug, PartialEq)]
pub struct RaggedBatch<T> {
    data: Vec<T>,
    width: usize,
    offsets: Vec<usize>,
}

impl<T> RaggedBatch<T> {
    /// Wraps a flat buffer holding `sum(counts)` rows of `width` elements.
    pub fn from_flat(data: Vec<T>, width: usize, counts: &[usize]) -> HoiResult<Self> {
        let offsets = offsets_from_counts(counts);
        let rows = offsets.last().copied().unwrap_or(0);
        let needed = rows.checked_mul(width).ok_or(HoiError::InvalidInput {
            reason: "row count overflows",
        })?;
        if needed != data.len() {
            return Err(HoiError::SplitMismatch {
                expected: needed,
                total: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            offsets,
        })
    }

    /// Concatenates per-image row blocks in batch order.
    pub fn from_parts(parts: Vec<Vec<T>>, width: usize) -> HoiResult<Self> {
        let mut counts = Vec::with_capacity(parts.len());
        for part in &parts {
            if width == 0 {
                if !part.is_empty() {
                    return Err(HoiError::InvalidInput {
                        reason: "zero-width batch with non-empty rows",
                    });
                }
                counts.push(0);
                continue;
            }
            if part.len() % width != 0 {
                return Err(HoiError::LengthMismatch {
                    what: "ragged part",
                    expected: (part.len() / width + 1) * width,
                    got: part.len(),
                });
            }
            counts.push(part.len() / width);
        }
        let data = parts.into_iter().flatten().collect();
        Self::from_flat(data, width, &counts)
    }

    /// Number of images in the batch.
    pub fn num_images(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    /// Total number of rows across all images.
    pub fn num_rows(&self) -> usize {
        self.offsets.last().copied().unwrap_or(0)
    }

    /// Number of elements per row.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Row counts per image.
    pub fn counts(&self) -> Vec<usize> {
        self.offsets.windows(2).map(|w| w[1] - w[0]).collect()
    }

    /// Offset table with `num_images() + 1` entries.
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// The flat concatenated buffer.
    pub fn flat(&self) -> &[T] {
        &self.data
    }

    /// Consumes the batch and returns the flat buffer.
    pub fn into_flat(self) -> Vec<T> {
        self.data
    }

    /// Rows of image `index` as one contiguous slice.
    pub fn image(&self, index: usize) -> Option<&[T]> {
        let start = *self.offsets.get(index)?;
        let end = *self.offsets.get(index + 1)?;
        self.data.get(start * self.width..end * self.width)
    }

    /// Iterates per-image slices in batch order.
    pub fn iter(&self) -> impl Iterator<Item = &[T]> + '_ {
        self.offsets
            .windows(2)
            .map(move |w| &self.data[w[0] * self.width..w[1] * self.width])
    }

    /// Per-image slices; together they partition `flat()` without gaps.
    pub fn split(&self) -> Vec<&[T]> {
        self.iter().collect()
    }

    /// Applies `f` elementwise, keeping the offset table.
    pub fn map<U, F>(&self, f: F) -> RaggedBatch<U>
    where
        F: FnMut(&T) -> U,
    {
        RaggedBatch {
            data: self.data.iter().map(f).collect(),
            width: self.width,
            offsets: self.offsets.clone(),
        }
    }
}

impl<T: Clone> RaggedBatch<T> {
    /// Concatenates per-image slices back into one flat buffer.
    pub fn concat(parts: &[&[T]]) -> Vec<T> {
        parts.iter().flat_map(|part| part.iter().cloned()).collect()
    }
}

fn offsets_from_counts(counts: &[usize]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(counts.len() + 1);
    let mut acc = 0usize;
    offsets.push(acc);
    for &count in counts {
        acc = acc.saturating_add(count);
        offsets.push(acc);
    }
    offsets
}
