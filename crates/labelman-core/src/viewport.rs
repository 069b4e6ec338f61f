//! Windowed grid presentation over the canonical item list.
//!
//! Only rows intersecting the scroll window (plus overscan) produce cells.
//! Cell lookups past the end of the list yield nothing rather than an error.

use std::ops::Range;

/// A grid cell currently inside the render window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub row: usize,
    pub column: usize,
    pub index: usize,
}

/// Pointer activations the grid distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Single,
    Double,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Viewport {
    column_count: usize,
    row_height: f32,
    height: f32,
    scroll_offset: f32,
    overscan_rows: usize,
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(4)
    }
}

impl Viewport {
    /// A grid with `column_count` columns (at least one).
    pub fn new(column_count: usize) -> Self {
        Self {
            column_count: column_count.max(1),
            row_height: 220.0,
            height: 880.0,
            scroll_offset: 0.0,
            overscan_rows: 2,
        }
    }

    pub fn with_geometry(mut self, row_height: f32, height: f32) -> Self {
        self.row_height = row_height.max(1.0);
        self.height = height.max(0.0);
        self
    }

    pub fn with_overscan(mut self, rows: usize) -> Self {
        self.overscan_rows = rows;
        self
    }

    pub fn column_count(&self) -> usize {
        self.column_count
    }

    pub fn set_column_count(&mut self, column_count: usize) {
        self.column_count = column_count.max(1);
    }

    pub fn scroll_offset(&self) -> f32 {
        self.scroll_offset
    }

    pub fn scroll_to(&mut self, offset: f32) {
        self.scroll_offset = offset.max(0.0);
    }

    pub fn resize(&mut self, height: f32) {
        self.height = height.max(0.0);
    }

    /// `row * columns + column`, or `None` if that overflows.
    pub fn linear_index(&self, row: usize, column: usize) -> Option<usize> {
        row.checked_mul(self.column_count)?.checked_add(column)
    }

    pub fn row_count(&self, len: usize) -> usize {
        len.div_ceil(self.column_count)
    }

    /// Total scrollable height for `len` items.
    pub fn content_height(&self, len: usize) -> f32 {
        self.row_count(len) as f32 * self.row_height
    }

    /// Rows to render for a list of `len` items, overscan included.
    pub fn visible_rows(&self, len: usize) -> Range<usize> {
        let rows = self.row_count(len);
        if rows == 0 {
            return 0..0;
        }
        let first = (self.scroll_offset / self.row_height).floor() as usize;
        let last = ((self.scroll_offset + self.height) / self.row_height).ceil() as usize;
        let start = first.saturating_sub(self.overscan_rows).min(rows);
        let end = last.saturating_add(self.overscan_rows).min(rows);
        start..end.max(start)
    }

    /// The item at `(row, column)`, or `None` past the end of the list or
    /// outside the grid's columns.
    pub fn cell<'a, T>(&self, items: &'a [T], row: usize, column: usize) -> Option<&'a T> {
        if column >= self.column_count {
            return None;
        }
        items.get(self.linear_index(row, column)?)
    }

    /// Cells inside the render window, row-major.
    pub fn visible_cells(&self, len: usize) -> Vec<Cell> {
        self.visible_rows(len)
            .flat_map(|row| {
                (0..self.column_count).map(move |column| (row, column))
            })
            .filter_map(|(row, column)| {
                let index = self.linear_index(row, column)?;
                Some(Cell { row, column, index })
            })
            .filter(|c| c.index < len)
            .collect()
    }

    /// Scrolls the minimum distance needed to bring `index` into view.
    pub fn scroll_into_view(&mut self, index: usize) {
        let row = index / self.column_count;
        let top = row as f32 * self.row_height;
        let bottom = top + self.row_height;
        if top < self.scroll_offset {
            self.scroll_offset = top;
        } else if bottom > self.scroll_offset + self.height {
            self.scroll_offset = (bottom - self.height).max(0.0);
        }
    }
}
