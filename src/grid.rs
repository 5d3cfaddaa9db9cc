//! Paged, editable view over one table with bounded undo/redo.

use crate::store::{CellUpdate, Page, Store};
use color_eyre::Result;
use std::collections::VecDeque;
use std::sync::Arc;

pub const DEFAULT_PAGE_SIZE: usize = 1000;
pub const DEFAULT_UNDO_LIMIT: usize = 10;

pub struct PagedTable {
    store: Arc<Store>,
    table: String,
    page_size: usize,
    undo_limit: usize,
    page_index: usize,
    total_rows: usize,
    page: Page,
    /// Page as last read from (or written to) the store.
    baseline: Page,
    undo: VecDeque<Page>,
    redo: VecDeque<Page>,
}

impl PagedTable {
    /// Count the table's rows and load its first page.
    pub fn open(
        store: Arc<Store>,
        table: &str,
        page_size: usize,
        undo_limit: usize,
    ) -> Result<Self> {
        let mut grid = Self {
            store,
            table: table.trim().to_string(),
            page_size: page_size.max(1),
            undo_limit,
            page_index: 0,
            total_rows: 0,
            page: Page::default(),
            baseline: Page::default(),
            undo: VecDeque::new(),
            redo: VecDeque::new(),
        };
        grid.load_page(0)?;
        Ok(grid)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn page_index(&self) -> usize {
        self.page_index
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn total_rows(&self) -> usize {
        self.total_rows
    }

    pub fn row_count(&self) -> usize {
        self.page.row_count()
    }

    pub fn column_count(&self) -> usize {
        self.page.column_count()
    }

    pub fn columns(&self) -> &[String] {
        &self.page.columns
    }

    /// Index of the last page; 0 for an empty table.
    pub fn max_page(&self) -> usize {
        self.total_rows.saturating_sub(1) / self.page_size
    }

    /// Absolute 1-based row number shown in the row header.
    pub fn row_label(&self, row: usize) -> usize {
        row + 1 + self.page_index * self.page_size
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo.len()
    }

    /// Reload page `index` (clamped) from the store. In-memory edits and history are dropped.
    pub fn load_page(&mut self, index: usize) -> Result<()> {
        self.total_rows = self.store.table_count(&self.table)?;
        self.page_index = index.min(self.max_page());
        let page = self
            .store
            .page(&self.table, self.page_index * self.page_size, self.page_size)?;
        self.baseline = page.clone();
        self.page = page;
        self.undo.clear();
        self.redo.clear();
        tracing::debug!(
            table = %self.table,
            page = self.page_index,
            rows = self.page.row_count(),
            "loaded page"
        );
        Ok(())
    }

    pub fn refresh(&mut self) -> Result<()> {
        self.load_page(self.page_index)
    }

    /// Move forward one page. Returns false when already on the last page.
    pub fn next_page(&mut self) -> Result<bool> {
        if self.page_index >= self.max_page() {
            return Ok(false);
        }
        self.load_page(self.page_index + 1)?;
        Ok(true)
    }

    pub fn prev_page(&mut self) -> Result<bool> {
        if self.page_index == 0 {
            return Ok(false);
        }
        self.load_page(self.page_index - 1)?;
        Ok(true)
    }

    /// Cell text; NULL and out-of-range cells read as "".
    pub fn get(&self, row: usize, col: usize) -> &str {
        self.page.cell(row, col).unwrap_or("")
    }

    /// Edit one cell. Empty text stores NULL. Out-of-range cells are rejected.
    pub fn set(&mut self, row: usize, col: usize, value: &str) -> bool {
        if row >= self.page.row_count() || col >= self.page.column_count() {
            return false;
        }
        let value = if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        };
        if self.page.rows[row][col] == value {
            return false;
        }
        Self::push_bounded(&mut self.undo, self.page.clone(), self.undo_limit);
        self.page.rows[row][col] = value;
        self.redo.clear();
        true
    }

    pub fn undo(&mut self) -> bool {
        match self.undo.pop_back() {
            Some(previous) => {
                let current = std::mem::replace(&mut self.page, previous);
                Self::push_bounded(&mut self.redo, current, self.undo_limit);
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        match self.redo.pop_back() {
            Some(next) => {
                let current = std::mem::replace(&mut self.page, next);
                Self::push_bounded(&mut self.undo, current, self.undo_limit);
                true
            }
            None => false,
        }
    }

    fn push_bounded(stack: &mut VecDeque<Page>, page: Page, limit: usize) {
        if limit == 0 {
            return;
        }
        stack.push_back(page);
        while stack.len() > limit {
            stack.pop_front();
        }
    }

    /// Cells that differ from the page as loaded.
    pub fn pending_edits(&self) -> Vec<CellUpdate> {
        let mut edits = Vec::new();
        for (r, (row, base)) in self.page.rows.iter().zip(&self.baseline.rows).enumerate() {
            for (c, (cell, base_cell)) in row.iter().zip(base).enumerate() {
                if cell != base_cell {
                    edits.push(CellUpdate {
                        rowid: self.page.rowids[r],
                        column: self.page.columns[c].clone(),
                        value: cell.clone(),
                    });
                }
            }
        }
        edits
    }

    pub fn has_unsaved_edits(&self) -> bool {
        self.page != self.baseline
    }

    /// Whether the cell differs from the stored value.
    pub fn is_edited(&self, row: usize, col: usize) -> bool {
        self.page.cell(row, col) != self.baseline.cell(row, col)
    }

    /// Accept the current page as stored, after its edits were written elsewhere.
    pub fn mark_saved(&mut self) {
        self.baseline = self.page.clone();
    }

    /// Write pending edits to the store and make the current page the new baseline.
    pub fn save(&mut self) -> Result<usize> {
        let edits = self.pending_edits();
        let written = self.store.update_cells(&self.table, &edits)?;
        self.baseline = self.page.clone();
        Ok(written)
    }
}
