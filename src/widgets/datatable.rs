use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Rect},
    style::{Color, Modifier, Style},
    text::Line,
    widgets::{Cell, Row, StatefulWidget, Table, Widget},
};

use crate::grid::PagedTable;

/// Cursor and scroll position inside the current page.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GridCursor {
    pub row: usize,
    pub col: usize,
    pub row_offset: usize,
    pub col_offset: usize,
    pub visible_rows: usize,
}

impl GridCursor {
    pub fn reset(&mut self) {
        *self = Self {
            visible_rows: self.visible_rows,
            ..Self::default()
        };
    }

    /// Keep the cursor inside a page of `rows` x `cols`.
    pub fn clamp(&mut self, rows: usize, cols: usize) {
        self.row = self.row.min(rows.saturating_sub(1));
        self.col = self.col.min(cols.saturating_sub(1));
        self.col_offset = self.col_offset.min(self.col);
        self.scroll_to_cursor();
    }

    pub fn select_next(&mut self, rows: usize) {
        if self.row + 1 < rows {
            self.row += 1;
        }
        self.scroll_to_cursor();
    }

    pub fn select_previous(&mut self) {
        self.row = self.row.saturating_sub(1);
        self.scroll_to_cursor();
    }

    pub fn select_right(&mut self, cols: usize) {
        if self.col + 1 < cols {
            self.col += 1;
        }
    }

    pub fn select_left(&mut self) {
        self.col = self.col.saturating_sub(1);
        self.col_offset = self.col_offset.min(self.col);
    }

    pub fn select_first_row(&mut self) {
        self.row = 0;
        self.scroll_to_cursor();
    }

    pub fn select_last_row(&mut self, rows: usize) {
        self.row = rows.saturating_sub(1);
        self.scroll_to_cursor();
    }

    fn scroll_to_cursor(&mut self) {
        if self.row < self.row_offset {
            self.row_offset = self.row;
        } else if self.visible_rows > 0 && self.row >= self.row_offset + self.visible_rows {
            self.row_offset = self.row + 1 - self.visible_rows;
        }
    }
}

pub struct DataTable<'a> {
    grid: &'a PagedTable,
    pub header_bg: Color,
    pub header_fg: Color,
    pub row_numbers_fg: Color,
    pub edited_fg: Color,
    pub row_numbers: bool,
    pub max_column_width: u16,
    pub column_spacing: u16,
}

impl<'a> DataTable<'a> {
    pub fn new(grid: &'a PagedTable) -> Self {
        Self {
            grid,
            header_bg: Color::Indexed(236),
            header_fg: Color::White,
            row_numbers_fg: Color::DarkGray,
            edited_fg: Color::Yellow,
            row_numbers: true,
            max_column_width: 30,
            column_spacing: 1,
        }
    }

    pub fn with_colors(
        mut self,
        header_bg: Color,
        header_fg: Color,
        row_numbers_fg: Color,
        edited_fg: Color,
    ) -> Self {
        self.header_bg = header_bg;
        self.header_fg = header_fg;
        self.row_numbers_fg = row_numbers_fg;
        self.edited_fg = edited_fg;
        self
    }

    pub fn with_row_numbers(mut self, enabled: bool) -> Self {
        self.row_numbers = enabled;
        self
    }

    pub fn with_max_column_width(mut self, width: u16) -> Self {
        self.max_column_width = width.max(1);
        self
    }

    fn column_width(&self, col: usize, rows: std::ops::Range<usize>) -> u16 {
        let header = self.grid.columns()[col].chars().count();
        let widest = rows
            .map(|r| self.grid.get(r, col).chars().count())
            .fold(header, usize::max);
        (widest as u16).clamp(1, self.max_column_width)
    }

    /// Columns from `col_offset` that fit in `width`, keeping the cursor column visible.
    fn visible_columns(
        &self,
        cursor: &mut GridCursor,
        width: u16,
        rows: std::ops::Range<usize>,
    ) -> Vec<(usize, u16)> {
        let cols = self.grid.column_count();
        loop {
            let mut used = 0u16;
            let mut visible = Vec::new();
            for col in cursor.col_offset..cols {
                let w = self.column_width(col, rows.clone());
                if !visible.is_empty() && used + w > width {
                    break;
                }
                visible.push((col, w.min(width.saturating_sub(used))));
                used = used.saturating_add(w + self.column_spacing);
            }
            let cursor_visible = visible.iter().any(|(c, _)| *c == cursor.col);
            if cursor_visible || cursor.col_offset >= cursor.col || visible.is_empty() {
                return visible;
            }
            cursor.col_offset += 1;
        }
    }
}

fn truncate(text: &str, width: u16) -> String {
    text.chars().take(width as usize).collect()
}

impl StatefulWidget for DataTable<'_> {
    type State = GridCursor;

    fn render(self, area: Rect, buf: &mut Buffer, cursor: &mut GridCursor) {
        cursor.visible_rows = area.height.saturating_sub(1) as usize;
        cursor.clamp(self.grid.row_count(), self.grid.column_count());

        if self.grid.column_count() == 0 {
            return;
        }

        let first = cursor.row_offset;
        let last = (first + cursor.visible_rows).min(self.grid.row_count());

        let row_num_width = if self.row_numbers {
            let max_label = self.grid.row_label(last.saturating_sub(1));
            max_label.to_string().len() as u16
        } else {
            0
        };
        let data_width = area
            .width
            .saturating_sub(row_num_width + if self.row_numbers { self.column_spacing } else { 0 });
        let columns = self.visible_columns(cursor, data_width, first..last);

        let header_style = if self.header_bg == Color::Reset {
            Style::default().fg(self.header_fg)
        } else {
            Style::default().bg(self.header_bg).fg(self.header_fg)
        };
        let row_number_style = Style::default().fg(self.row_numbers_fg);

        let mut widths = Vec::with_capacity(columns.len() + 1);
        let mut header_cells = Vec::with_capacity(columns.len() + 1);
        if self.row_numbers {
            widths.push(Constraint::Length(row_num_width));
            header_cells.push(Cell::from(""));
        }
        for (col, width) in &columns {
            widths.push(Constraint::Length(*width));
            header_cells.push(Cell::from(truncate(&self.grid.columns()[*col], *width)));
        }

        let rows: Vec<Row> = (first..last)
            .map(|r| {
                let mut cells = Vec::with_capacity(columns.len() + 1);
                if self.row_numbers {
                    let label = self.grid.row_label(r).to_string();
                    cells.push(Cell::from(Line::from(label).right_aligned()).style(row_number_style));
                }
                for (col, width) in &columns {
                    let mut style = Style::default();
                    if self.grid.is_edited(r, *col) {
                        style = style.fg(self.edited_fg);
                    }
                    if r == cursor.row && *col == cursor.col {
                        style = style.add_modifier(Modifier::REVERSED);
                    }
                    cells.push(Cell::from(truncate(self.grid.get(r, *col), *width)).style(style));
                }
                Row::new(cells)
            })
            .collect();

        Widget::render(
            Table::new(rows, widths)
                .column_spacing(self.column_spacing)
                .header(Row::new(header_cells).style(header_style)),
            area,
            buf,
        );
    }
}
