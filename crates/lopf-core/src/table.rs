//! Dense (snapshot × instance) tables.
//!
//! Rows are snapshot positions into [`Network::snapshots`](crate::Network),
//! columns are component instance names. Storage is row-major.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table<T> {
    rows: Vec<usize>,
    columns: Vec<String>,
    data: Vec<T>,
}

/// Numeric table produced by the attribute resolver.
pub type DenseTable = Table<f64>;

/// Boolean table produced by the activity mask provider.
pub type BoolTable = Table<bool>;

impl<T: Clone> Table<T> {
    /// Table with every cell set to `value`.
    pub fn filled(rows: Vec<usize>, columns: Vec<String>, value: T) -> Self {
        let data = vec![value; rows.len() * columns.len()];
        Self {
            rows,
            columns,
            data,
        }
    }

    /// Table whose cells are produced by `f(row_position, column_position)`.
    pub fn from_fn(
        rows: Vec<usize>,
        columns: Vec<String>,
        mut f: impl FnMut(usize, usize) -> T,
    ) -> Self {
        let mut data = Vec::with_capacity(rows.len() * columns.len());
        for r in 0..rows.len() {
            for c in 0..columns.len() {
                data.push(f(r, c));
            }
        }
        Self {
            rows,
            columns,
            data,
        }
    }

    /// Apply `f` cell-wise, keeping the labels.
    pub fn map<U: Clone>(&self, mut f: impl FnMut(&T) -> U) -> Table<U> {
        Table {
            rows: self.rows.clone(),
            columns: self.columns.clone(),
            data: self.data.iter().map(&mut f).collect(),
        }
    }

    /// Restrict to the given column positions.
    pub fn select_columns(&self, positions: &[usize]) -> Self {
        let columns: Vec<String> = positions.iter().map(|&c| self.columns[c].clone()).collect();
        Table::from_fn(self.rows.clone(), columns, |r, c| {
            self.get(r, positions[c]).clone()
        })
    }
}

impl<T> Table<T> {
    pub fn rows(&self) -> &[usize] {
        &self.rows
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    /// (rows, columns)
    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.columns.len())
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Cell at row position `r`, column position `c`.
    #[inline]
    pub fn get(&self, r: usize, c: usize) -> &T {
        &self.data[r * self.columns.len() + c]
    }

    #[inline]
    pub fn set(&mut self, r: usize, c: usize, value: T) {
        let width = self.columns.len();
        self.data[r * width + c] = value;
    }

    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cells of one row in column order.
    pub fn row(&self, r: usize) -> &[T] {
        let width = self.columns.len();
        &self.data[r * width..(r + 1) * width]
    }

    /// Cells of one column in row order.
    pub fn column(&self, c: usize) -> impl Iterator<Item = &T> + '_ {
        let width = self.columns.len();
        self.data.iter().skip(c).step_by(width.max(1))
    }

    /// Cell lookup by column name.
    pub fn value(&self, r: usize, column: &str) -> Option<&T> {
        self.column_position(column).map(|c| self.get(r, c))
    }
}

impl DenseTable {
    /// Column-wise maximum (`-inf` for a table without rows).
    pub fn column_max(&self) -> Vec<f64> {
        (0..self.n_columns())
            .map(|c| self.column(c).copied().fold(f64::NEG_INFINITY, f64::max))
            .collect()
    }
}

impl BoolTable {
    /// Cell-wise logical AND of two equally shaped masks.
    pub fn and(&self, other: &BoolTable) -> BoolTable {
        debug_assert_eq!(self.shape(), other.shape());
        Table {
            rows: self.rows.clone(),
            columns: self.columns.clone(),
            data: self
                .data
                .iter()
                .zip(other.data.iter())
                .map(|(a, b)| *a && *b)
                .collect(),
        }
    }

    pub fn count_true(&self) -> usize {
        self.data.iter().filter(|v| **v).count()
    }
}
