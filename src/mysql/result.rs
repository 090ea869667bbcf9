//! Row cursor over a buffered MySQL result set.

use crate::error::SqlError;
use crate::result::SqlResult;

use super::link::{FieldDef, Row, Rows};

/// Cursor over one query's rows.
///
/// Field metadata is pulled out of the reply on first access and cached for
/// the life of the cursor.
pub(crate) struct MySqlResult {
    rows: Rows,
    current: Option<Row>,
    fields: Option<Vec<FieldDef>>,
}

impl MySqlResult {
    pub(crate) fn new(rows: Rows) -> Self {
        Self {
            rows,
            current: None,
            fields: None,
        }
    }

    fn fields(&mut self) -> &[FieldDef] {
        self.fields.get_or_insert_with(|| self.rows.fields().to_vec())
    }
}

impl SqlResult for MySqlResult {
    fn next_row(&mut self) -> Result<bool, SqlError> {
        match self.rows.fetch() {
            Ok(row) => {
                let advanced = row.is_some();
                self.current = row;
                Ok(advanced)
            }
            Err(err) => {
                self.current = None;
                Err(err.into())
            }
        }
    }

    fn fields_count(&mut self) -> usize {
        self.fields().len()
    }

    fn field_name(&mut self, idx: usize) -> &str {
        &self.fields()[idx].name
    }

    fn field_value(&self, idx: usize) -> Option<&str> {
        let row = self
            .current
            .as_ref()
            .expect("field_value called with no current row");
        row[idx].as_deref()
    }

    fn current_values(&self) -> &[Option<String>] {
        self.current
            .as_ref()
            .expect("current_values called with no current row")
    }
}
