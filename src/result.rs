//! Query result cursor and the degenerate results shared by all drivers.

use crate::error::SqlError;

/// Cursor over the rows returned by one query.
///
/// Handed to the `query` callback and valid only for the duration of that
/// callback. [`SqlResult::next_row`] must succeed before any value accessor
/// is touched; reading values with no current row is a caller bug and
/// panics.
pub trait SqlResult {
    /// Advance to the next row.
    ///
    /// Returns `Ok(true)` when a row is available and `Ok(false)` at the end
    /// of the result; once ended, every further call keeps returning
    /// `Ok(false)`. A result stream that broke mid-way returns `Err` instead
    /// of ending, and keeps returning the same error.
    fn next_row(&mut self) -> Result<bool, SqlError>;

    /// Number of fields per row.
    fn fields_count(&mut self) -> usize;

    /// Name of the field at `idx`. Panics if `idx` is out of range.
    fn field_name(&mut self, idx: usize) -> &str;

    /// Find a field index by name. An unknown name is not an error.
    fn find_field(&mut self, name: &str) -> Option<usize> {
        (0..self.fields_count()).find(|&idx| self.field_name(idx) == name)
    }

    /// Value of field `idx` in the current row, `None` for SQL NULL.
    fn field_value(&self, idx: usize) -> Option<&str>;

    /// Value of the named field in the current row. `None` for SQL NULL and
    /// for a name no field carries.
    fn find_field_value(&mut self, name: &str) -> Option<&str> {
        let idx = self.find_field(name)?;
        self.field_value(idx)
    }

    /// All values of the current row, in field order.
    fn current_values(&self) -> &[Option<String>];
}

/// Result standing in for a query that failed outright.
///
/// There are no fields and no rows; `next_row` reports the stored error on
/// every call.
pub struct ErrorResult {
    error: SqlError,
}

impl ErrorResult {
    pub fn new(error: SqlError) -> Self {
        Self { error }
    }

    /// The error that produced this result.
    pub fn error(&self) -> &SqlError {
        &self.error
    }
}

impl SqlResult for ErrorResult {
    fn next_row(&mut self) -> Result<bool, SqlError> {
        Err(self.error.clone())
    }

    fn fields_count(&mut self) -> usize {
        0
    }

    fn field_name(&mut self, idx: usize) -> &str {
        panic!("field {idx} out of range for a failed result");
    }

    fn field_value(&self, _idx: usize) -> Option<&str> {
        panic!("no current row in a failed result");
    }

    fn current_values(&self) -> &[Option<String>] {
        panic!("no current row in a failed result");
    }
}

/// Result standing in for a query that never reached a server.
pub struct NotConnectedResult;

impl SqlResult for NotConnectedResult {
    fn next_row(&mut self) -> Result<bool, SqlError> {
        Err(SqlError::NotConnected)
    }

    fn fields_count(&mut self) -> usize {
        0
    }

    fn field_name(&mut self, idx: usize) -> &str {
        panic!("field {idx} out of range for a not-connected result");
    }

    fn field_value(&self, _idx: usize) -> Option<&str> {
        panic!("no current row in a not-connected result");
    }

    fn current_values(&self) -> &[Option<String>] {
        panic!("no current row in a not-connected result");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_result_repeats_error() {
        let mut result = ErrorResult::new(SqlError::Server {
            code: 1064,
            message: "syntax error".into(),
        });

        for _ in 0..3 {
            let err = result.next_row().unwrap_err();
            assert_eq!(err, SqlError::Server {
                code: 1064,
                message: "syntax error".into(),
            });
        }
        assert_eq!(result.fields_count(), 0);
        assert_eq!(result.find_field("anything"), None);
    }

    #[test]
    fn test_not_connected_result() {
        let mut result = NotConnectedResult;

        assert_eq!(result.next_row().unwrap_err(), SqlError::NotConnected);
        assert_eq!(result.next_row().unwrap_err(), SqlError::NotConnected);
        assert_eq!(result.fields_count(), 0);
    }

    #[test]
    #[should_panic(expected = "no current row")]
    fn test_error_result_value_access_panics() {
        let result = ErrorResult::new(SqlError::NotConnected);
        let _ = result.field_value(0);
    }
}
