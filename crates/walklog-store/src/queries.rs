//! Query builder for stored photos.
//!
//! The gallery lists every photo newest first, while the map overlay only
//! wants photos that carry a location. Both are expressed with
//! [`PhotoQuery`].
//!
//! # Example
//!
//! ```
//! use walklog_store::{PhotoQuery, Store};
//!
//! let store = Store::open_in_memory()?;
//!
//! let gallery = store.query_photos(&PhotoQuery::new().limit(20))?;
//! let overlay = store.query_photos(&PhotoQuery::new().located().oldest_first())?;
//! # Ok::<(), walklog_store::Error>(())
//! ```

/// Fluent query builder for photos.
///
/// By default results are ordered by capture time, newest first.
#[derive(Debug, Default, Clone)]
pub struct PhotoQuery {
    /// Only photos with a recorded location.
    pub located_only: bool,
    /// Filter on whether the photo has a remote copy.
    pub uploaded: Option<bool>,
    /// Maximum number of results.
    pub limit: Option<u32>,
    /// Offset for pagination.
    pub offset: Option<u32>,
    /// Order by capture time descending.
    pub newest_first: bool,
}

impl PhotoQuery {
    pub fn new() -> Self {
        Self {
            newest_first: true,
            ..Default::default()
        }
    }

    /// Only include photos that have a location.
    pub fn located(mut self) -> Self {
        self.located_only = true;
        self
    }

    /// Only include photos that were (or were not) uploaded.
    pub fn uploaded(mut self, uploaded: bool) -> Self {
        self.uploaded = Some(uploaded);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Chronological order, as needed for export.
    pub fn oldest_first(mut self) -> Self {
        self.newest_first = false;
        self
    }

    pub(crate) fn build_where(&self) -> String {
        let mut conditions = Vec::new();

        if self.located_only {
            conditions.push("lat IS NOT NULL AND lng IS NOT NULL");
        }

        match self.uploaded {
            Some(true) => conditions.push("storage_path IS NOT NULL"),
            Some(false) => conditions.push("storage_path IS NULL"),
            None => {}
        }

        if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        }
    }

    pub(crate) fn build_sql(&self) -> String {
        let order = if self.newest_first { "DESC" } else { "ASC" };

        let mut sql = format!(
            "SELECT id, timestamp_ms, direction, lat, lng, heading, text, data, \
             remote_url, storage_path \
             FROM photos {} ORDER BY timestamp_ms {order}, id {order}",
            self.build_where()
        );

        // SQLite only accepts OFFSET after a LIMIT
        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
            (None, None) => {}
        }

        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_query_sql() {
        let sql = PhotoQuery::new().build_sql();
        assert!(!sql.contains("WHERE"));
        assert!(sql.contains("ORDER BY timestamp_ms DESC"));
        assert!(!sql.contains("LIMIT"));
    }

    #[test]
    fn test_located_uploaded_filters() {
        let sql = PhotoQuery::new().located().uploaded(false).build_sql();
        assert!(sql.contains("lat IS NOT NULL"));
        assert!(sql.contains("storage_path IS NULL"));
        assert!(sql.contains(" AND "));
    }

    #[test]
    fn test_offset_without_limit() {
        let sql = PhotoQuery::new().offset(5).oldest_first().build_sql();
        assert!(sql.contains("ORDER BY timestamp_ms ASC"));
        assert!(sql.ends_with("LIMIT -1 OFFSET 5"));
    }
}
