use crate::StmtHandle;
use indexmap::IndexMap;
use std::sync::Arc;

/// Every live statement handle of a connection, lent or idle, with the query that produced it.
///
/// Iteration follows insertion order so a drain finalizes the oldest statements first.
#[derive(Debug, Default)]
pub struct StatementRegistry {
    statements: IndexMap<StmtHandle, Arc<str>>,
}

impl StatementRegistry {
    pub fn new() -> Self {
        Default::default()
    }

    /// Returns the query previously registered for the same handle, if any.
    pub fn insert(&mut self, stmt: StmtHandle, sql: Arc<str>) -> Option<Arc<str>> {
        self.statements.insert(stmt, sql)
    }

    pub fn remove(&mut self, stmt: StmtHandle) -> Option<Arc<str>> {
        self.statements.shift_remove(&stmt)
    }

    pub fn contains(&self, stmt: StmtHandle) -> bool {
        self.statements.contains_key(&stmt)
    }

    /// Oldest registered statement.
    pub fn first(&self) -> Option<(StmtHandle, Arc<str>)> {
        self.statements
            .first()
            .map(|(stmt, sql)| (*stmt, sql.clone()))
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn clear(&mut self) {
        self.statements.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::StatementRegistry;
    use crate::StmtHandle;

    fn handle(raw: usize) -> StmtHandle {
        StmtHandle::new(raw).unwrap()
    }

    #[test]
    fn drains_in_insertion_order() {
        let mut registry = StatementRegistry::new();
        registry.insert(handle(30), "SELECT 3".into());
        registry.insert(handle(10), "SELECT 1".into());
        registry.insert(handle(20), "SELECT 2".into());
        registry.remove(handle(10));
        let mut drained = Vec::new();
        while let Some((stmt, sql)) = registry.first() {
            registry.remove(stmt);
            drained.push((stmt.raw(), sql.to_string()));
        }
        assert_eq!(
            drained,
            [(30, "SELECT 3".to_string()), (20, "SELECT 2".to_string())]
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn reinsert_reports_previous_query() {
        let mut registry = StatementRegistry::new();
        assert!(registry.insert(handle(1), "SELECT 1".into()).is_none());
        let previous = registry.insert(handle(1), "SELECT 1".into());
        assert_eq!(previous.as_deref(), Some("SELECT 1"));
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(handle(1)));
        assert_eq!(registry.remove(handle(1)).as_deref(), Some("SELECT 1"));
        assert!(registry.remove(handle(1)).is_none());
    }
}
