use crate::StmtHandle;
use std::{collections::HashMap, sync::Arc};

/// Idle statements ready to be lent again, at most one for each query text.
///
/// A statement in use is never here: it is taken out when lent and offered back when released.
#[derive(Debug, Default)]
pub struct StatementCache {
    statements: HashMap<Arc<str>, StmtHandle>,
}

/// Outcome of [`StatementCache::offer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOffer {
    /// The statement is now the idle entry for its query.
    Cached,
    /// Another idle statement already serves the query, it was kept and the offered one must be
    /// finalized.
    Occupied(StmtHandle),
    /// The very same statement was already cached.
    Duplicate,
}

impl StatementCache {
    pub fn new() -> Self {
        Default::default()
    }

    /// Remove the idle statement of `sql` so it can be lent.
    pub fn take(&mut self, sql: &str) -> Option<StmtHandle> {
        self.statements.remove(sql)
    }

    pub fn offer(&mut self, sql: Arc<str>, stmt: StmtHandle) -> CacheOffer {
        match self.statements.insert(sql.clone(), stmt) {
            None => CacheOffer::Cached,
            Some(expunged) if expunged == stmt => CacheOffer::Duplicate,
            Some(expunged) => {
                self.statements.insert(sql, expunged);
                CacheOffer::Occupied(expunged)
            }
        }
    }

    /// Forget `stmt` only if it is the entry cached for `sql`.
    pub fn remove_if(&mut self, sql: &str, stmt: StmtHandle) -> bool {
        if self.statements.get(sql) == Some(&stmt) {
            self.statements.remove(sql);
            true
        } else {
            false
        }
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
