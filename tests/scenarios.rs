#[cfg(test)]
mod tests {
    use indoc::indoc;
    use std::{collections::HashSet, thread};
    use tether::{Connection, SqliteConnection, SqliteEngine, SqliteError, Value, sqlite_error};
    use tether_tests::{Call, MockEngine, init_logs, silent_logs};

    #[test]
    fn reuse_cached_statement() {
        init_logs();
        let engine = MockEngine::new();
        let connection = Connection::memory(engine.clone());
        connection.open_default().expect("Could not open the database");
        let statement = connection.prepare("SELECT 1").expect("Could not prepare");
        let handle = statement.handle();
        statement.dispose();
        let statement = connection.prepare("SELECT 1").expect("Could not prepare");
        assert_eq!(statement.handle(), handle);
        assert_eq!(engine.prepare_count(), 1);
    }

    #[test]
    fn dispose_drains_outstanding_statement() {
        init_logs();
        let engine = MockEngine::new();
        let connection = Connection::memory(engine.clone());
        connection.open_default().expect("Could not open the database");
        let statement = connection
            .prepare("INSERT INTO t VALUES (1)")
            .expect("Could not prepare");
        let handle = statement.handle();
        connection.dispose();
        assert_eq!(engine.finalize_count(handle), 1);
        assert_eq!(connection.cached_statement_count(), 0);
        assert_eq!(connection.statement_count(), 0);
        drop(statement);
        assert_eq!(connection.cached_statement_count(), 0);
        assert_eq!(engine.finalize_count(handle), 1);
    }

    #[test]
    fn read_only_memory_is_rejected() {
        init_logs();
        let engine = MockEngine::new();
        let connection = Connection::memory(engine.clone());
        let error = connection.open_read_only().unwrap_err();
        assert!(matches!(
            sqlite_error(&error),
            Some(SqliteError::Misuse(..))
        ));
        assert!(engine.calls().is_empty());
    }

    #[test]
    fn dispose_twice() {
        init_logs();
        let engine = MockEngine::new();
        let connection = Connection::memory(engine.clone());
        connection.open_default().expect("Could not open the database");
        connection.dispose();
        thread::scope(|s| {
            s.spawn(|| connection.dispose());
        });
        connection.dispose();
        assert_eq!(engine.count(|v| matches!(v, Call::Close(..))), 1);
        for _ in 0..2 {
            thread::scope(|s| {
                s.spawn(|| {
                    assert!(!connection.is_open());
                    assert!(connection.prepare("SELECT 1").is_err());
                    assert!(connection.exec("SELECT 1").is_err());
                });
            });
        }
    }

    #[test]
    fn single_idle_statement_per_query() {
        init_logs();
        let engine = MockEngine::new();
        let connection = Connection::memory(engine.clone());
        connection.open_default().expect("Could not open the database");
        let queries = ["SELECT 1", "SELECT 2", "SELECT 3"];
        let mut lent = Vec::new();
        let mut seed = 17u32;
        for _ in 0..200 {
            seed = seed.wrapping_mul(1103515245).wrapping_add(12345);
            let sql = queries[(seed >> 16) as usize % queries.len()];
            if (seed >> 8) % 3 == 0 && !lent.is_empty() {
                let index = (seed >> 4) as usize % lent.len();
                drop(lent.swap_remove(index));
            } else {
                let mut statement = connection.prepare(sql).expect("Could not prepare");
                if seed % 2 == 0 {
                    statement.step().expect("Could not step");
                }
                lent.push(statement);
            }
            let handles: HashSet<_> = lent.iter().map(|v| v.handle()).collect();
            assert_eq!(handles.len(), lent.len(), "A handle is lent twice");
            assert!(connection.cached_statement_count() <= queries.len());
            assert_eq!(
                connection.statement_count(),
                lent.len() + connection.cached_statement_count()
            );
            assert_eq!(engine.live_statements(), connection.statement_count());
        }
        drop(lent);
        connection.dispose();
        assert_eq!(engine.live_statements(), 0);
    }

    #[test]
    fn sqlite_end_to_end() {
        init_logs();
        let connection: SqliteConnection =
            Connection::connect(SqliteEngine::new(), "sqlite://:memory:")
                .expect("Could not open the database");
        connection
            .exec(indoc! {"
                CREATE TABLE customer (
                    id INTEGER PRIMARY KEY,
                    name TEXT NOT NULL
                );
                INSERT INTO customer (name) VALUES ('Alice'), ('Bob');
            "})
            .expect("Could not create the table");
        let mut handle = None;
        for (id, name) in [(1, "Alice"), (2, "Bob")] {
            let mut select = connection
                .prepare("SELECT name FROM customer WHERE id = ?")
                .expect("Could not prepare");
            assert_eq!(*handle.get_or_insert(select.handle()), select.handle());
            select.bind(1, id).unwrap();
            assert!(select.step().unwrap());
            assert_eq!(select.column(0).unwrap(), Value::Text(name.into()));
        }
        let error = silent_logs! { connection.exec("SELECT * FROM nothing").unwrap_err() };
        assert!(matches!(
            sqlite_error(&error),
            Some(SqliteError::Engine { .. })
        ));
        let _outstanding = connection
            .prepare("INSERT INTO customer (name) VALUES (?)")
            .expect("Could not prepare");
        connection.dispose();
        assert!(connection.is_disposed());
        assert_eq!(connection.statement_count(), 0);
    }
}
