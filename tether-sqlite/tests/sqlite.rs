#[cfg(test)]
mod tests {
    use indoc::indoc;
    use std::thread;
    use tether_core::{Connection, ResultCode, SqliteError, Value, sqlite_error};
    use tether_sqlite::SqliteEngine;
    use tether_tests::{init_logs, silent_logs};

    fn memory() -> Connection<SqliteEngine> {
        init_logs();
        let connection = Connection::memory(SqliteEngine::new());
        connection.open_default().expect("Could not open the database");
        connection
    }

    #[test]
    fn insert_and_select() {
        let connection = memory();
        connection
            .exec(indoc! {"
                CREATE TABLE trade (
                    id INTEGER PRIMARY KEY,
                    symbol TEXT NOT NULL,
                    price REAL,
                    payload BLOB
                );
            "})
            .expect("Could not create the table");
        let rows = [
            (1, "AAPL", Some(189.5), vec![1u8, 2, 3]),
            (2, "NVDA", None, vec![]),
            (3, "MSFT", Some(411.25), vec![0xFF]),
        ];
        let mut handle = None;
        for (id, symbol, price, payload) in rows.iter().cloned() {
            let mut insert = connection
                .prepare("INSERT INTO trade (id, symbol, price, payload) VALUES (?, ?, ?, ?)")
                .expect("Could not prepare the insert");
            // The same native statement serves every row
            assert_eq!(*handle.get_or_insert(insert.handle()), insert.handle());
            insert
                .bind(1, id)
                .and_then(|v| v.bind(2, symbol))
                .and_then(|v| v.bind(3, price))
                .and_then(|v| v.bind(4, payload))
                .expect("Could not bind");
            assert!(!insert.step().expect("Could not insert"));
        }
        assert_eq!(connection.cached_statement_count(), 1);
        let mut select = connection
            .prepare("SELECT id, symbol, price, payload FROM trade ORDER BY id")
            .expect("Could not prepare the select");
        assert_eq!(select.column_count().unwrap(), 4);
        let mut result = Vec::new();
        while select.step().expect("Could not step") {
            result.push(
                (0..4)
                    .map(|i| select.column(i))
                    .collect::<tether_core::Result<Vec<_>>>()
                    .expect("Could not read the row"),
            );
        }
        assert_eq!(
            result,
            [
                vec![
                    Value::Integer(1),
                    Value::Text("AAPL".into()),
                    Value::Real(189.5),
                    Value::from(vec![1u8, 2, 3]),
                ],
                vec![
                    Value::Integer(2),
                    Value::Text("NVDA".into()),
                    Value::Null,
                    Value::from(Vec::<u8>::new()),
                ],
                vec![
                    Value::Integer(3),
                    Value::Text("MSFT".into()),
                    Value::Real(411.25),
                    Value::from(vec![0xFFu8]),
                ],
            ]
        );
        assert!(select.column(9).is_err());
    }

    #[test]
    fn cached_statement_comes_back_clean() {
        let connection = memory();
        let mut statement = connection.prepare("SELECT ?").expect("Could not prepare");
        let handle = statement.handle();
        statement.bind(1, "hello").unwrap();
        assert!(statement.step().unwrap());
        assert_eq!(statement.column(0).unwrap(), Value::Text("hello".into()));
        statement.dispose();
        let mut statement = connection.prepare("SELECT ?").expect("Could not prepare");
        assert_eq!(statement.handle(), handle);
        // Reset and cleared: it runs again from the start and without the previous value
        assert!(statement.step().unwrap());
        assert_eq!(statement.column(0).unwrap(), Value::Null);
    }

    #[test]
    fn prepare_errors() {
        let connection = memory();
        let error = silent_logs! { connection.prepare("SELEC 1").unwrap_err() };
        let Some(SqliteError::Engine { code, message }) = sqlite_error(&error) else {
            panic!("Expected an engine error, got: {:#}", error);
        };
        assert_eq!(*code, ResultCode::ERROR);
        assert!(message.contains("SELEC 1"), "{}", message);
        assert!(message.contains("syntax error"), "{}", message);
        let error = silent_logs! { connection.prepare("SELECT 1; SELECT 2").unwrap_err() };
        assert_eq!(
            sqlite_error(&error).map(SqliteError::code),
            Some(ResultCode::MISUSE)
        );
        assert_eq!(connection.statement_count(), 0);
        connection
            .prepare("SELECT 1;")
            .expect("A trailing semicolon is a single statement");
    }

    #[test]
    fn exec_errors() {
        let connection = memory();
        let error = silent_logs! { connection.exec("INSERT INTO missing VALUES (1)").unwrap_err() };
        let Some(SqliteError::Engine { code, message }) = sqlite_error(&error) else {
            panic!("Expected an engine error, got: {:#}", error);
        };
        assert_eq!(*code, ResultCode::ERROR);
        assert!(message.contains("no such table: missing"), "{}", message);
        connection
            .exec("CREATE TABLE a(x); CREATE TABLE b(y);")
            .expect("exec runs multiple statements");
    }

    #[test]
    fn dispose_with_outstanding_statements() {
        let connection = memory();
        connection.exec("CREATE TABLE t(a)").unwrap();
        let mut insert = connection
            .prepare("INSERT INTO t VALUES (?)")
            .expect("Could not prepare");
        insert.bind(1, 1).unwrap();
        let idle = connection.prepare("SELECT a FROM t").unwrap();
        drop(idle);
        assert_eq!(connection.statement_count(), 2);
        connection.dispose();
        assert!(!connection.is_open());
        assert_eq!(connection.statement_count(), 0);
        assert_eq!(connection.cached_statement_count(), 0);
        assert!(matches!(
            sqlite_error(&insert.step().unwrap_err()),
            Some(SqliteError::Misuse(..))
        ));
    }

    #[test]
    fn confined_to_the_opening_thread() {
        let connection = memory();
        thread::scope(|s| {
            s.spawn(|| {
                let error = connection.prepare("SELECT 1").unwrap_err();
                assert!(matches!(
                    sqlite_error(&error),
                    Some(SqliteError::ConfinementViolated(..))
                ));
                assert!(connection.is_open());
            });
        });
        connection.prepare("SELECT 1").expect("Could not prepare");
    }
}
