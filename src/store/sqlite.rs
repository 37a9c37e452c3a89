//! SQLite backend.
//!
//! A bulk load runs as one transaction of prepared `INSERT`s fed from the
//! serialized record stream, so the load commits entirely or not at all.
//! Empty fields are stored as NULL. The connection sits behind a mutex;
//! SQLite allows a single writer anyway.

use super::{CopyFormat, StoreError, StoreResult, TableStore, create_table_sql, quote_identifier};
use crate::infer::{ColumnType, TableSpec};
use rusqlite::{Connection, params_from_iter};
use std::io::Read;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

fn query_error(e: rusqlite::Error) -> StoreError {
    StoreError::Query(e.to_string())
}

/// SQLite column type for an inferred column.
pub fn sqlite_type(ty: ColumnType) -> &'static str {
    match ty {
        ColumnType::Integer => "INTEGER",
        ColumnType::Float => "REAL",
        ColumnType::Numeric => "NUMERIC",
        ColumnType::Text | ColumnType::Json => "TEXT",
    }
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path).map_err(query_error)?;
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(query_error)?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn table_exists(&self, table: &str) -> StoreResult<bool> {
        self.conn()
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| n > 0)
            .map_err(query_error)
    }

    pub fn row_count(&self, table: &str) -> StoreResult<u64> {
        let sql = format!("SELECT count(*) FROM {}", quote_identifier(table));
        self.conn()
            .query_row(&sql, [], |row| row.get::<_, i64>(0))
            .map(|n| n.max(0) as u64)
            .map_err(query_error)
    }
}

impl TableStore for SqliteStore {
    fn create_table(&self, spec: &TableSpec) -> StoreResult<()> {
        let sql = create_table_sql(spec, sqlite_type);
        match self.conn().execute(&sql, []) {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(_, Some(msg))) if msg.contains("already exists") => {
                Err(StoreError::AlreadyExists(spec.name.clone()))
            }
            Err(e) => Err(query_error(e)),
        }
    }

    fn drop_table(&self, name: &str) -> StoreResult<()> {
        let sql = format!("DROP TABLE IF EXISTS {}", quote_identifier(name));
        self.conn().execute(&sql, []).map(|_| ()).map_err(query_error)
    }

    fn bulk_load(
        &self,
        table: &str,
        columns: &[String],
        data: &mut dyn Read,
        format: &CopyFormat,
    ) -> StoreResult<u64> {
        let load_error = |message: String| StoreError::Load {
            table: table.to_string(),
            message,
        };
        let names: Vec<String> = columns.iter().map(|c| quote_identifier(c)).collect();
        let params: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_identifier(table),
            names.join(", "),
            params.join(", ")
        );

        let mut conn = self.conn();
        let tx = conn.transaction().map_err(query_error)?;
        let mut inserted = 0u64;
        {
            let mut stmt = tx.prepare(&sql).map_err(|e| load_error(e.to_string()))?;
            let mut rdr = format.reader(data);
            let mut record = csv::StringRecord::new();
            loop {
                match rdr.read_record(&mut record) {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => {
                        let message = e.to_string();
                        return Err(match e.into_kind() {
                            csv::ErrorKind::Io(io) => StoreError::Io(io),
                            _ => load_error(message),
                        });
                    }
                }
                if record.len() != columns.len() {
                    return Err(load_error(format!(
                        "row {} has {} fields, expected {}",
                        inserted + 1,
                        record.len(),
                        columns.len()
                    )));
                }
                stmt.execute(params_from_iter(record.iter().map(|f| format.field(f))))
                    .map_err(|e| load_error(e.to_string()))?;
                inserted += 1;
            }
        }
        tx.commit().map_err(query_error)?;
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infer::Column;

    fn spec() -> TableSpec {
        TableSpec::new(
            "people",
            vec![
                Column {
                    name: "id".into(),
                    source: "id".into(),
                    ty: ColumnType::Integer,
                },
                Column {
                    name: "name".into(),
                    source: "name".into(),
                    ty: ColumnType::Text,
                },
            ],
        )
    }

    #[test]
    fn create_reports_existing_table() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create_table(&spec()).unwrap();
        assert!(matches!(
            store.create_table(&spec()),
            Err(StoreError::AlreadyExists(_))
        ));
        store.drop_table("people").unwrap();
        store.drop_table("people").unwrap();
        assert!(!store.table_exists("people").unwrap());
    }

    #[test]
    fn bulk_load_inserts_and_maps_nulls() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create_table(&spec()).unwrap();
        let cols = vec!["id".to_string(), "name".to_string()];
        let n = store
            .bulk_load("people", &cols, &mut "1,Ann\n2,\n".as_bytes(), &CopyFormat::default())
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(store.row_count("people").unwrap(), 2);
        let nulls: i64 = store
            .conn()
            .query_row("SELECT count(*) FROM people WHERE name IS NULL", [], |r| r.get(0))
            .unwrap();
        assert_eq!(nulls, 1);
    }

    #[test]
    fn failed_load_rolls_back() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create_table(&spec()).unwrap();
        let cols = vec!["id".to_string(), "name".to_string()];
        let err = store
            .bulk_load("people", &cols, &mut "1,Ann\n2\n".as_bytes(), &CopyFormat::default())
            .unwrap_err();
        assert!(matches!(err, StoreError::Load { .. }));
        assert_eq!(store.row_count("people").unwrap(), 0);
    }
}
