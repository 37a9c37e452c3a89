//! In-process store.
//!
//! Tables live in a mutex-guarded map. A bulk load stages every row locally
//! and appends them in one step at the end, so a failed load leaves the
//! table untouched. Failures can be injected per table to exercise the
//! loader's cleanup paths.

use super::{CopyFormat, StoreError, StoreResult, TableStore};
use crate::infer::TableSpec;
use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A stored row; `None` is NULL.
pub type Row = Vec<Option<String>>;

#[derive(Debug)]
struct MemTable {
    spec: TableSpec,
    rows: Vec<Row>,
}

#[derive(Debug, Default)]
struct Faults {
    create: HashSet<String>,
    drop: HashSet<String>,
    load_after: HashMap<String, usize>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, MemTable>>,
    faults: Mutex<Faults>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `create_table` fail for `table`.
    pub fn fail_create(&self, table: &str) {
        lock(&self.faults).create.insert(table.to_string());
    }

    /// Make `drop_table` fail for `table`.
    pub fn fail_drop(&self, table: &str) {
        lock(&self.faults).drop.insert(table.to_string());
    }

    /// Make a bulk load into `table` fail once `rows` rows have been read.
    pub fn fail_load_after(&self, table: &str, rows: usize) {
        lock(&self.faults).load_after.insert(table.to_string(), rows);
    }

    pub fn table_exists(&self, table: &str) -> bool {
        lock(&self.tables).contains_key(table)
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<_> = lock(&self.tables).keys().cloned().collect();
        names.sort();
        names
    }

    pub fn spec(&self, table: &str) -> Option<TableSpec> {
        lock(&self.tables).get(table).map(|t| t.spec.clone())
    }

    pub fn row_count(&self, table: &str) -> Option<usize> {
        lock(&self.tables).get(table).map(|t| t.rows.len())
    }

    pub fn rows(&self, table: &str) -> Option<Vec<Row>> {
        lock(&self.tables).get(table).map(|t| t.rows.clone())
    }

    fn positions(&self, table: &str, columns: &[String]) -> StoreResult<(Vec<usize>, usize)> {
        let tables = lock(&self.tables);
        let t = tables
            .get(table)
            .ok_or_else(|| StoreError::NotFound(table.to_string()))?;
        let positions = columns
            .iter()
            .map(|c| {
                t.spec
                    .columns
                    .iter()
                    .position(|col| col.name == *c)
                    .ok_or_else(|| StoreError::Load {
                        table: table.to_string(),
                        message: format!("unknown column '{c}'"),
                    })
            })
            .collect::<StoreResult<Vec<_>>>()?;
        Ok((positions, t.spec.columns.len()))
    }
}

impl TableStore for MemoryStore {
    fn create_table(&self, spec: &TableSpec) -> StoreResult<()> {
        if lock(&self.faults).create.contains(&spec.name) {
            return Err(StoreError::Query(format!("cannot create '{}'", spec.name)));
        }
        let mut tables = lock(&self.tables);
        if tables.contains_key(&spec.name) {
            return Err(StoreError::AlreadyExists(spec.name.clone()));
        }
        tables.insert(
            spec.name.clone(),
            MemTable {
                spec: spec.clone(),
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    fn drop_table(&self, name: &str) -> StoreResult<()> {
        if lock(&self.faults).drop.contains(name) {
            return Err(StoreError::Query(format!("cannot drop '{name}'")));
        }
        lock(&self.tables).remove(name);
        Ok(())
    }

    fn bulk_load(
        &self,
        table: &str,
        columns: &[String],
        data: &mut dyn Read,
        format: &CopyFormat,
    ) -> StoreResult<u64> {
        let (positions, width) = self.positions(table, columns)?;
        let fail_after = lock(&self.faults).load_after.get(table).copied();
        let load_error = |message: String| StoreError::Load {
            table: table.to_string(),
            message,
        };

        let mut rdr = format.reader(data);
        let mut record = csv::StringRecord::new();
        let mut staged: Vec<Row> = Vec::new();
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
            if fail_after == Some(staged.len()) {
                return Err(load_error(format!("injected failure after {} rows", staged.len())));
            }
            if record.len() != positions.len() {
                return Err(load_error(format!(
                    "row {} has {} fields, expected {}",
                    staged.len() + 1,
                    record.len(),
                    positions.len()
                )));
            }
            let mut row = vec![None; width];
            for (&pos, field) in positions.iter().zip(record.iter()) {
                row[pos] = format.field(field).map(str::to_string);
            }
            staged.push(row);
        }

        let mut tables = lock(&self.tables);
        let t = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::NotFound(table.to_string()))?;
        let n = staged.len() as u64;
        t.rows.append(&mut staged);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infer::{Column, ColumnType};

    fn spec() -> TableSpec {
        TableSpec::new(
            "t",
            ["a", "b"]
                .iter()
                .map(|c| Column {
                    name: c.to_string(),
                    source: c.to_string(),
                    ty: ColumnType::Text,
                })
                .collect(),
        )
    }

    fn cols() -> Vec<String> {
        vec!["a".into(), "b".into()]
    }

    #[test]
    fn create_is_exclusive() {
        let store = MemoryStore::new();
        store.create_table(&spec()).unwrap();
        assert!(matches!(
            store.create_table(&spec()),
            Err(StoreError::AlreadyExists(name)) if name == "t"
        ));
        store.drop_table("t").unwrap();
        store.drop_table("t").unwrap();
        assert!(!store.table_exists("t"));
    }

    #[test]
    fn load_maps_empty_fields_to_null() {
        let store = MemoryStore::new();
        store.create_table(&spec()).unwrap();
        let n = store
            .bulk_load("t", &cols(), &mut "1,x\n2,\n".as_bytes(), &CopyFormat::default())
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(
            store.rows("t").unwrap(),
            vec![
                vec![Some("1".to_string()), Some("x".to_string())],
                vec![Some("2".to_string()), None],
            ]
        );
    }

    #[test]
    fn failed_load_commits_nothing() {
        let store = MemoryStore::new();
        store.create_table(&spec()).unwrap();
        store.fail_load_after("t", 1);
        let err = store
            .bulk_load("t", &cols(), &mut "1,x\n2,y\n".as_bytes(), &CopyFormat::default())
            .unwrap_err();
        assert!(matches!(err, StoreError::Load { .. }));
        assert_eq!(store.row_count("t"), Some(0));
    }

    #[test]
    fn load_into_missing_table_fails() {
        let store = MemoryStore::new();
        let err = store
            .bulk_load("nope", &cols(), &mut "".as_bytes(), &CopyFormat::default())
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
