use std::collections::HashSet;
use std::path::Path;

use chrono::{Duration, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use crate::error::StoreError;
use crate::model::{NewTodo, Todo, TodoPatch};

pub type DbPool = Pool<SqliteConnectionManager>;

/// Every column of the `todos` table with the type used when it has to be added.
const COLUMNS: &[(&str, &str)] = &[
  ("created_at", "DATETIME"),
  ("updated_at", "DATETIME"),
  ("deleted_at", "DATETIME"),
  ("title", "TEXT"),
  ("description", "TEXT"),
  ("completed", "NUMERIC"),
];

#[derive(Clone)]
pub struct TodoStore {
  pool: DbPool,
}

impl TodoStore {
  pub fn open(path: impl AsRef<Path>, pool_size: u32) -> Result<Self, StoreError> {
    let manager = SqliteConnectionManager::file(path);
    let pool = Pool::builder().max_size(pool_size).build(manager)?;
    Self::from_pool(pool)
  }

  pub fn from_pool(pool: DbPool) -> Result<Self, StoreError> {
    let conn = pool.get()?;
    migrate(&conn)?;
    Ok(TodoStore { pool })
  }

  pub fn insert(&self, new: NewTodo) -> Result<Todo, StoreError> {
    let conn = self.pool.get()?;
    let now = Utc::now();
    conn.execute(
      "INSERT INTO todos (created_at, updated_at, title, description, completed)
       VALUES (?1, ?2, ?3, ?4, ?5)",
      params![now, now, new.title, new.description, new.completed],
    )?;
    Ok(Todo {
      id: conn.last_insert_rowid() as u64,
      created_at: now,
      updated_at: now,
      title: new.title,
      description: new.description,
      completed: new.completed,
    })
  }

  pub fn find_all(&self) -> Result<Vec<Todo>, StoreError> {
    let conn = self.pool.get()?;
    let mut stmt = conn.prepare(&format!(
      "SELECT {} FROM todos WHERE deleted_at IS NULL ORDER BY id",
      Todo::COLUMNS
    ))?;
    let todos = stmt
      .query_map([], Todo::from_row)?
      .collect::<Result<Vec<_>, _>>()?;
    Ok(todos)
  }

  pub fn find_by_id(&self, id: u64) -> Result<Todo, StoreError> {
    let conn = self.pool.get()?;
    fetch(&conn, id)
  }

  /// Merges the non-zero fields of `patch` into the stored item and bumps `updated_at`.
  pub fn update_fields(&self, id: u64, patch: &TodoPatch) -> Result<(), StoreError> {
    let mut conn = self.pool.get()?;
    // Take the write lock up front; a deferred read-then-write fails with SQLITE_BUSY
    // instead of waiting when another connection is writing.
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let mut todo = fetch(&tx, id)?;
    patch.apply(&mut todo);

    // updated_at must move forward even when the clock has not ticked.
    let mut now = Utc::now();
    if now <= todo.updated_at {
      now = todo.updated_at + Duration::microseconds(1);
    }
    tx.execute(
      "UPDATE todos SET title = ?1, description = ?2, completed = ?3, updated_at = ?4
       WHERE id = ?5 AND deleted_at IS NULL",
      params![todo.title, todo.description, todo.completed, now, todo.id as i64],
    )?;
    tx.commit()?;
    Ok(())
  }

  /// Marks the item deleted. Returns the number of rows affected, 0 when no live item matched.
  pub fn soft_delete(&self, id: u64) -> Result<usize, StoreError> {
    let id = match i64::try_from(id) {
      Ok(id) => id,
      Err(_) => return Ok(0),
    };
    let conn = self.pool.get()?;
    let affected = conn.execute(
      "UPDATE todos SET deleted_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
      params![Utc::now(), id],
    )?;
    Ok(affected)
  }
}

fn fetch(conn: &Connection, id: u64) -> Result<Todo, StoreError> {
  let key = i64::try_from(id).map_err(|_| StoreError::NotFound(id))?;
  conn
    .query_row(
      &format!(
        "SELECT {} FROM todos WHERE id = ?1 AND deleted_at IS NULL",
        Todo::COLUMNS
      ),
      params![key],
      Todo::from_row,
    )
    .optional()?
    .ok_or(StoreError::NotFound(id))
}

/// Creates the `todos` table, adding any column an older file is missing.
fn migrate(conn: &Connection) -> Result<(), StoreError> {
  conn.execute(
    "CREATE TABLE IF NOT EXISTS todos (
      id          INTEGER PRIMARY KEY AUTOINCREMENT,
      created_at  DATETIME,
      updated_at  DATETIME,
      deleted_at  DATETIME,
      title       TEXT,
      description TEXT,
      completed   NUMERIC
    )",
    [],
  )?;

  let mut stmt = conn.prepare("PRAGMA table_info(todos)")?;
  let existing = stmt
    .query_map([], |row| row.get::<_, String>(1))?
    .collect::<Result<HashSet<_>, _>>()?;
  drop(stmt);
  for (name, kind) in COLUMNS {
    if !existing.contains(*name) {
      tracing::info!(column = name, "adding missing column to todos");
      conn.execute(&format!("ALTER TABLE todos ADD COLUMN {} {}", name, kind), [])?;
    }
  }

  conn.execute(
    "CREATE INDEX IF NOT EXISTS idx_todos_deleted_at ON todos (deleted_at)",
    [],
  )?;
  Ok(())
}


#[cfg(test)]
mod tests {
  use super::test_support::memory_pool;
  use super::*;
  use std::sync::Arc;
  use std::thread;

  fn store() -> TodoStore {
    TodoStore::from_pool(memory_pool()).unwrap()
  }

  fn new_todo(title: &str) -> NewTodo {
    NewTodo {
      title: title.to_string(),
      ..NewTodo::default()
    }
  }

  #[test]
  fn insert_assigns_ids_and_timestamps() {
    let store = store();
    let first = store.insert(new_todo("first")).unwrap();
    let second = store.insert(new_todo("second")).unwrap();
    assert_eq!(first.id, 1);
    assert_eq!(second.id, 2);
    assert_eq!(first.created_at, first.updated_at);
    assert!(first.created_at.timestamp() > 0);
  }

  #[test]
  fn find_by_id_round_trips_insert() {
    let store = store();
    let created = store
      .insert(NewTodo {
        title: "Buy milk".to_string(),
        description: "semi-skimmed".to_string(),
        completed: true,
      })
      .unwrap();
    assert_eq!(store.find_by_id(created.id).unwrap(), created);
  }

  #[test]
  fn find_by_id_missing_is_not_found() {
    let store = store();
    assert!(matches!(store.find_by_id(42), Err(StoreError::NotFound(42))));
    assert!(matches!(
      store.find_by_id(u64::MAX),
      Err(StoreError::NotFound(_))
    ));
  }

  #[test]
  fn soft_deleted_rows_are_hidden() {
    let store = store();
    let keep = store.insert(new_todo("keep")).unwrap();
    let gone = store.insert(new_todo("gone")).unwrap();

    assert_eq!(store.soft_delete(gone.id).unwrap(), 1);
    assert_eq!(store.soft_delete(gone.id).unwrap(), 0);
    assert!(matches!(
      store.find_by_id(gone.id),
      Err(StoreError::NotFound(_))
    ));
    assert_eq!(store.find_all().unwrap(), vec![keep]);

    let patch = TodoPatch {
      title: "back".to_string(),
      ..TodoPatch::default()
    };
    assert!(matches!(
      store.update_fields(gone.id, &patch),
      Err(StoreError::NotFound(_))
    ));
  }

  #[test]
  fn soft_delete_keeps_the_row() {
    let store = store();
    let todo = store.insert(new_todo("audit")).unwrap();
    store.soft_delete(todo.id).unwrap();
    let conn = store.pool.get().unwrap();
    let deleted: Option<String> = conn
      .query_row(
        "SELECT deleted_at FROM todos WHERE id = ?1",
        params![todo.id as i64],
        |row| row.get(0),
      )
      .unwrap();
    assert!(deleted.is_some());
  }

  #[test]
  fn update_merges_and_bumps_updated_at() {
    let store = store();
    let created = store
      .insert(NewTodo {
        title: "Buy milk".to_string(),
        description: "corner shop".to_string(),
        completed: false,
      })
      .unwrap();
    let patch = TodoPatch {
      completed: true,
      ..TodoPatch::default()
    };
    store.update_fields(created.id, &patch).unwrap();
    store.update_fields(created.id, &patch).unwrap();

    let updated = store.find_by_id(created.id).unwrap();
    assert!(updated.completed);
    assert_eq!(updated.title, "Buy milk");
    assert_eq!(updated.description, "corner shop");
    assert_eq!(updated.created_at, created.created_at);
    assert!(updated.updated_at > created.updated_at);
  }

  #[test]
  fn migrate_adds_missing_columns() {
    let pool = memory_pool();
    pool
      .get()
      .unwrap()
      .execute(
        "CREATE TABLE todos (id INTEGER PRIMARY KEY AUTOINCREMENT, title TEXT)",
        [],
      )
      .unwrap();
    let store = TodoStore::from_pool(pool).unwrap();
    let created = store.insert(new_todo("legacy")).unwrap();
    assert_eq!(store.find_by_id(created.id).unwrap().title, "legacy");
  }

  #[test]
  fn concurrent_updates_on_a_file_store_all_succeed() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(TodoStore::open(dir.path().join("todos.db"), 8).unwrap());
    let created = store.insert(new_todo("shared")).unwrap();

    let workers: Vec<_> = (0..8)
      .map(|worker| {
        let store = Arc::clone(&store);
        thread::spawn(move || {
          let mut failures = 0;
          for round in 0..50 {
            let patch = TodoPatch {
              title: format!("worker {} round {}", worker, round),
              ..TodoPatch::default()
            };
            if store.update_fields(created.id, &patch).is_err() {
              failures += 1;
            }
          }
          failures
        })
      })
      .collect();

    let failures: usize = workers.into_iter().map(|w| w.join().unwrap()).sum();
    assert_eq!(failures, 0);

    let updated = store.find_by_id(created.id).unwrap();
    assert!(updated.title.starts_with("worker "));
    assert!(updated.updated_at > created.updated_at);
  }
}
