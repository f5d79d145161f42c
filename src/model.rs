use chrono::prelude::{DateTime, Utc};
use rusqlite::Row;
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Todo {
  pub id: u64,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  pub title: String,
  pub description: String,
  pub completed: bool,
}

impl Todo {
  /// Columns read by [`Todo::from_row`], in order.
  pub const COLUMNS: &'static str = "id, created_at, updated_at, title, description, completed";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Todo> {
    let id: i64 = row.get(0)?;
    Ok(Todo {
      id: id as u64,
      created_at: row.get::<_, Option<DateTime<Utc>>>(1)?.unwrap_or_default(),
      updated_at: row.get::<_, Option<DateTime<Utc>>>(2)?.unwrap_or_default(),
      title: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
      description: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
      completed: row.get::<_, Option<bool>>(5)?.unwrap_or(false),
    })
  }
}

/// An explicit JSON `null` reads as the field's zero value.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
  D: Deserializer<'de>,
  T: Default + Deserialize<'de>,
{
  Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Body of a create request. Server-owned fields sent by the client are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NewTodo {
  #[serde(deserialize_with = "null_as_default")]
  pub title: String,
  #[serde(deserialize_with = "null_as_default")]
  pub description: String,
  #[serde(deserialize_with = "null_as_default")]
  pub completed: bool,
}

/// Body of an update request.
///
/// Only non-zero fields are merged into the stored item, so an empty string or
/// `false` leaves the current value in place.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TodoPatch {
  #[serde(deserialize_with = "null_as_default")]
  pub title: String,
  #[serde(deserialize_with = "null_as_default")]
  pub description: String,
  #[serde(deserialize_with = "null_as_default")]
  pub completed: bool,
}

impl TodoPatch {
  pub fn apply(&self, todo: &mut Todo) {
    if !self.title.is_empty() {
      todo.title = self.title.clone();
    }
    if !self.description.is_empty() {
      todo.description = self.description.clone();
    }
    if self.completed {
      todo.completed = true;
    }
  }
}

#[derive(Serialize)]
pub struct ErrorRes {
  pub error: String,
}
