use actix_web::{delete, get, post, put, web, HttpResponse, Responder};

use crate::db::TodoStore;
use crate::error::{ApiError, StoreError};
use crate::model::{NewTodo, TodoPatch};

type Store = web::Data<TodoStore>;

/// Upper bound on request bodies. Titles and descriptions have no length limit of
/// their own, so this sits far above actix's 256 KiB default.
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

pub fn configure(cfg: &mut web::ServiceConfig) {
  cfg
    .app_data(web::PayloadConfig::new(MAX_BODY_BYTES))
    .service(health)
    .service(create_todo)
    .service(list_todos)
    .service(get_todo)
    .service(update_todo)
    .service(delete_todo);
}

/// Runs a store call on the blocking pool so SQLite never stalls a worker.
async fn run<T, F>(store: &Store, op: F) -> Result<T, StoreError>
where
  F: FnOnce(&TodoStore) -> Result<T, StoreError> + Send + 'static,
  T: Send + 'static,
{
  let store = store.clone();
  web::block(move || op(&store)).await?
}

// Anything that is not an unsigned integer cannot name a stored item.
fn parse_id(raw: &str) -> Result<u64, ApiError> {
  raw.parse().map_err(|_| ApiError::NotFound)
}

#[get("/health")]
async fn health() -> impl Responder {
  HttpResponse::Ok().body("OK")
}

#[post("/todos")]
async fn create_todo(store: Store, body: web::Bytes) -> Result<HttpResponse, ApiError> {
  let new: NewTodo = serde_json::from_slice(&body)
    .map_err(|e| ApiError::InvalidInput(format!("Invalid input data: {}", e)))?;

  let todo = run(&store, move |s| s.insert(new))
    .await
    .map_err(ApiError::store("Failed to create Todo item in database."))?;
  tracing::debug!(id = todo.id, "created todo");
  Ok(HttpResponse::Created().json(todo))
}

#[get("/todos")]
async fn list_todos(store: Store) -> Result<HttpResponse, ApiError> {
  let todos = run(&store, |s| s.find_all())
    .await
    .map_err(ApiError::store("Failed to retrieve Todos from database."))?;
  Ok(HttpResponse::Ok().json(todos))
}

#[get("/todos/{id}")]
async fn get_todo(store: Store, id: web::Path<String>) -> Result<HttpResponse, ApiError> {
  let id = parse_id(&id)?;
  let todo = run(&store, move |s| s.find_by_id(id))
    .await
    .map_err(ApiError::store("Failed to retrieve Todo item from database."))?;
  Ok(HttpResponse::Ok().json(todo))
}

#[put("/todos/{id}")]
async fn update_todo(
  store: Store,
  id: web::Path<String>,
  body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
  let id = parse_id(&id)?;
  run(&store, move |s| s.find_by_id(id))
    .await
    .map_err(ApiError::store("Database error while fetching item."))?;

  let patch: TodoPatch = serde_json::from_slice(&body)
    .map_err(|_| ApiError::InvalidInput("Invalid input data.".to_string()))?;

  run(&store, move |s| s.update_fields(id, &patch))
    .await
    .map_err(ApiError::store("Failed to update Todo item in database."))?;

  // The item was just written, so losing it here is a server fault, not a 404.
  let todo = run(&store, move |s| s.find_by_id(id)).await.map_err(|source| {
    tracing::error!(id, error = %source, "todo vanished after update");
    ApiError::Storage {
      context: "Failed to reload Todo item after update.",
      source,
    }
  })?;
  Ok(HttpResponse::Ok().json(todo))
}

#[delete("/todos/{id}")]
async fn delete_todo(store: Store, id: web::Path<String>) -> Result<HttpResponse, ApiError> {
  let id = parse_id(&id)?;
  let affected = run(&store, move |s| s.soft_delete(id))
    .await
    .map_err(ApiError::store("Failed to delete Todo item from database."))?;
  if affected == 0 {
    return Err(ApiError::NotFound);
  }
  Ok(HttpResponse::NoContent().finish())
}
