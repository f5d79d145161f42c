use actix_web::{error::BlockingError, http::StatusCode, HttpResponse, ResponseError};

use crate::model::ErrorRes;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  #[error("todo {0} not found")]
  NotFound(u64),
  #[error("connection pool error: {0}")]
  Pool(#[from] r2d2::Error),
  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),
  #[error("blocking worker failed: {0}")]
  Worker(#[from] BlockingError),
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
  #[error("{0}")]
  InvalidInput(String),
  #[error("Todo item not found.")]
  NotFound,
  #[error("{context}")]
  Storage {
    context: &'static str,
    #[source]
    source: StoreError,
  },
}

impl ApiError {
  /// Maps a gateway failure, logging the cause; the client only sees `context`.
  pub fn store(context: &'static str) -> impl FnOnce(StoreError) -> ApiError {
    move |err| match err {
      StoreError::NotFound(_) => ApiError::NotFound,
      source => {
        tracing::error!(error = %source, "{}", context);
        ApiError::Storage { context, source }
      }
    }
  }
}

impl ResponseError for ApiError {
  fn status_code(&self) -> StatusCode {
    match self {
      ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
      ApiError::NotFound => StatusCode::NOT_FOUND,
      ApiError::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  fn error_response(&self) -> HttpResponse {
    HttpResponse::build(self.status_code()).json(ErrorRes {
      error: self.to_string(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn not_found_from_store_becomes_404() {
    let err = ApiError::store("unused")(StoreError::NotFound(3));
    assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(err.to_string(), "Todo item not found.");
  }

  #[test]
  fn storage_failure_hides_cause() {
    let cause = StoreError::Sqlite(rusqlite::Error::InvalidQuery);
    let err = ApiError::store("Failed to retrieve Todos from database.")(cause);
    assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(err.to_string(), "Failed to retrieve Todos from database.");
  }
}
