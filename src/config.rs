use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("{name} must be a positive integer, got {value:?}")]
  InvalidNumber { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
  pub database_path: PathBuf,
  pub bind_addr: String,
  pub pool_size: u32,
}

impl Config {
  pub fn from_env() -> Result<Config, ConfigError> {
    Self::from_lookup(|name| std::env::var(name).ok())
  }

  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Config, ConfigError> {
    let database_path = lookup("TODO_DATABASE_PATH").unwrap_or_else(|| "todos.db".to_string());
    let bind_addr = lookup("TODO_BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string());
    let pool_size = match lookup("TODO_POOL_SIZE") {
      None => 4,
      Some(value) => match value.trim().parse::<u32>() {
        Ok(size) if size > 0 => size,
        _ => {
          return Err(ConfigError::InvalidNumber {
            name: "TODO_POOL_SIZE",
            value,
          })
        }
      },
    };

    Ok(Config {
      database_path: PathBuf::from(database_path),
      bind_addr,
      pool_size,
    })
  }
}
