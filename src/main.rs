use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod db;
mod error;
mod handler;
mod model;

use config::Config;
use db::TodoStore;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
  dotenvy::dotenv().ok();

  tracing_subscriber::registry()
    .with(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "todo_rust=info,actix_web=info".into()),
    )
    .with(tracing_subscriber::fmt::layer())
    .init();

  let config = Config::from_env()?;

  let store = TodoStore::open(&config.database_path, config.pool_size).with_context(|| {
    format!(
      "failed to open database {}",
      config.database_path.display()
    )
  })?;
  tracing::info!(path = %config.database_path.display(), "database ready");

  let store = web::Data::new(store);
  let server = HttpServer::new(move || {
    App::new()
      .app_data(store.clone())
      .wrap(middleware::Logger::default())
      .configure(handler::configure)
  })
  .bind(&config.bind_addr)
  .with_context(|| format!("failed to listen on {}", config.bind_addr))?;

  tracing::info!(addr = %config.bind_addr, "listening");
  server.run().await.context("server stopped with an error")?;
  Ok(())
}
