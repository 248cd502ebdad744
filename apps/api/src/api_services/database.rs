use quietgate_core::AppError;
use quietgate_infrastructure::run_migrations;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

pub async fn connect_and_migrate(database_url: &str) -> Result<PgPool, AppError> {
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(database_url)
        .await
        .map_err(|error| {
            AppError::StoreConnection(format!("failed to connect to database: {error}"))
        })?;

    run_migrations(&pool).await?;

    Ok(pool)
}
