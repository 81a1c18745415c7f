use sea_orm::{Database, DatabaseConnection, DbErr, Schema};

use crate::entities;

/// Connects to the configured DSN (SQLite, PostgreSQL or MySQL) and syncs
/// the gateway's tables. Inability to open the backend is a startup failure.
pub async fn connect(dsn: &str) -> Result<DatabaseConnection, DbErr> {
    let db = Database::connect(dsn).await?;
    Schema::new(db.get_database_backend())
        .builder()
        .register(entities::UsageEntries)
        .register(entities::AuditEntries)
        .sync(&db)
        .await?;
    Ok(db)
}
