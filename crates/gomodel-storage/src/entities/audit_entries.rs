use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "audit_entries")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique_key = "audit_entry_uuid")]
    pub entry_id: Uuid,
    pub at: OffsetDateTime,
    pub duration_ns: i64,
    pub status_code: i32,
    pub method: String,
    pub path: String,
    pub request_id: String,
    pub api_key_hash: Option<String>,
    pub request_headers: Option<Json>,
    pub request_body: Option<String>,
    pub response_headers: Option<Json>,
    pub response_body: Option<String>,
    pub created_at: OffsetDateTime,
}

impl ActiveModelBehavior for ActiveModel {}
