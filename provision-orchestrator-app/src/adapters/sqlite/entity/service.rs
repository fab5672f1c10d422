//! `SeaORM` entity for the `services` table.

use sea_orm::entity::prelude::*;

/// Queried fields as columns, the full service as JSON in `data`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "services")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub client_id: String,
    pub product_id: String,
    pub module_id: String,
    pub category: String,
    pub state: String,
    pub external_id: Option<String>,
    pub expiry_date: Option<String>,
    pub version: i64,
    pub data: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
