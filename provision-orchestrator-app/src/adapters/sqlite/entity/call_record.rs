use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "call_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub correlation_id: String,
    pub service_id: Option<String>,
    pub transition_id: Option<String>,
    pub module_id: String,
    pub operation: String,
    pub attempt: i32,
    pub request: String,
    pub fingerprint: String,
    pub response: Option<String>,
    pub outcome: Option<String>,
    pub result_summary: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub normalization: Option<String>,
    pub started_at: String,
    pub finished_at: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
