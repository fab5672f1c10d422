use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // services 表
        manager
            .create_table(
                Table::create()
                    .table(Service::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Service::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Service::ClientId).string().not_null())
                    .col(ColumnDef::new(Service::ProductId).string().not_null())
                    .col(ColumnDef::new(Service::ModuleId).string().not_null())
                    .col(ColumnDef::new(Service::Category).string().not_null())
                    .col(ColumnDef::new(Service::State).string().not_null())
                    .col(ColumnDef::new(Service::ExternalId).string().null())
                    .col(ColumnDef::new(Service::ExpiryDate).string().null())
                    .col(
                        ColumnDef::new(Service::Version)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Service::Data).text().not_null())
                    .col(ColumnDef::new(Service::CreatedAt).string().not_null())
                    .col(ColumnDef::new(Service::UpdatedAt).string().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_services_state")
                    .table(Service::Table)
                    .col(Service::State)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        // call_records 表
        manager
            .create_table(
                Table::create()
                    .table(CallRecord::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CallRecord::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(CallRecord::CorrelationId).string().not_null())
                    .col(ColumnDef::new(CallRecord::ServiceId).string().null())
                    .col(ColumnDef::new(CallRecord::TransitionId).string().null())
                    .col(ColumnDef::new(CallRecord::ModuleId).string().not_null())
                    .col(ColumnDef::new(CallRecord::Operation).string().not_null())
                    .col(
                        ColumnDef::new(CallRecord::Attempt)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(ColumnDef::new(CallRecord::Request).text().not_null())
                    .col(ColumnDef::new(CallRecord::Fingerprint).string().not_null())
                    .col(ColumnDef::new(CallRecord::Response).text().null())
                    .col(ColumnDef::new(CallRecord::Outcome).string().null())
                    .col(ColumnDef::new(CallRecord::ResultSummary).text().null())
                    .col(ColumnDef::new(CallRecord::ErrorCode).string().null())
                    .col(ColumnDef::new(CallRecord::ErrorMessage).text().null())
                    .col(ColumnDef::new(CallRecord::Normalization).text().null())
                    .col(ColumnDef::new(CallRecord::StartedAt).string().not_null())
                    .col(ColumnDef::new(CallRecord::FinishedAt).string().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_call_records_service")
                    .table(CallRecord::Table)
                    .col(CallRecord::ServiceId)
                    .col(CallRecord::StartedAt)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CallRecord::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Service::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Service {
    #[sea_orm(iden = "services")]
    Table,
    Id,
    ClientId,
    ProductId,
    ModuleId,
    Category,
    State,
    ExternalId,
    ExpiryDate,
    Version,
    Data,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum CallRecord {
    #[sea_orm(iden = "call_records")]
    Table,
    Id,
    CorrelationId,
    ServiceId,
    TransitionId,
    ModuleId,
    Operation,
    Attempt,
    Request,
    Fingerprint,
    Response,
    Outcome,
    ResultSummary,
    ErrorCode,
    ErrorMessage,
    Normalization,
    StartedAt,
    FinishedAt,
}
