use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // One row per (subject, job kind)
        manager
            .create_table(
                Table::create()
                    .table(JobStatus::Table)
                    .if_not_exists()
                    .col(string_len(JobStatus::Subject, 255).not_null())
                    .col(string_len(JobStatus::JobKind, 32).not_null())
                    .col(uuid(JobStatus::Id).not_null())
                    .col(string_len(JobStatus::State, 32).not_null())
                    .col(json_binary(JobStatus::Details).not_null().default("{}"))
                    .col(
                        timestamp_with_time_zone(JobStatus::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(JobStatus::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .primary_key(
                        Index::create()
                            .name("pk_job_status")
                            .col(JobStatus::Subject)
                            .col(JobStatus::JobKind),
                    )
                    .to_owned(),
            )
            .await?;

        // Lazy expiry scans pending rows by age
        manager
            .create_index(
                Index::create()
                    .name("idx_job_status_state_created_at")
                    .table(JobStatus::Table)
                    .col(JobStatus::State)
                    .col(JobStatus::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ResultCache::Table)
                    .if_not_exists()
                    .col(string_len(ResultCache::Subject, 255).not_null().primary_key())
                    .col(json_binary(ResultCache::Payload).not_null())
                    .col(
                        timestamp_with_time_zone(ResultCache::SavedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ResultCache::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(JobStatus::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum JobStatus {
    Table,
    Subject,
    JobKind,
    Id,
    State,
    Details,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ResultCache {
    Table,
    Subject,
    Payload,
    SavedAt,
}
