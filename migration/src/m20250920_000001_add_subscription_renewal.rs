use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum UserSubscriptions {
    Table,
    AutoRenew,
    ExpiryNotified,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

// SQLite accepts a single column change per ALTER TABLE, so each column gets its own statement.
#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .alter_table(
                Table::alter()
                    .table(UserSubscriptions::Table)
                    .add_column(
                        ColumnDef::new(UserSubscriptions::AutoRenew)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .alter_table(
                Table::alter()
                    .table(UserSubscriptions::Table)
                    .add_column(
                        ColumnDef::new(UserSubscriptions::ExpiryNotified)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .alter_table(
                Table::alter()
                    .table(UserSubscriptions::Table)
                    .drop_column(UserSubscriptions::ExpiryNotified)
                    .to_owned(),
            )
            .await?;
        manager
            .alter_table(
                Table::alter()
                    .table(UserSubscriptions::Table)
                    .drop_column(UserSubscriptions::AutoRenew)
                    .to_owned(),
            )
            .await?;
        Ok(())
    }
}
