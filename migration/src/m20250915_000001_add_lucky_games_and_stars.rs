use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum LuckyGames {
    Table,
    Id,
    UserId,
    PrizeName,
    Reward,
    PlayedAt,
}

/// Telegram Stars receipts
#[derive(DeriveIden)]
enum StarPayments {
    Table,
    Id,
    UserId,
    TelegramPaymentChargeId,
    Stars,
    Amount,
    Payload,
    PaymentId,
    CreatedAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(LuckyGames::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(LuckyGames::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(LuckyGames::UserId).integer().not_null())
                    .col(ColumnDef::new(LuckyGames::PrizeName).string_len(128).not_null())
                    .col(
                        ColumnDef::new(LuckyGames::Reward)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(LuckyGames::PlayedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_lucky_games_user")
                    .table(LuckyGames::Table)
                    .col(LuckyGames::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(StarPayments::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(StarPayments::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(StarPayments::UserId).integer().not_null())
                    .col(
                        ColumnDef::new(StarPayments::TelegramPaymentChargeId)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(ColumnDef::new(StarPayments::Stars).integer().not_null())
                    .col(ColumnDef::new(StarPayments::Amount).big_integer().not_null())
                    .col(ColumnDef::new(StarPayments::Payload).string_len(128).not_null())
                    .col(ColumnDef::new(StarPayments::PaymentId).integer().null())
                    .col(
                        ColumnDef::new(StarPayments::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_star_payments_charge_unique")
                    .table(StarPayments::Table)
                    .col(StarPayments::TelegramPaymentChargeId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(StarPayments::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(LuckyGames::Table).to_owned())
            .await?;
        Ok(())
    }
}
