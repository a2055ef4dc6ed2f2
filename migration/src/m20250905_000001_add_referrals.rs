use sea_orm_migration::prelude::*;

/// One row per invited user
#[derive(DeriveIden)]
enum ReferralPrograms {
    Table,
    Id,
    ReferrerId,
    ReferredId,
    FirstRewardPaid,
    TotalEarned,
    CreatedAt,
}

#[derive(DeriveIden)]
enum ReferralEarnings {
    Table,
    Id,
    ReferrerId,
    ReferredId,
    Amount,
    Kind,
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
                    .table(ReferralPrograms::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ReferralPrograms::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ReferralPrograms::ReferrerId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReferralPrograms::ReferredId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReferralPrograms::FirstRewardPaid)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(ReferralPrograms::TotalEarned)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ReferralPrograms::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // a user can be invited only once
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_referral_programs_referred_unique")
                    .table(ReferralPrograms::Table)
                    .col(ReferralPrograms::ReferredId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_referral_programs_referrer")
                    .table(ReferralPrograms::Table)
                    .col(ReferralPrograms::ReferrerId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ReferralEarnings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ReferralEarnings::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ReferralEarnings::ReferrerId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReferralEarnings::ReferredId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReferralEarnings::Amount)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ReferralEarnings::Kind).string_len(32).not_null())
                    .col(ColumnDef::new(ReferralEarnings::PaymentId).integer().null())
                    .col(
                        ColumnDef::new(ReferralEarnings::CreatedAt)
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
                    .name("idx_referral_earnings_referrer")
                    .table(ReferralEarnings::Table)
                    .col(ReferralEarnings::ReferrerId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ReferralEarnings::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ReferralPrograms::Table).to_owned())
            .await?;
        Ok(())
    }
}
