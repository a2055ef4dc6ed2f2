use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    TelegramId,
    Username,
    FirstName,
    LastName,
    LanguageCode,
    Balance,
    ReferralCode,
    ReferredById,
    IsBanned,
    HasHadTrial,
    RemnawaveUuid,
    LastActivity,
    CreatedAt,
    UpdatedAt,
}

/// Sellable plans
#[derive(DeriveIden)]
enum Subscriptions {
    Table,
    Id,
    Name,
    Description,
    Price,
    DurationDays,
    TrafficLimitGb,
    DeviceLimit,
    SquadUuids,
    IsActive,
    IsTrial,
    SortOrder,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum UserSubscriptions {
    Table,
    Id,
    UserId,
    SubscriptionId,
    RemnawaveUuid,
    ShortUuid,
    SubscriptionUrl,
    ExpiresAt,
    TrafficLimitGb,
    SquadUuids,
    IsActive,
    IsTrial,
    CreatedAt,
    UpdatedAt,
}

/// Balance ledger
#[derive(DeriveIden)]
enum Payments {
    Table,
    Id,
    UserId,
    Amount,
    Kind,
    Method,
    Status,
    Description,
    ExternalId,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Promocodes {
    Table,
    Id,
    Code,
    Kind,
    Value,
    MaxUses,
    CurrentUses,
    ValidUntil,
    IsActive,
    CreatedBy,
    CreatedAt,
}

#[derive(DeriveIden)]
enum PromocodeUsages {
    Table,
    Id,
    PromocodeId,
    UserId,
    UsedAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Users::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Users::TelegramId).big_integer().not_null())
                    .col(ColumnDef::new(Users::Username).string_len(64).null())
                    .col(ColumnDef::new(Users::FirstName).string_len(255).null())
                    .col(ColumnDef::new(Users::LastName).string_len(255).null())
                    .col(ColumnDef::new(Users::LanguageCode).string_len(8).null())
                    .col(
                        ColumnDef::new(Users::Balance)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Users::ReferralCode).string_len(32).not_null())
                    .col(ColumnDef::new(Users::ReferredById).integer().null())
                    .col(
                        ColumnDef::new(Users::IsBanned)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Users::HasHadTrial)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Users::RemnawaveUuid).string_len(64).null())
                    .col(
                        ColumnDef::new(Users::LastActivity)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Users::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Users::UpdatedAt)
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
                    .name("idx_users_telegram_id_unique")
                    .table(Users::Table)
                    .col(Users::TelegramId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_users_referral_code_unique")
                    .table(Users::Table)
                    .col(Users::ReferralCode)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Subscriptions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Subscriptions::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Subscriptions::Name).string_len(128).not_null())
                    .col(ColumnDef::new(Subscriptions::Description).text().null())
                    .col(ColumnDef::new(Subscriptions::Price).big_integer().not_null())
                    .col(
                        ColumnDef::new(Subscriptions::DurationDays)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Subscriptions::TrafficLimitGb)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Subscriptions::DeviceLimit)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Subscriptions::SquadUuids).text().null())
                    .col(
                        ColumnDef::new(Subscriptions::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Subscriptions::IsTrial)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Subscriptions::SortOrder)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Subscriptions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Subscriptions::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(UserSubscriptions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UserSubscriptions::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(UserSubscriptions::UserId).integer().not_null())
                    .col(
                        ColumnDef::new(UserSubscriptions::SubscriptionId)
                            .integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(UserSubscriptions::RemnawaveUuid)
                            .string_len(64)
                            .null(),
                    )
                    .col(ColumnDef::new(UserSubscriptions::ShortUuid).string_len(64).null())
                    .col(ColumnDef::new(UserSubscriptions::SubscriptionUrl).text().null())
                    .col(
                        ColumnDef::new(UserSubscriptions::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UserSubscriptions::TrafficLimitGb)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(UserSubscriptions::SquadUuids).text().null())
                    .col(
                        ColumnDef::new(UserSubscriptions::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(UserSubscriptions::IsTrial)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(UserSubscriptions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UserSubscriptions::UpdatedAt)
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
                    .name("idx_user_subscriptions_user_id")
                    .table(UserSubscriptions::Table)
                    .col(UserSubscriptions::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Payments::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Payments::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Payments::UserId).integer().not_null())
                    .col(ColumnDef::new(Payments::Amount).big_integer().not_null())
                    .col(ColumnDef::new(Payments::Kind).string_len(32).not_null())
                    .col(ColumnDef::new(Payments::Method).string_len(32).not_null())
                    .col(ColumnDef::new(Payments::Status).string_len(16).not_null())
                    .col(ColumnDef::new(Payments::Description).text().null())
                    .col(ColumnDef::new(Payments::ExternalId).string_len(128).null())
                    .col(
                        ColumnDef::new(Payments::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Payments::UpdatedAt)
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
                    .name("idx_payments_user_id")
                    .table(Payments::Table)
                    .col(Payments::UserId)
                    .to_owned(),
            )
            .await?;

        // one credit per external payment id and provider
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_payments_method_external_unique")
                    .table(Payments::Table)
                    .col(Payments::Method)
                    .col(Payments::ExternalId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Promocodes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Promocodes::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Promocodes::Code).string_len(32).not_null())
                    .col(ColumnDef::new(Promocodes::Kind).string_len(32).not_null())
                    .col(ColumnDef::new(Promocodes::Value).big_integer().not_null())
                    .col(
                        ColumnDef::new(Promocodes::MaxUses)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(Promocodes::CurrentUses)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Promocodes::ValidUntil)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Promocodes::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(Promocodes::CreatedBy).big_integer().null())
                    .col(
                        ColumnDef::new(Promocodes::CreatedAt)
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
                    .name("idx_promocodes_code_unique")
                    .table(Promocodes::Table)
                    .col(Promocodes::Code)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PromocodeUsages::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PromocodeUsages::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(PromocodeUsages::PromocodeId)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(PromocodeUsages::UserId).integer().not_null())
                    .col(
                        ColumnDef::new(PromocodeUsages::UsedAt)
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
                    .name("idx_promocode_usages_unique")
                    .table(PromocodeUsages::Table)
                    .col(PromocodeUsages::PromocodeId)
                    .col(PromocodeUsages::UserId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PromocodeUsages::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Promocodes::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Payments::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(UserSubscriptions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Subscriptions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;
        Ok(())
    }
}
