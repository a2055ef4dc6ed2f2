//! Balance changes and their ledger rows. Every balance mutation in the crate goes
//! through `apply`, so the two can never drift apart.

use crate::entities::{
    PaymentKind, PaymentMethod, PaymentStatus, payment_entity as payments, user_entity as users,
};
use crate::error::{AppError, AppResult};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QuerySelect, Set,
};

#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub user_id: i32,
    /// positive credits, negative debits
    pub amount: i64,
    pub kind: PaymentKind,
    pub method: PaymentMethod,
    pub description: Option<String>,
    pub external_id: Option<String>,
}

impl LedgerEntry {
    pub fn new(user_id: i32, amount: i64, kind: PaymentKind, method: PaymentMethod) -> Self {
        Self {
            user_id,
            amount,
            kind,
            method,
            description: None,
            external_id: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }
}

/// Applies the balance change and writes a completed ledger row.
///
/// Debits are guarded in the UPDATE itself (`balance >= debit`), so a concurrent
/// debit can never push the balance below zero. Returns the ledger row and the
/// balance after the change.
pub async fn apply<C: ConnectionTrait>(
    db: &C,
    entry: LedgerEntry,
) -> AppResult<(payments::Model, i64)> {
    if entry.amount == 0 {
        return Err(AppError::ValidationError("Сумма должна быть ненулевой".into()));
    }
    let now = Utc::now();

    let mut update = users::Entity::update_many()
        .col_expr(
            users::Column::Balance,
            Expr::col(users::Column::Balance).add(entry.amount),
        )
        .col_expr(users::Column::UpdatedAt, Expr::value(now))
        .filter(users::Column::Id.eq(entry.user_id));
    if entry.amount < 0 {
        update = update.filter(users::Column::Balance.gte(-entry.amount));
    }
    let result = update.exec(db).await?;

    if result.rows_affected == 0 {
        let user = users::Entity::find_by_id(entry.user_id)
            .one(db)
            .await?
            .ok_or_else(|| AppError::NotFound("Пользователь не найден".into()))?;
        return Err(AppError::InsufficientBalance {
            required: -entry.amount,
            available: user.balance,
        });
    }

    let payment = payments::ActiveModel {
        user_id: Set(entry.user_id),
        amount: Set(entry.amount),
        kind: Set(entry.kind),
        method: Set(entry.method),
        status: Set(PaymentStatus::Completed),
        description: Set(entry.description),
        external_id: Set(entry.external_id),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;

    let balance = current_balance(db, entry.user_id).await?;
    log::debug!(
        "Ledger: user {} {:+} ({:?}/{:?}), balance {}",
        payment.user_id,
        payment.amount,
        payment.kind,
        payment.method,
        balance
    );
    Ok((payment, balance))
}

pub async fn current_balance<C: ConnectionTrait>(db: &C, user_id: i32) -> AppResult<i64> {
    users::Entity::find_by_id(user_id)
        .select_only()
        .column(users::Column::Balance)
        .into_tuple::<i64>()
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Пользователь не найден".into()))
}

/// Finds an earlier ledger row for the same provider payment
pub async fn find_external<C: ConnectionTrait>(
    db: &C,
    method: PaymentMethod,
    external_id: &str,
) -> AppResult<Option<payments::Model>> {
    Ok(payments::Entity::find()
        .filter(payments::Column::Method.eq(method))
        .filter(payments::Column::ExternalId.eq(external_id))
        .one(db)
        .await?)
}
