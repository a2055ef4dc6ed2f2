use crate::config::Config;
use crate::entities::{
    TicketPriority, TicketStatus, ticket_entity as tickets, ticket_message_entity as messages,
    user_entity as users,
};
use crate::error::{AppError, AppResult};
use crate::models::{AdminReply, PaginatedResponse, PaginationParams, TicketCounts, TicketWithMessages};
use chrono::Utc;
use sea_orm::sea_query::{Expr, SimpleExpr};
use sea_orm::{
    ActiveEnum, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, Order, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
    TransactionTrait,
};
use std::sync::Arc;

const TITLE_MIN_CHARS: usize = 3;
const TITLE_MAX_CHARS: usize = 100;
const MESSAGE_MAX_CHARS: usize = 4000;

#[derive(Clone)]
pub struct TicketService {
    pool: DatabaseConnection,
    config: Arc<Config>,
}

fn validate_title(title: &str) -> AppResult<String> {
    let title = title.trim();
    let len = title.chars().count();
    if !(TITLE_MIN_CHARS..=TITLE_MAX_CHARS).contains(&len) {
        return Err(AppError::ValidationError(format!(
            "Тема обращения должна быть от {TITLE_MIN_CHARS} до {TITLE_MAX_CHARS} символов"
        )));
    }
    Ok(title.to_string())
}

fn validate_text(text: &str) -> AppResult<String> {
    let text = text.trim();
    let len = text.chars().count();
    if len == 0 || len > MESSAGE_MAX_CHARS {
        return Err(AppError::ValidationError(format!(
            "Сообщение должно быть от 1 до {MESSAGE_MAX_CHARS} символов"
        )));
    }
    Ok(text.to_string())
}

async fn insert_message<C: ConnectionTrait>(
    db: &C,
    ticket_id: i32,
    author_id: i32,
    text: String,
    is_from_admin: bool,
) -> AppResult<messages::Model> {
    Ok(messages::ActiveModel {
        ticket_id: Set(ticket_id),
        user_id: Set(author_id),
        text: Set(text),
        is_from_admin: Set(is_from_admin),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await?)
}

impl TicketService {
    pub fn new(pool: DatabaseConnection, config: Arc<Config>) -> Self {
        Self { pool, config }
    }

    /// Opens a ticket with its first message
    pub async fn create(
        &self,
        user_id: i32,
        title: &str,
        text: &str,
    ) -> AppResult<TicketWithMessages> {
        let title = validate_title(title)?;
        let text = validate_text(text)?;

        let open = tickets::Entity::find()
            .filter(tickets::Column::UserId.eq(user_id))
            .filter(tickets::Column::Status.ne(TicketStatus::Closed))
            .count(&self.pool)
            .await?;
        let limit = self.config.support.max_open_tickets;
        if open >= limit {
            return Err(AppError::ValidationError(format!(
                "У вас уже {open} открытых обращений. Дождитесь ответа или закройте одно из них"
            )));
        }

        let owner = users::Entity::find_by_id(user_id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Пользователь не найден".into()))?;

        let now = Utc::now();
        let txn = self.pool.begin().await?;
        let ticket = tickets::ActiveModel {
            user_id: Set(user_id),
            title: Set(title),
            status: Set(TicketStatus::Open),
            priority: Set(TicketPriority::Normal),
            created_at: Set(now),
            updated_at: Set(now),
            closed_at: Set(None),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        let first = insert_message(&txn, ticket.id, user_id, text, false).await?;
        txn.commit().await?;

        log::info!("Ticket #{} opened by user {user_id}", ticket.id);
        Ok(TicketWithMessages {
            ticket,
            messages: vec![first],
            owner_telegram_id: owner.telegram_id,
        })
    }

    /// A user's follow-up. Reopens an answered ticket; closed tickets are read-only.
    pub async fn add_user_message(
        &self,
        user_id: i32,
        ticket_id: i32,
        text: &str,
    ) -> AppResult<messages::Model> {
        let text = validate_text(text)?;
        let ticket = self.get_owned(ticket_id, Some(user_id)).await?;
        if ticket.status == TicketStatus::Closed {
            return Err(AppError::ValidationError(
                "Обращение закрыто. Создайте новое".into(),
            ));
        }

        let txn = self.pool.begin().await?;
        let message = insert_message(&txn, ticket.id, user_id, text, false).await?;
        let mut am = ticket.into_active_model();
        am.status = Set(TicketStatus::Open);
        am.updated_at = Set(Utc::now());
        am.update(&txn).await?;
        txn.commit().await?;
        Ok(message)
    }

    /// Support reply. The admin's account is resolved by telegram id.
    pub async fn add_admin_reply(
        &self,
        admin_telegram_id: i64,
        ticket_id: i32,
        text: &str,
    ) -> AppResult<AdminReply> {
        if !self.config.is_admin(admin_telegram_id) {
            return Err(AppError::Forbidden);
        }
        let text = validate_text(text)?;
        let admin = users::Entity::find()
            .filter(users::Column::TelegramId.eq(admin_telegram_id))
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Аккаунт администратора не найден".into()))?;
        let ticket = self.get_owned(ticket_id, None).await?;
        if ticket.status == TicketStatus::Closed {
            return Err(AppError::ValidationError(
                "Обращение закрыто, сначала откройте его заново".into(),
            ));
        }
        let owner_telegram_id = self.owner_telegram_id(ticket.user_id).await?;

        let txn = self.pool.begin().await?;
        insert_message(&txn, ticket.id, admin.id, text, true).await?;
        let mut am = ticket.into_active_model();
        am.status = Set(TicketStatus::Answered);
        am.updated_at = Set(Utc::now());
        am.update(&txn).await?;
        txn.commit().await?;

        log::info!("Admin {admin_telegram_id} answered ticket #{ticket_id}");
        Ok(AdminReply {
            ticket_id,
            owner_telegram_id,
        })
    }

    /// Closes a ticket. `owner` restricts the call to that user's tickets.
    pub async fn close(&self, ticket_id: i32, owner: Option<i32>) -> AppResult<tickets::Model> {
        let ticket = self.get_owned(ticket_id, owner).await?;
        if ticket.status == TicketStatus::Closed {
            return Ok(ticket);
        }
        let now = Utc::now();
        let mut am = ticket.into_active_model();
        am.status = Set(TicketStatus::Closed);
        am.closed_at = Set(Some(now));
        am.updated_at = Set(now);
        Ok(am.update(&self.pool).await?)
    }

    pub async fn reopen(&self, ticket_id: i32) -> AppResult<tickets::Model> {
        let ticket = self.get_owned(ticket_id, None).await?;
        let mut am = ticket.into_active_model();
        am.status = Set(TicketStatus::Open);
        am.closed_at = Set(None);
        am.updated_at = Set(Utc::now());
        Ok(am.update(&self.pool).await?)
    }

    pub async fn set_priority(
        &self,
        ticket_id: i32,
        priority: TicketPriority,
    ) -> AppResult<tickets::Model> {
        let ticket = self.get_owned(ticket_id, None).await?;
        let mut am = ticket.into_active_model();
        am.priority = Set(priority);
        am.updated_at = Set(Utc::now());
        Ok(am.update(&self.pool).await?)
    }

    pub async fn user_tickets(
        &self,
        user_id: i32,
        params: &PaginationParams,
    ) -> AppResult<PaginatedResponse<tickets::Model>> {
        let base = tickets::Entity::find().filter(tickets::Column::UserId.eq(user_id));
        let total = base.clone().count(&self.pool).await?;
        let items = base
            .order_by_desc(tickets::Column::UpdatedAt)
            .order_by_desc(tickets::Column::Id)
            .limit(params.get_limit())
            .offset(params.get_offset())
            .all(&self.pool)
            .await?;
        Ok(PaginatedResponse::new(items, params, total))
    }

    /// Support queue: highest priority first, then oldest activity
    pub async fn admin_tickets(
        &self,
        status: Option<TicketStatus>,
        params: &PaginationParams,
    ) -> AppResult<PaginatedResponse<tickets::Model>> {
        let mut base = tickets::Entity::find();
        if let Some(status) = status {
            base = base.filter(tickets::Column::Status.eq(status));
        }
        let total = base.clone().count(&self.pool).await?;
        let items = base
            .order_by(priority_order(), Order::Desc)
            .order_by_asc(tickets::Column::UpdatedAt)
            .order_by_asc(tickets::Column::Id)
            .limit(params.get_limit())
            .offset(params.get_offset())
            .all(&self.pool)
            .await?;
        Ok(PaginatedResponse::new(items, params, total))
    }

    /// Ticket with its conversation. `owner` restricts the call to that user.
    pub async fn get_with_messages(
        &self,
        ticket_id: i32,
        owner: Option<i32>,
    ) -> AppResult<TicketWithMessages> {
        let ticket = self.get_owned(ticket_id, owner).await?;
        let messages = messages::Entity::find()
            .filter(messages::Column::TicketId.eq(ticket.id))
            .order_by_asc(messages::Column::CreatedAt)
            .order_by_asc(messages::Column::Id)
            .all(&self.pool)
            .await?;
        let owner_telegram_id = self.owner_telegram_id(ticket.user_id).await?;
        Ok(TicketWithMessages {
            ticket,
            messages,
            owner_telegram_id,
        })
    }

    pub async fn counts_by_status(&self) -> AppResult<TicketCounts> {
        let count = |status: TicketStatus| {
            tickets::Entity::find()
                .filter(tickets::Column::Status.eq(status))
                .count(&self.pool)
        };
        Ok(TicketCounts {
            open: count(TicketStatus::Open).await?,
            answered: count(TicketStatus::Answered).await?,
            closed: count(TicketStatus::Closed).await?,
        })
    }

    async fn get_owned(&self, ticket_id: i32, owner: Option<i32>) -> AppResult<tickets::Model> {
        tickets::Entity::find_by_id(ticket_id)
            .one(&self.pool)
            .await?
            .filter(|t| owner.is_none_or(|o| o == t.user_id))
            .ok_or_else(|| AppError::NotFound("Обращение не найдено".into()))
    }

    async fn owner_telegram_id(&self, user_id: i32) -> AppResult<i64> {
        users::Entity::find_by_id(user_id)
            .select_only()
            .column(users::Column::TelegramId)
            .into_tuple::<i64>()
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Пользователь не найден".into()))
    }
}

fn priority_rank(priority: TicketPriority) -> u8 {
    match priority {
        TicketPriority::Low => 0,
        TicketPriority::Normal => 1,
        TicketPriority::High => 2,
        TicketPriority::Urgent => 3,
    }
}

/// Priority is stored as text, so the queue ranks it with a CASE expression
fn priority_order() -> SimpleExpr {
    let arms: String = [
        TicketPriority::Low,
        TicketPriority::Normal,
        TicketPriority::High,
        TicketPriority::Urgent,
    ]
    .into_iter()
    .map(|p| format!(" WHEN '{}' THEN {}", p.to_value(), priority_rank(p)))
    .collect();
    Expr::cust(format!("CASE priority{arms} ELSE 0 END"))
}
