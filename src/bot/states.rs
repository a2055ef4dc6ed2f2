use crate::entities::PromocodeKind;
use crate::error::{AppError, AppResult};
use crate::models::{NewPlan, NewPromocode};
use crate::utils::parse_rubles;
use teloxide::dispatching::dialogue::{Dialogue, InMemStorage};

/// What the next free-text message from a chat is expected to be
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum State {
    #[default]
    Idle,
    TopupAmount,
    PromocodeInput,
    TicketTitle,
    TicketText {
        title: String,
    },
    TicketReply {
        ticket_id: i32,
    },
    AdminUserSearch,
    AdminBalanceChange {
        user_id: i32,
    },
    AdminTicketReply {
        ticket_id: i32,
    },
    AdminBroadcast,
    AdminPlanCreate,
    AdminPromocodeCreate,
}

pub type BotDialogue = Dialogue<State, InMemStorage<State>>;

pub async fn set_state(dialogue: &BotDialogue, state: State) -> AppResult<()> {
    dialogue
        .update(state)
        .await
        .map_err(|e| AppError::InternalError(format!("dialogue storage: {e}")))
}

pub async fn reset_state(dialogue: &BotDialogue) -> AppResult<()> {
    dialogue
        .exit()
        .await
        .map_err(|e| AppError::InternalError(format!("dialogue storage: {e}")))
}

/// `Название | цена ₽ | дней | трафик ГБ | устройств [| описание]`
pub fn parse_plan_form(raw: &str) -> AppResult<NewPlan> {
    let fields: Vec<&str> = raw.split('|').map(str::trim).collect();
    if !(5..=6).contains(&fields.len()) {
        return Err(AppError::ValidationError(
            "Формат: Название | цена ₽ | дней | трафик ГБ | устройств [| описание]".into(),
        ));
    }
    let number = |i: usize, what: &str| -> AppResult<i32> {
        fields[i]
            .parse::<i32>()
            .ok()
            .filter(|n| *n >= 0)
            .ok_or_else(|| AppError::ValidationError(format!("Некорректное значение: {what}")))
    };

    Ok(NewPlan {
        name: fields[0].to_string(),
        description: fields.get(5).filter(|d| !d.is_empty()).map(|d| d.to_string()),
        price: parse_rubles(fields[1])
            .ok_or_else(|| AppError::ValidationError("Некорректная цена".into()))?,
        duration_days: number(2, "дней")?,
        traffic_limit_gb: number(3, "трафик")?,
        device_limit: number(4, "устройств")?,
        squad_uuids: Vec::new(),
        sort_order: 0,
    })
}

/// `КОД balance|days значение [лимит] [дней действия]`
pub fn parse_promocode_form(raw: &str, created_by: i64) -> AppResult<NewPromocode> {
    let usage = || {
        AppError::ValidationError(
            "Формат: КОД balance|days значение [лимит активаций] [дней действия]".into(),
        )
    };
    let fields: Vec<&str> = raw.split_whitespace().collect();
    if !(3..=5).contains(&fields.len()) {
        return Err(usage());
    }

    let kind = match fields[1].to_lowercase().as_str() {
        "balance" | "баланс" => PromocodeKind::Balance,
        "days" | "дни" => PromocodeKind::SubscriptionDays,
        _ => return Err(usage()),
    };
    let value = match kind {
        PromocodeKind::Balance => parse_rubles(fields[2]),
        PromocodeKind::SubscriptionDays => fields[2].parse::<i64>().ok(),
    }
    .ok_or_else(usage)?;
    let max_uses = match fields.get(3) {
        Some(v) => v.parse::<i32>().map_err(|_| usage())?,
        None => 0,
    };
    let valid_days = match fields.get(4) {
        Some(v) => Some(v.parse::<i64>().map_err(|_| usage())?),
        None => None,
    };

    Ok(NewPromocode {
        code: fields[0].to_string(),
        kind,
        value,
        max_uses,
        valid_days,
        created_by: Some(created_by),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plan_form() {
        let plan = parse_plan_form("Месяц | 199 | 30 | 100 | 3 | Лучший выбор").unwrap();
        assert_eq!(plan.name, "Месяц");
        assert_eq!(plan.price, 19_900);
        assert_eq!(plan.duration_days, 30);
        assert_eq!(plan.traffic_limit_gb, 100);
        assert_eq!(plan.device_limit, 3);
        assert_eq!(plan.description.as_deref(), Some("Лучший выбор"));

        let plan = parse_plan_form("Год|1490.50|365|0|5").unwrap();
        assert_eq!(plan.price, 149_050);
        assert!(plan.description.is_none());

        assert!(parse_plan_form("Месяц | 199 | 30").is_err());
        assert!(parse_plan_form("Месяц | abc | 30 | 100 | 3").is_err());
        assert!(parse_plan_form("Месяц | 199 | -1 | 100 | 3").is_err());
    }

    #[test]
    fn test_parse_promocode_form() {
        let promo = parse_promocode_form("SPRING balance 150 100 30", 1).unwrap();
        assert_eq!(promo.kind, PromocodeKind::Balance);
        assert_eq!(promo.value, 15_000);
        assert_eq!(promo.max_uses, 100);
        assert_eq!(promo.valid_days, Some(30));
        assert_eq!(promo.created_by, Some(1));

        let promo = parse_promocode_form("WEEK days 7", 1).unwrap();
        assert_eq!(promo.kind, PromocodeKind::SubscriptionDays);
        assert_eq!(promo.value, 7);
        assert_eq!(promo.max_uses, 0);
        assert_eq!(promo.valid_days, None);

        assert!(parse_promocode_form("WEEK weeks 7", 1).is_err());
        assert!(parse_promocode_form("WEEK", 1).is_err());
        assert!(parse_promocode_form("WEEK days x", 1).is_err());
    }
}
