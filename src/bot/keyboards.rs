use crate::bot::callback::CallbackAction;
use crate::entities::{TicketPriority, TicketStatus, plan_entity, promocode_entity, ticket_entity};
use crate::models::{PaginationInfo, TicketWithMessages};
use crate::utils::format_money;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

/// Preset Stars top-up amounts in kopecks
pub const TOPUP_PRESETS: [i64; 4] = [10_000, 30_000, 50_000, 100_000];

fn button(text: impl Into<String>, action: CallbackAction) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(text, action)
}

fn back(action: CallbackAction) -> Vec<InlineKeyboardButton> {
    vec![button("⬅️ Назад", action)]
}

fn pager(
    info: &PaginationInfo,
    page_action: fn(u64) -> CallbackAction,
) -> Option<Vec<InlineKeyboardButton>> {
    let mut row = Vec::new();
    if info.has_prev() {
        row.push(button("◀️", page_action(info.current_page - 1)));
    }
    if info.has_next() {
        row.push(button("▶️", page_action(info.current_page + 1)));
    }
    (!row.is_empty()).then_some(row)
}

pub fn main_menu(is_admin: bool, trial_available: bool) -> InlineKeyboardMarkup {
    let mut rows = vec![
        vec![
            button("🛒 Купить подписку", CallbackAction::Plans),
            button("🔐 Моя подписка", CallbackAction::MySubscription),
        ],
        vec![
            button("💰 Баланс", CallbackAction::Balance),
            button("🎟 Промокод", CallbackAction::Promocode),
        ],
        vec![
            button("👥 Рефералы", CallbackAction::Referral),
            button("🎰 Игра удачи", CallbackAction::LuckyGame),
        ],
        vec![button("🆘 Поддержка", CallbackAction::Support)],
    ];
    if trial_available {
        rows.insert(0, vec![button("🎁 Пробный период", CallbackAction::Trial)]);
    }
    if is_admin {
        rows.push(vec![button("🛠 Админ-панель", CallbackAction::Admin)]);
    }
    InlineKeyboardMarkup::new(rows)
}

pub fn back_to_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![back(CallbackAction::Menu)])
}

pub fn cancel() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![button("✖️ Отмена", CallbackAction::Cancel)]])
}

pub fn plans(plans: &[plan_entity::Model]) -> InlineKeyboardMarkup {
    let mut rows: Vec<_> = plans
        .iter()
        .map(|p| {
            vec![button(
                format!("{} · {}", p.name, format_money(p.price)),
                CallbackAction::Buy(p.id),
            )]
        })
        .collect();
    rows.push(back(CallbackAction::Menu));
    InlineKeyboardMarkup::new(rows)
}

pub fn confirm_purchase(plan_id: i32) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![
            button("✅ Подтвердить", CallbackAction::ConfirmBuy(plan_id)),
            button("✖️ Отмена", CallbackAction::Plans),
        ],
    ])
}

pub fn subscription(has_subscription: bool) -> InlineKeyboardMarkup {
    let label = if has_subscription { "🔁 Продлить" } else { "🛒 Купить" };
    InlineKeyboardMarkup::new(vec![
        vec![
            button(label, CallbackAction::Plans),
            button("🔄 Обновить", CallbackAction::MySubscription),
        ],
        back(CallbackAction::Menu),
    ])
}

pub fn balance() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![button("⭐ Пополнить", CallbackAction::Topup)],
        vec![button("🧾 История", CallbackAction::History(1))],
        back(CallbackAction::Menu),
    ])
}

pub fn history(info: &PaginationInfo) -> InlineKeyboardMarkup {
    let mut rows = Vec::new();
    if let Some(row) = pager(info, CallbackAction::History) {
        rows.push(row);
    }
    rows.push(back(CallbackAction::Balance));
    InlineKeyboardMarkup::new(rows)
}

pub fn topup() -> InlineKeyboardMarkup {
    let presets: Vec<_> = TOPUP_PRESETS
        .iter()
        .map(|a| button(format_money(*a), CallbackAction::TopupStars(*a)))
        .collect();
    let mut rows: Vec<Vec<_>> = presets.chunks(2).map(|c| c.to_vec()).collect();
    rows.push(vec![button("✏️ Другая сумма", CallbackAction::TopupCustom)]);
    rows.push(back(CallbackAction::Balance));
    InlineKeyboardMarkup::new(rows)
}

pub fn support(tickets: &[ticket_entity::Model], info: &PaginationInfo) -> InlineKeyboardMarkup {
    let mut rows: Vec<_> = tickets
        .iter()
        .map(|t| {
            vec![button(
                crate::bot::texts::ticket_button(t),
                CallbackAction::Ticket(t.id),
            )]
        })
        .collect();
    if let Some(row) = pager(info, CallbackAction::Tickets) {
        rows.push(row);
    }
    rows.push(vec![button("➕ Новое обращение", CallbackAction::TicketNew)]);
    rows.push(back(CallbackAction::Menu));
    InlineKeyboardMarkup::new(rows)
}

pub fn user_ticket(view: &TicketWithMessages) -> InlineKeyboardMarkup {
    let mut rows = Vec::new();
    if view.ticket.status != TicketStatus::Closed {
        rows.push(vec![
            button("✍️ Ответить", CallbackAction::TicketReply(view.ticket.id)),
            button("✅ Закрыть", CallbackAction::TicketClose(view.ticket.id)),
        ]);
    }
    rows.push(back(CallbackAction::Support));
    InlineKeyboardMarkup::new(rows)
}

pub fn lucky_game(can_play: bool) -> InlineKeyboardMarkup {
    let mut rows = Vec::new();
    if can_play {
        rows.push(vec![button("🎲 Испытать удачу", CallbackAction::LuckyPlay)]);
    }
    rows.push(back(CallbackAction::Menu));
    InlineKeyboardMarkup::new(rows)
}

pub fn admin_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![
            button("📊 Статистика", CallbackAction::AdminStats),
            button("🖥 Панель", CallbackAction::AdminPanelStats),
        ],
        vec![
            button("🔎 Пользователи", CallbackAction::AdminUserSearch),
            button("🎫 Обращения", CallbackAction::AdminTickets(1)),
        ],
        vec![
            button("📦 Тарифы", CallbackAction::AdminPlans),
            button("🎟 Промокоды", CallbackAction::AdminPromos(1)),
        ],
        vec![
            button("🔄 Синхронизация", CallbackAction::AdminSync),
            button("📣 Рассылка", CallbackAction::AdminBroadcast),
        ],
        back(CallbackAction::Menu),
    ])
}

pub fn back_to_admin() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![back(CallbackAction::Admin)])
}

pub fn admin_search_results(users: &[(i32, String)]) -> InlineKeyboardMarkup {
    let mut rows: Vec<_> = users
        .iter()
        .map(|(id, label)| vec![button(label.clone(), CallbackAction::AdminUser(*id))])
        .collect();
    rows.push(back(CallbackAction::Admin));
    InlineKeyboardMarkup::new(rows)
}

pub fn admin_user(user_id: i32, banned: bool) -> InlineKeyboardMarkup {
    let ban = if banned {
        button("✅ Разблокировать", CallbackAction::AdminBan(user_id, false))
    } else {
        button("⛔ Заблокировать", CallbackAction::AdminBan(user_id, true))
    };
    InlineKeyboardMarkup::new(vec![
        vec![button("💰 Изменить баланс", CallbackAction::AdminBalance(user_id))],
        vec![
            button("♻️ Сбросить трафик", CallbackAction::AdminResetTraffic(user_id)),
            button("🗑 Отозвать подписку", CallbackAction::AdminRevoke(user_id)),
        ],
        vec![ban],
        back(CallbackAction::Admin),
    ])
}

pub fn admin_plans(plans: &[plan_entity::Model]) -> InlineKeyboardMarkup {
    let mut rows: Vec<_> = plans
        .iter()
        .map(|p| {
            let mark = if p.is_active { "✅" } else { "⛔" };
            vec![button(
                format!("{mark} {}", p.name),
                CallbackAction::AdminPlanToggle(p.id),
            )]
        })
        .collect();
    rows.push(vec![button("➕ Новый тариф", CallbackAction::AdminPlanNew)]);
    rows.push(back(CallbackAction::Admin));
    InlineKeyboardMarkup::new(rows)
}

pub fn admin_promocodes(
    codes: &[promocode_entity::Model],
    info: &PaginationInfo,
) -> InlineKeyboardMarkup {
    let mut rows: Vec<_> = codes
        .iter()
        .filter(|p| p.is_active)
        .map(|p| {
            vec![button(
                format!("⛔ Отключить {}", p.code),
                CallbackAction::AdminPromoOff(p.id),
            )]
        })
        .collect();
    if let Some(row) = pager(info, CallbackAction::AdminPromos) {
        rows.push(row);
    }
    rows.push(vec![button("➕ Новый промокод", CallbackAction::AdminPromoNew)]);
    rows.push(back(CallbackAction::Admin));
    InlineKeyboardMarkup::new(rows)
}

pub fn admin_tickets(tickets: &[ticket_entity::Model], info: &PaginationInfo) -> InlineKeyboardMarkup {
    let mut rows: Vec<_> = tickets
        .iter()
        .map(|t| {
            vec![button(
                crate::bot::texts::ticket_button(t),
                CallbackAction::AdminTicket(t.id),
            )]
        })
        .collect();
    if let Some(row) = pager(info, CallbackAction::AdminTickets) {
        rows.push(row);
    }
    rows.push(back(CallbackAction::Admin));
    InlineKeyboardMarkup::new(rows)
}

pub fn admin_ticket(view: &TicketWithMessages) -> InlineKeyboardMarkup {
    let id = view.ticket.id;
    let mut rows = Vec::new();
    if view.ticket.status == TicketStatus::Closed {
        rows.push(vec![button("🔓 Открыть снова", CallbackAction::AdminTicketReopen(id))]);
    } else {
        rows.push(vec![
            button("✍️ Ответить", CallbackAction::AdminTicketReply(id)),
            button("✅ Закрыть", CallbackAction::AdminTicketClose(id)),
        ]);
        rows.push(
            [
                TicketPriority::Low,
                TicketPriority::Normal,
                TicketPriority::High,
                TicketPriority::Urgent,
            ]
            .into_iter()
            .filter(|p| *p != view.ticket.priority)
            .map(|p| button(p.label(), CallbackAction::AdminTicketPriority(id, p)))
            .collect(),
        );
    }
    rows.push(back(CallbackAction::AdminTickets(1)));
    InlineKeyboardMarkup::new(rows)
}
