//! Chat texts. Everything is HTML parse mode; user-supplied strings go
//! through `escape_html`.

use crate::config::Config;
use crate::entities::{
    lucky_game_entity, payment_entity, plan_entity, promocode_entity, referral_earning_entity,
    ticket_entity, user_entity, user_subscription_entity, PromocodeKind, ReferralEarningKind,
};
use crate::external::{InternalSquad, SystemStats};
use crate::models::{
    DashboardStats, LuckyGameResult, PaginatedResponse, ReferralEntry, ReferralStats,
    RevenueStats, TicketCounts, TicketWithMessages,
};
use crate::utils::{escape_html, format_money};
use chrono::{DateTime, Utc};

pub const HELP: &str = "ℹ️ <b>Как это работает</b>\n\n\
1. Пополните баланс звёздами Telegram или через Tribute.\n\
2. Выберите тариф в разделе «Купить подписку».\n\
3. Откройте «Моя подписка» и добавьте ссылку в приложение.\n\n\
Вопросы задавайте в разделе «Поддержка».";
pub const CANCELLED: &str = "Действие отменено.";
pub const ASK_TOPUP_AMOUNT: &str = "💳 Введите сумму пополнения в рублях:";
pub const ASK_PROMOCODE: &str = "🎟 Введите промокод:";
pub const ASK_TICKET_TITLE: &str = "🆘 Кратко опишите тему обращения (3-100 символов):";
pub const ASK_TICKET_TEXT: &str = "✍️ Опишите проблему подробно:";
pub const ASK_TICKET_REPLY: &str = "✍️ Введите сообщение:";
pub const ASK_USER_SEARCH: &str = "🔎 Введите Telegram ID, @username или имя:";
pub const ASK_BALANCE_CHANGE: &str =
    "💰 Введите сумму в рублях. Отрицательная сумма спишет средства, например <code>-100</code>:";
pub const ASK_BROADCAST: &str = "📣 Отправьте текст рассылки (HTML разрешён):";
pub const ASK_PLAN: &str = "➕ Новый тариф одной строкой:\n\
<code>Название | цена ₽ | дней | трафик ГБ | устройств | описание</code>\n\
Трафик 0 означает безлимит.";
pub const ASK_PROMOCODE_FORM: &str = "➕ Новый промокод одной строкой:\n\
<code>КОД balance 100 [лимит] [дней]</code> или <code>КОД days 7 [лимит] [дней]</code>\n\
Лимит 0 означает без ограничений.";
pub const TRIAL_ACTIVATED: &str = "🎁 Пробный период активирован! Откройте «Моя подписка», чтобы подключиться.";
pub const ADMIN_ONLY: &str = "⛔ Раздел доступен только администраторам";
pub const UNKNOWN_INPUT: &str = "Не понял сообщение. Воспользуйтесь меню 👇";

fn date(at: DateTime<Utc>) -> String {
    at.format("%d.%m.%Y %H:%M UTC").to_string()
}

fn traffic(gb: i32) -> String {
    if gb <= 0 {
        "безлимит".to_string()
    } else {
        format!("{gb} ГБ")
    }
}

pub fn main_menu(user: &user_entity::Model, config: &Config, is_new: bool) -> String {
    let greeting = if is_new {
        format!("👋 Добро пожаловать, {}!", escape_html(&user.display_name()))
    } else {
        format!("👋 {}, рады видеть снова!", escape_html(&user.display_name()))
    };
    let mut text = format!(
        "{greeting}\n\n💰 Баланс: <b>{}</b>",
        format_money(user.balance)
    );
    if let Some(channel) = &config.bot.channel_link {
        text.push_str(&format!("\n📢 Новости: {}", escape_html(channel)));
    }
    text
}

pub fn plans(plans: &[plan_entity::Model]) -> String {
    if plans.is_empty() {
        return "😔 Сейчас нет доступных тарифов".to_string();
    }
    let mut text = "🛒 <b>Тарифы</b>\n".to_string();
    for plan in plans {
        text.push_str(&format!(
            "\n<b>{}</b> — {}\n{} дн. · {} · устройств: {}",
            escape_html(&plan.name),
            format_money(plan.price),
            plan.duration_days,
            traffic(plan.traffic_limit_gb),
            plan.device_limit
        ));
        if let Some(description) = &plan.description {
            text.push_str(&format!("\n<i>{}</i>", escape_html(description)));
        }
        text.push('\n');
    }
    text
}

pub fn confirm_purchase(plan: &plan_entity::Model, balance: i64, extends: bool) -> String {
    let action = if extends { "Продлить подписку" } else { "Купить подписку" };
    format!(
        "{action} <b>{}</b> за {}?\n\nБаланс: {}",
        escape_html(&plan.name),
        format_money(plan.price),
        format_money(balance)
    )
}

pub fn purchased(outcome: &crate::models::PurchaseOutcome) -> String {
    let verb = if outcome.extended { "продлена" } else { "оформлена" };
    format!(
        "✅ Подписка <b>{}</b> {verb} до {}\n💰 Остаток на балансе: {}",
        escape_html(&outcome.plan.name),
        date(outcome.subscription.expires_at),
        format_money(outcome.new_balance)
    )
}

pub fn subscription(sub: Option<&user_subscription_entity::Model>, now: DateTime<Utc>) -> String {
    let Some(sub) = sub else {
        return "📭 У вас нет активной подписки".to_string();
    };
    let status = if sub.is_active && !sub.is_expired_at(now) {
        format!("🟢 активна, осталось дней: {}", sub.days_left(now))
    } else {
        "🔴 истекла".to_string()
    };
    let kind = if sub.is_trial { " (пробная)" } else { "" };
    let mut text = format!(
        "🔐 <b>Моя подписка</b>{kind}\n\nСтатус: {status}\nДействует до: {}\nТрафик: {}",
        date(sub.expires_at),
        traffic(sub.traffic_limit_gb)
    );
    if let Some(url) = &sub.subscription_url {
        text.push_str(&format!(
            "\n\n🔗 Ссылка для подключения:\n<code>{}</code>",
            escape_html(url)
        ));
    }
    text
}

pub fn balance(user: &user_entity::Model) -> String {
    format!(
        "💰 Ваш баланс: <b>{}</b>\n\nПополнить можно звёздами Telegram или через Tribute.",
        format_money(user.balance)
    )
}

pub fn history(page: &PaginatedResponse<payment_entity::Model>) -> String {
    if page.items.is_empty() {
        return "🧾 Операций пока нет".to_string();
    }
    let mut text = format!(
        "🧾 <b>История операций</b> (стр. {}/{})\n",
        page.pagination.current_page, page.pagination.total_pages
    );
    for p in &page.items {
        let sign = if p.amount > 0 { "+" } else { "" };
        text.push_str(&format!(
            "\n{} {sign}{} · {}",
            p.created_at.format("%d.%m %H:%M"),
            format_money(p.amount),
            escape_html(p.description.as_deref().unwrap_or(p.method.label()))
        ));
    }
    text
}

pub fn topup_credited(amount: i64, new_balance: i64) -> String {
    format!(
        "✅ Баланс пополнен на {}\n💰 Текущий баланс: {}",
        format_money(amount),
        format_money(new_balance)
    )
}

pub fn referral(
    stats: &ReferralStats,
    config: &Config,
    recent: &[ReferralEntry],
    credits: &[referral_earning_entity::Model],
) -> String {
    let rules = &config.referral;
    let mut text = format!(
        "👥 <b>Реферальная программа</b>\n\n\
         Приглашайте друзей по ссылке:\n<code>{}</code>\n\n\
         • {} вам за первое пополнение друга от {}\n\
         • {} другу в подарок\n\
         • {}% с каждого пополнения друга\n\n\
         Приглашено: {} (с пополнением: {})\nЗаработано: <b>{}</b>",
        escape_html(&stats.referral_link),
        format_money(rules.first_reward),
        format_money(rules.min_topup_for_first_reward),
        format_money(rules.referred_bonus),
        rules.commission_percent,
        stats.invited,
        stats.paid_referrals,
        format_money(stats.total_earned)
    );
    if !recent.is_empty() {
        text.push_str("\n\nПоследние приглашённые:");
        for r in recent {
            let mark = if r.first_reward_paid { "✅" } else { "⏳" };
            text.push_str(&format!(
                "\n{mark} {} · {}",
                escape_html(&r.display_name),
                format_money(r.earned)
            ));
        }
    }
    if !credits.is_empty() {
        text.push_str("\n\nПоследние начисления:");
        for c in credits {
            let kind = match c.kind {
                ReferralEarningKind::FirstReward => "бонус за друга",
                ReferralEarningKind::Commission => "процент",
                ReferralEarningKind::ReferredBonus => "подарок",
            };
            text.push_str(&format!(
                "\n+{} · {kind} · {}",
                format_money(c.amount),
                c.created_at.format("%d.%m.%Y")
            ));
        }
    }
    text
}

pub fn tickets(page: &PaginatedResponse<ticket_entity::Model>, title: &str) -> String {
    if page.items.is_empty() {
        return format!("{title}\n\nОбращений нет");
    }
    format!(
        "{title} (стр. {}/{}, всего {})",
        page.pagination.current_page, page.pagination.total_pages, page.pagination.total
    )
}

pub fn ticket_button(ticket: &ticket_entity::Model) -> String {
    let mut title: String = ticket.title.chars().take(30).collect();
    if ticket.title.chars().count() > 30 {
        title.push('…');
    }
    format!("#{} {} {}", ticket.id, ticket.status.label(), title)
}

pub fn ticket(view: &TicketWithMessages, for_admin: bool) -> String {
    let t = &view.ticket;
    let mut text = format!(
        "🎫 <b>Обращение #{}</b>\n{}\nСтатус: {} · приоритет: {}\nСоздано: {}",
        t.id,
        escape_html(&t.title),
        t.status.label(),
        t.priority.label(),
        date(t.created_at)
    );
    if for_admin {
        text.push_str(&format!("\nПользователь: <code>{}</code>", view.owner_telegram_id));
    }
    // keep clear of Telegram's 4096 limit
    let mut body = String::new();
    for m in view.messages.iter().rev() {
        let author = if m.is_from_admin { "🛠 Поддержка" } else { "👤 Вы" };
        let author = if for_admin && !m.is_from_admin { "👤 Пользователь" } else { author };
        let entry = format!(
            "\n\n<b>{author}</b> · {}\n{}",
            m.created_at.format("%d.%m %H:%M"),
            escape_html(&m.text)
        );
        if body.len() + entry.len() > 3000 {
            body.insert_str(0, "\n\n…");
            break;
        }
        body.insert_str(0, &entry);
    }
    text.push_str(&body);
    text
}

pub fn ticket_answered(ticket_id: i32) -> String {
    format!("💬 Поддержка ответила на обращение #{ticket_id}. Откройте «Поддержка», чтобы прочитать.")
}

pub fn new_ticket_for_admins(view: &TicketWithMessages) -> String {
    format!(
        "🆕 Новое обращение #{} от <code>{}</code>\n<b>{}</b>",
        view.ticket.id,
        view.owner_telegram_id,
        escape_html(&view.ticket.title)
    )
}

pub fn lucky_intro(config: &Config, next_play_at: Option<DateTime<Utc>>) -> String {
    let mut text = "🎰 <b>Игра удачи</b>\n\nПризы:".to_string();
    for prize in &config.lucky_game.prizes {
        text.push_str(&format!(
            "\n• {} — {:.1}%",
            escape_html(&prize.name),
            f64::from(prize.probability_bp) / 100.0
        ));
    }
    match next_play_at {
        Some(at) => text.push_str(&format!("\n\n⏳ Следующая попытка: {}", date(at))),
        None => text.push_str("\n\nПопытка доступна!"),
    }
    text
}

pub fn lucky_result(result: &LuckyGameResult) -> String {
    let head = if result.reward > 0 {
        format!(
            "🎉 Вы выиграли: <b>{}</b>!\n💰 Баланс: {}",
            escape_html(&result.prize_name),
            format_money(result.new_balance)
        )
    } else {
        format!("😔 {}", escape_html(&result.prize_name))
    };
    format!("{head}\n\n⏳ Следующая попытка: {}", date(result.next_play_at))
}

pub fn lucky_history(items: &[lucky_game_entity::Model]) -> String {
    items
        .iter()
        .map(|g| format!("{} · {}", g.played_at.format("%d.%m"), escape_html(&g.prize_name)))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn expired_notice() -> String {
    "⌛ Ваша подписка истекла. Продлите её в разделе «Купить подписку».".to_string()
}

pub fn expiring_notice(sub: &user_subscription_entity::Model) -> String {
    format!(
        "⏰ Подписка закончится {}. Не забудьте продлить её заранее.",
        date(sub.expires_at)
    )
}

pub fn dashboard(stats: &DashboardStats, revenue: &RevenueStats, tickets: &TicketCounts) -> String {
    format!(
        "📊 <b>Статистика</b>\n\n\
         👤 Пользователей: {} (сегодня +{}, заблокировано {})\n\
         🔐 Активных подписок: {} (пробных {})\n\n\
         💰 Выручка: {} · сегодня {} · за месяц {}\n\
         ⭐ Stars: {} · Tribute: {} · пополнений: {}\n\n\
         🎫 Обращения: открыто {}, с ответом {}, закрыто {}",
        stats.users_total,
        stats.users_new_today,
        stats.users_banned,
        stats.active_subscriptions,
        stats.trial_subscriptions,
        format_money(revenue.total),
        format_money(revenue.today),
        format_money(revenue.month),
        format_money(revenue.stars_total),
        format_money(revenue.tribute_total),
        revenue.topups_count,
        tickets.open,
        tickets.answered,
        tickets.closed
    )
}

pub fn panel_stats(stats: &SystemStats, squads: &[InternalSquad]) -> String {
    let mut statuses: Vec<_> = stats.users.status_counts.iter().collect();
    statuses.sort();
    let statuses = statuses
        .into_iter()
        .map(|(status, n)| format!("{status}: {n}"))
        .collect::<Vec<_>>()
        .join(", ");
    let gb = |bytes: u64| bytes as f64 / crate::utils::BYTES_IN_GB as f64;
    let squads = if squads.is_empty() {
        "нет".to_string()
    } else {
        squads
            .iter()
            .map(|s| escape_html(&s.name))
            .collect::<Vec<_>>()
            .join(", ")
    };
    format!(
        "🖥 <b>RemnaWave</b>\n\n\
         Пользователей: {} ({statuses})\n\
         Онлайн сейчас: {} · за сутки: {} · за неделю: {}\n\
         Нод онлайн: {}\n\
         Память: {:.1} / {:.1} ГБ\n\
         Сквады: {squads}",
        stats.users.total_users,
        stats.online_stats.online_now,
        stats.online_stats.last_day,
        stats.online_stats.last_week,
        stats.nodes.total_online,
        gb(stats.memory.used),
        gb(stats.memory.total)
    )
}

pub fn admin_user(
    user: &user_entity::Model,
    sub: Option<&user_subscription_entity::Model>,
) -> String {
    let username = user
        .username
        .as_deref()
        .map(|u| format!("@{}", escape_html(u)))
        .unwrap_or_else(|| "—".to_string());
    let sub_line = match sub {
        Some(s) => format!("до {}{}", date(s.expires_at), if s.is_trial { " (пробная)" } else { "" }),
        None => "нет".to_string(),
    };
    format!(
        "👤 <b>{}</b> {username}\nID: <code>{}</code> · #{}\n\
         💰 Баланс: {}\n🔐 Подписка: {sub_line}\n\
         Регистрация: {}\nАктивность: {}\n{}",
        escape_html(&user.display_name()),
        user.telegram_id,
        user.id,
        format_money(user.balance),
        date(user.created_at),
        date(user.last_activity),
        if user.is_banned { "⛔ Заблокирован" } else { "✅ Активен" }
    )
}

pub fn promocodes(page: &PaginatedResponse<promocode_entity::Model>, now: DateTime<Utc>) -> String {
    if page.items.is_empty() {
        return "🎟 Промокодов пока нет".to_string();
    }
    let mut text = format!(
        "🎟 <b>Промокоды</b> (стр. {}/{})\n",
        page.pagination.current_page, page.pagination.total_pages
    );
    for p in &page.items {
        let value = match p.kind {
            PromocodeKind::Balance => format_money(p.value),
            PromocodeKind::SubscriptionDays => format!("{} дн.", p.value),
        };
        let limit = if p.max_uses == 0 {
            "∞".to_string()
        } else {
            p.max_uses.to_string()
        };
        let state = if !p.is_active {
            "⛔"
        } else if p.is_expired_at(now) || p.is_exhausted() {
            "⌛"
        } else {
            "✅"
        };
        text.push_str(&format!(
            "\n{state} <code>{}</code> · {value} · {}/{limit}",
            escape_html(&p.code),
            p.current_uses
        ));
    }
    text
}

pub fn admin_plans(plans: &[plan_entity::Model]) -> String {
    if plans.is_empty() {
        return "📦 Тарифов пока нет".to_string();
    }
    let mut text = "📦 <b>Тарифы</b>\nНажмите на тариф, чтобы включить или выключить его.\n".to_string();
    for plan in plans {
        text.push_str(&format!(
            "\n{} #{} {} · {} · {} дн.",
            if plan.is_active { "✅" } else { "⛔" },
            plan.id,
            escape_html(&plan.name),
            format_money(plan.price),
            plan.duration_days
        ));
    }
    text
}

pub fn sync_report(report: &crate::models::SyncReport) -> String {
    format!(
        "🔄 Синхронизация завершена\n\nПроверено: {}\nОбновлено: {}\nОтключено: {}\nИмпортировано: {}\nОшибок: {}",
        report.checked, report.updated, report.deactivated, report.imported, report.errors
    )
}

pub fn broadcast_done(delivered: usize, failed: usize) -> String {
    format!("📣 Рассылка завершена: доставлено {delivered}, ошибок {failed}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn user() -> user_entity::Model {
        let now = Utc::now();
        user_entity::Model {
            id: 1,
            telegram_id: 42,
            username: None,
            first_name: Some("<Neo>".into()),
            last_name: None,
            language_code: None,
            balance: 19_950,
            referral_code: "ABCDEFGH".into(),
            referred_by_id: None,
            is_banned: false,
            has_had_trial: false,
            remnawave_uuid: None,
            last_lucky_play_at: None,
            last_activity: now,
            created_at: now,
            updated_at: now,
        }
    }

    fn subscription_row(expires_in: Duration) -> user_subscription_entity::Model {
        let now = Utc::now();
        user_subscription_entity::Model {
            id: 1,
            user_id: 1,
            subscription_id: None,
            remnawave_uuid: Some("uuid".into()),
            short_uuid: Some("short".into()),
            subscription_url: Some("https://sub.example.com/short".into()),
            expires_at: now + expires_in,
            traffic_limit_gb: 0,
            squad_uuids: None,
            is_active: true,
            is_trial: false,
            auto_renew: false,
            expiry_notified: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_main_menu_escapes_names() {
        let config = crate::services::test_support::test_config();
        let text = main_menu(&user(), &config, true);
        assert!(text.contains("&lt;Neo&gt;"));
        assert!(text.contains("199.50 ₽"));
    }

    #[test]
    fn test_subscription_text() {
        let now = Utc::now();
        assert!(subscription(None, now).contains("нет активной"));

        let active = subscription_row(Duration::days(10));
        let text = subscription(Some(&active), now);
        assert!(text.contains("активна"));
        assert!(text.contains("безлимит"));
        assert!(text.contains("https://sub.example.com/short"));

        let expired = subscription_row(Duration::days(-1));
        assert!(subscription(Some(&expired), now).contains("истекла"));
    }
}
