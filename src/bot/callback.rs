//! Inline-button payloads. Telegram caps callback data at 64 bytes, so every
//! action is a short `tag[:arg[:arg]]` string.

use crate::entities::TicketPriority;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    Menu,
    Cancel,
    Plans,
    Buy(i32),
    ConfirmBuy(i32),
    MySubscription,
    Trial,
    Balance,
    History(u64),
    Topup,
    TopupStars(i64),
    TopupCustom,
    Promocode,
    Referral,
    Support,
    TicketNew,
    Tickets(u64),
    Ticket(i32),
    TicketReply(i32),
    TicketClose(i32),
    LuckyGame,
    LuckyPlay,
    Admin,
    AdminStats,
    AdminPanelStats,
    AdminUserSearch,
    AdminUser(i32),
    AdminBalance(i32),
    AdminBan(i32, bool),
    AdminResetTraffic(i32),
    AdminRevoke(i32),
    AdminPlans,
    AdminPlanNew,
    AdminPlanToggle(i32),
    AdminPromos(u64),
    AdminPromoNew,
    AdminPromoOff(i32),
    AdminTickets(u64),
    AdminTicket(i32),
    AdminTicketReply(i32),
    AdminTicketClose(i32),
    AdminTicketReopen(i32),
    AdminTicketPriority(i32, TicketPriority),
    AdminSync,
    AdminBroadcast,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownAction(pub String);

impl fmt::Display for CallbackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use CallbackAction::*;
        match self {
            Menu => write!(f, "menu"),
            Cancel => write!(f, "cancel"),
            Plans => write!(f, "plans"),
            Buy(id) => write!(f, "buy:{id}"),
            ConfirmBuy(id) => write!(f, "buy_ok:{id}"),
            MySubscription => write!(f, "my_sub"),
            Trial => write!(f, "trial"),
            Balance => write!(f, "balance"),
            History(page) => write!(f, "history:{page}"),
            Topup => write!(f, "topup"),
            TopupStars(amount) => write!(f, "stars:{amount}"),
            TopupCustom => write!(f, "stars_custom"),
            Promocode => write!(f, "promo"),
            Referral => write!(f, "referral"),
            Support => write!(f, "support"),
            TicketNew => write!(f, "t_new"),
            Tickets(page) => write!(f, "t_list:{page}"),
            Ticket(id) => write!(f, "t:{id}"),
            TicketReply(id) => write!(f, "t_reply:{id}"),
            TicketClose(id) => write!(f, "t_close:{id}"),
            LuckyGame => write!(f, "lucky"),
            LuckyPlay => write!(f, "lucky_play"),
            Admin => write!(f, "adm"),
            AdminStats => write!(f, "adm_stats"),
            AdminPanelStats => write!(f, "adm_panel"),
            AdminUserSearch => write!(f, "adm_search"),
            AdminUser(id) => write!(f, "adm_u:{id}"),
            AdminBalance(id) => write!(f, "adm_bal:{id}"),
            AdminBan(id, banned) => write!(f, "adm_ban:{id}:{}", u8::from(*banned)),
            AdminResetTraffic(id) => write!(f, "adm_traffic:{id}"),
            AdminRevoke(id) => write!(f, "adm_revoke:{id}"),
            AdminPlans => write!(f, "adm_plans"),
            AdminPlanNew => write!(f, "adm_plan_new"),
            AdminPlanToggle(id) => write!(f, "adm_plan:{id}"),
            AdminPromos(page) => write!(f, "adm_promos:{page}"),
            AdminPromoNew => write!(f, "adm_promo_new"),
            AdminPromoOff(id) => write!(f, "adm_promo_off:{id}"),
            AdminTickets(page) => write!(f, "adm_t_list:{page}"),
            AdminTicket(id) => write!(f, "adm_t:{id}"),
            AdminTicketReply(id) => write!(f, "adm_t_reply:{id}"),
            AdminTicketClose(id) => write!(f, "adm_t_close:{id}"),
            AdminTicketReopen(id) => write!(f, "adm_t_open:{id}"),
            AdminTicketPriority(id, p) => write!(f, "adm_t_prio:{id}:{}", p.as_str()),
            AdminSync => write!(f, "adm_sync"),
            AdminBroadcast => write!(f, "adm_bc"),
        }
    }
}

impl From<CallbackAction> for String {
    fn from(action: CallbackAction) -> Self {
        action.to_string()
    }
}

impl FromStr for CallbackAction {
    type Err = UnknownAction;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        use CallbackAction::*;
        let unknown = || UnknownAction(raw.to_string());
        let mut parts = raw.split(':');
        let tag = parts.next().unwrap_or_default();
        let args: Vec<&str> = parts.collect();

        let id = |i: usize| -> Result<i32, UnknownAction> {
            args.get(i)
                .and_then(|s| s.parse().ok())
                .ok_or_else(unknown)
        };
        let page = || -> Result<u64, UnknownAction> {
            args.first()
                .and_then(|s| s.parse::<u64>().ok())
                .map(|p| p.max(1))
                .ok_or_else(unknown)
        };
        let expect_args = |n: usize| {
            if args.len() == n {
                Ok(())
            } else {
                Err(unknown())
            }
        };

        let action = match tag {
            "menu" => Menu,
            "cancel" => Cancel,
            "plans" => Plans,
            "buy" => Buy(id(0)?),
            "buy_ok" => ConfirmBuy(id(0)?),
            "my_sub" => MySubscription,
            "trial" => Trial,
            "balance" => Balance,
            "history" => History(page()?),
            "topup" => Topup,
            "stars" => TopupStars(
                args.first()
                    .and_then(|s| s.parse::<i64>().ok())
                    .filter(|a| *a > 0)
                    .ok_or_else(unknown)?,
            ),
            "stars_custom" => TopupCustom,
            "promo" => Promocode,
            "referral" => Referral,
            "support" => Support,
            "t_new" => TicketNew,
            "t_list" => Tickets(page()?),
            "t" => Ticket(id(0)?),
            "t_reply" => TicketReply(id(0)?),
            "t_close" => TicketClose(id(0)?),
            "lucky" => LuckyGame,
            "lucky_play" => LuckyPlay,
            "adm" => Admin,
            "adm_stats" => AdminStats,
            "adm_panel" => AdminPanelStats,
            "adm_search" => AdminUserSearch,
            "adm_u" => AdminUser(id(0)?),
            "adm_bal" => AdminBalance(id(0)?),
            "adm_ban" => {
                expect_args(2)?;
                let banned = match args[1] {
                    "1" => true,
                    "0" => false,
                    _ => return Err(unknown()),
                };
                AdminBan(id(0)?, banned)
            }
            "adm_traffic" => AdminResetTraffic(id(0)?),
            "adm_revoke" => AdminRevoke(id(0)?),
            "adm_plans" => AdminPlans,
            "adm_plan_new" => AdminPlanNew,
            "adm_plan" => AdminPlanToggle(id(0)?),
            "adm_promos" => AdminPromos(page()?),
            "adm_promo_new" => AdminPromoNew,
            "adm_promo_off" => AdminPromoOff(id(0)?),
            "adm_t_list" => AdminTickets(page()?),
            "adm_t" => AdminTicket(id(0)?),
            "adm_t_reply" => AdminTicketReply(id(0)?),
            "adm_t_close" => AdminTicketClose(id(0)?),
            "adm_t_open" => AdminTicketReopen(id(0)?),
            "adm_t_prio" => {
                expect_args(2)?;
                let priority = TicketPriority::parse(args[1]).ok_or_else(unknown)?;
                AdminTicketPriority(id(0)?, priority)
            }
            "adm_sync" => AdminSync,
            "adm_bc" => AdminBroadcast,
            _ => return Err(unknown()),
        };
        Ok(action)
    }
}

impl CallbackAction {
    /// Admin-only actions are rejected for regular users before dispatch
    pub fn requires_admin(&self) -> bool {
        self.to_string().starts_with("adm")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actions_survive_formatting() {
        let actions = [
            CallbackAction::Menu,
            CallbackAction::Buy(12),
            CallbackAction::History(3),
            CallbackAction::TopupStars(25_000),
            CallbackAction::AdminBan(7, true),
            CallbackAction::AdminBan(7, false),
            CallbackAction::AdminRevoke(7),
            CallbackAction::AdminTicketPriority(5, TicketPriority::Urgent),
            CallbackAction::AdminPromos(2),
        ];
        for action in actions {
            let raw = action.to_string();
            assert!(raw.len() <= 64, "{raw} is too long");
            assert_eq!(raw.parse::<CallbackAction>(), Ok(action));
        }
    }

    #[test]
    fn test_rejects_garbage() {
        assert!("".parse::<CallbackAction>().is_err());
        assert!("buy".parse::<CallbackAction>().is_err());
        assert!("buy:x".parse::<CallbackAction>().is_err());
        assert!("stars:-5".parse::<CallbackAction>().is_err());
        assert!("adm_ban:1:2".parse::<CallbackAction>().is_err());
        assert!("adm_t_prio:1:critical".parse::<CallbackAction>().is_err());
        assert!("whatever".parse::<CallbackAction>().is_err());
    }

    #[test]
    fn test_page_is_at_least_one() {
        assert_eq!(
            "history:0".parse::<CallbackAction>(),
            Ok(CallbackAction::History(1))
        );
    }

    #[test]
    fn test_admin_actions_are_flagged() {
        assert!(CallbackAction::AdminSync.requires_admin());
        assert!(CallbackAction::AdminUser(1).requires_admin());
        assert!(!CallbackAction::Balance.requires_admin());
        assert!(!CallbackAction::Ticket(1).requires_admin());
    }
}
