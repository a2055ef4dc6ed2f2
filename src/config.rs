use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub bot: BotConfig,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub remnawave: RemnaWaveConfig,
    #[serde(default)]
    pub payments: PaymentsConfig,
    #[serde(default)]
    pub referral: ReferralConfig,
    #[serde(default)]
    pub trial: TrialConfig,
    #[serde(default)]
    pub lucky_game: LuckyGameConfig,
    #[serde(default)]
    pub support: SupportConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    pub token: String,
    #[serde(default)]
    pub admin_ids: Vec<i64>,
    #[serde(default)]
    pub support_username: Option<String>,
    /// Filled from `getMe` at start-up when absent
    #[serde(default)]
    pub username: Option<String>,
    /// news channel shown in the main menu
    #[serde(default)]
    pub channel_link: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemnaWaveConfig {
    pub base_url: String,
    pub api_token: String,
    #[serde(default)]
    pub default_squad_uuids: Vec<String>,
    #[serde(default = "default_username_prefix")]
    pub username_prefix: String,
}

fn default_username_prefix() -> String {
    "tg".to_string()
}

/// Amounts are in kopecks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentsConfig {
    pub currency: String,
    pub min_topup: i64,
    pub max_topup: i64,
    pub stars_enabled: bool,
    /// kopecks credited per star
    pub stars_rate: i64,
    pub tribute_enabled: bool,
    #[serde(default)]
    pub tribute_api_key: String,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            currency: "RUB".to_string(),
            min_topup: 10_000,
            max_topup: 10_000_000,
            stars_enabled: true,
            stars_rate: 130,
            tribute_enabled: false,
            tribute_api_key: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferralConfig {
    pub min_topup_for_first_reward: i64,
    pub first_reward: i64,
    pub referred_bonus: i64,
    pub commission_percent: i64,
}

impl Default for ReferralConfig {
    fn default() -> Self {
        Self {
            min_topup_for_first_reward: 10_000,
            first_reward: 10_000,
            referred_bonus: 5_000,
            commission_percent: 25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrialConfig {
    pub enabled: bool,
    pub duration_days: i64,
    pub traffic_limit_gb: i32,
    #[serde(default)]
    pub squad_uuids: Vec<String>,
}

impl Default for TrialConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            duration_days: 3,
            traffic_limit_gb: 10,
            squad_uuids: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LuckyPrize {
    pub name: String,
    /// kopecks, 0 for "no win"
    pub reward: i64,
    /// basis points, 10000 = 100%
    pub probability_bp: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LuckyGameConfig {
    pub enabled: bool,
    pub cooldown_hours: i64,
    pub prizes: Vec<LuckyPrize>,
}

impl Default for LuckyGameConfig {
    fn default() -> Self {
        let prize = |name: &str, reward: i64, probability_bp: i32| LuckyPrize {
            name: name.to_string(),
            reward,
            probability_bp,
        };
        Self {
            enabled: true,
            cooldown_hours: 24,
            prizes: vec![
                prize("Повезёт в следующий раз", 0, 6000),
                prize("10 ₽ на баланс", 1_000, 2500),
                prize("25 ₽ на баланс", 2_500, 1000),
                prize("50 ₽ на баланс", 5_000, 400),
                prize("100 ₽ на баланс", 10_000, 100),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupportConfig {
    pub max_open_tickets: u64,
}

impl Default for SupportConfig {
    fn default() -> Self {
        Self { max_open_tickets: 3 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub enabled: bool,
    pub interval_minutes: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_minutes: 30,
        }
    }
}

fn get_env(name: &str) -> Option<String> {
    env::var(name).ok()
}

fn get_env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

/// "1, 2,3" -> [1, 2, 3]; invalid items are skipped
pub fn parse_id_list(raw: &str) -> Vec<i64> {
    raw.split(',')
        .filter_map(|s| s.trim().parse::<i64>().ok())
        .collect()
}

fn parse_str_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Config {
    pub fn from_toml() -> AppResult<Self> {
        let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        use std::io::ErrorKind;

        let mut config: Config = match std::fs::read_to_string(&config_path) {
            Ok(config_str) => Self::parse(&config_str)?,
            Err(e) if e.kind() == ErrorKind::NotFound => Self::from_env_only()?,
            Err(e) => {
                return Err(AppError::ConfigError(format!(
                    "cannot read config file {config_path}: {e}"
                )));
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn parse(raw: &str) -> AppResult<Self> {
        toml::from_str(raw).map_err(|e| AppError::ConfigError(format!("invalid config: {e}")))
    }

    fn from_env_only() -> AppResult<Self> {
        let token = get_env("BOT_TOKEN").ok_or_else(|| {
            AppError::ConfigError("BOT_TOKEN is not set and config.toml was not found".into())
        })?;
        let database_url = get_env("DATABASE_URL").ok_or_else(|| {
            AppError::ConfigError("DATABASE_URL is not set and config.toml was not found".into())
        })?;

        Ok(Config {
            bot: BotConfig {
                token,
                admin_ids: get_env("ADMIN_IDS")
                    .map(|v| parse_id_list(&v))
                    .unwrap_or_default(),
                support_username: get_env("SUPPORT_USERNAME"),
                username: get_env("BOT_USERNAME"),
                channel_link: get_env("CHANNEL_LINK"),
            },
            server: ServerConfig {
                host: get_env("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: get_env_parse("SERVER_PORT", 8080u16),
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections: get_env_parse("DB_MAX_CONNECTIONS", 10u32),
            },
            remnawave: RemnaWaveConfig {
                base_url: get_env("REMNAWAVE_URL")
                    .unwrap_or_else(|| "http://localhost:3000".to_string()),
                api_token: get_env("REMNAWAVE_TOKEN").unwrap_or_default(),
                default_squad_uuids: get_env("REMNAWAVE_SQUADS")
                    .map(|v| parse_str_list(&v))
                    .unwrap_or_default(),
                username_prefix: get_env("REMNAWAVE_USERNAME_PREFIX")
                    .unwrap_or_else(default_username_prefix),
            },
            payments: PaymentsConfig::default(),
            referral: ReferralConfig::default(),
            trial: TrialConfig::default(),
            lucky_game: LuckyGameConfig::default(),
            support: SupportConfig::default(),
            sync: SyncConfig::default(),
        })
    }

    // Environment wins over the file
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = env::var("BOT_TOKEN") {
            self.bot.token = v;
        }
        if let Ok(v) = env::var("ADMIN_IDS") {
            self.bot.admin_ids = parse_id_list(&v);
        }
        if let Ok(v) = env::var("SUPPORT_USERNAME") {
            self.bot.support_username = Some(v);
        }
        if let Ok(v) = env::var("CHANNEL_LINK") {
            self.bot.channel_link = Some(v);
        }
        if let Ok(v) = env::var("SERVER_HOST") {
            self.server.host = v;
        }
        if let Ok(v) = env::var("SERVER_PORT")
            && let Ok(p) = v.parse()
        {
            self.server.port = p;
        }
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = v;
        }
        if let Ok(v) = env::var("DB_MAX_CONNECTIONS")
            && let Ok(mc) = v.parse()
        {
            self.database.max_connections = mc;
        }
        if let Ok(v) = env::var("REMNAWAVE_URL") {
            self.remnawave.base_url = v;
        }
        if let Ok(v) = env::var("REMNAWAVE_TOKEN") {
            self.remnawave.api_token = v;
        }
        if let Ok(v) = env::var("REMNAWAVE_SQUADS") {
            self.remnawave.default_squad_uuids = parse_str_list(&v);
        }
        if let Ok(v) = env::var("TRIBUTE_API_KEY") {
            self.payments.tribute_api_key = v;
            self.payments.tribute_enabled = true;
        }
        if let Ok(v) = env::var("STARS_RATE")
            && let Ok(rate) = v.parse()
        {
            self.payments.stars_rate = rate;
        }
    }

    fn validate(&self) -> AppResult<()> {
        if self.bot.token.trim().is_empty() {
            return Err(AppError::ConfigError("bot.token is empty".into()));
        }
        if self.payments.stars_rate <= 0 {
            return Err(AppError::ConfigError(
                "payments.stars_rate must be positive".into(),
            ));
        }
        if self.payments.min_topup > self.payments.max_topup {
            return Err(AppError::ConfigError(
                "payments.min_topup is greater than payments.max_topup".into(),
            ));
        }
        if !(0..=100).contains(&self.referral.commission_percent) {
            return Err(AppError::ConfigError(
                "referral.commission_percent must be within 0..=100".into(),
            ));
        }
        if self.lucky_game.enabled {
            let total: i32 = self.lucky_game.prizes.iter().map(|p| p.probability_bp).sum();
            if total <= 0 {
                return Err(AppError::ConfigError(
                    "lucky_game.prizes must have a positive total probability".into(),
                ));
            }
        }
        Ok(())
    }

    pub fn is_admin(&self, telegram_id: i64) -> bool {
        self.bot.admin_ids.contains(&telegram_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [bot]
        token = "123:abc"
        admin_ids = [42]

        [server]
        host = "127.0.0.1"
        port = 8081

        [database]
        url = "sqlite::memory:"
        max_connections = 1

        [remnawave]
        base_url = "https://panel.example.com"
        api_token = "secret"
    "#;

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config = Config::parse(MINIMAL).unwrap();
        assert_eq!(config.bot.admin_ids, vec![42]);
        assert_eq!(config.remnawave.username_prefix, "tg");
        assert_eq!(config.payments.currency, "RUB");
        assert_eq!(config.support.max_open_tickets, 3);
        assert!(config.validate().is_ok());
        assert!(config.is_admin(42));
        assert!(!config.is_admin(7));
    }

    #[test]
    fn test_parse_id_list_skips_garbage() {
        assert_eq!(parse_id_list("1, 2,x,3"), vec![1, 2, 3]);
        assert!(parse_id_list("").is_empty());
    }

    #[test]
    fn test_validate_rejects_bad_commission() {
        let mut config = Config::parse(MINIMAL).unwrap();
        config.referral.commission_percent = 150;
        assert!(matches!(config.validate(), Err(AppError::ConfigError(_))));
    }

    #[test]
    fn test_default_lucky_prizes_sum_to_full_probability() {
        let total: i32 = LuckyGameConfig::default()
            .prizes
            .iter()
            .map(|p| p.probability_bp)
            .sum();
        assert_eq!(total, 10_000);
    }
}
