pub use sea_orm_migration::prelude::*;

mod m20250901_000001_initial;
mod m20250905_000001_add_referrals;
mod m20250910_000001_add_tickets;
mod m20250915_000001_add_lucky_games_and_stars;
mod m20250920_000001_add_subscription_renewal;
mod m20250925_000001_add_lucky_play_guard;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250901_000001_initial::Migration),
            Box::new(m20250905_000001_add_referrals::Migration),
            Box::new(m20250910_000001_add_tickets::Migration),
            Box::new(m20250915_000001_add_lucky_games_and_stars::Migration),
            Box::new(m20250920_000001_add_subscription_renewal::Migration),
            Box::new(m20250925_000001_add_lucky_play_guard::Migration),
        ]
    }
}
