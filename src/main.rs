use actix_web::{App, HttpServer, middleware::Logger, web};
use anyhow::Context;
use chrono::Local; // timestamp in log lines
use env_logger::{Env, Target};
use std::io::Write; // for env_logger custom formatter
use std::sync::Arc;
use teloxide::prelude::*;

use remna_shop_bot::{
    bot,
    config::Config,
    database::{create_pool, run_migrations},
    external::{PanelApi, RemnaWaveClient},
    handlers,
    services::ServiceRegistry,
    swagger::swagger_config,
    tasks,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            let ts = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z");
            let level = record.level().as_str().to_ascii_lowercase();
            let msg_json = serde_json::to_string(&format!("{}", record.args()))
                .unwrap_or_else(|_| "\"<invalid utf8>\"".to_string());
            writeln!(
                buf,
                "{{\"timestamp\":\"{}\",\"level\":\"{}\",\"message\":{},\"target\":\"{}\"}}",
                ts,
                level,
                msg_json,
                record.target(),
            )
        })
        .target(Target::Stdout)
        .init();

    let mut config = Config::from_toml().context("Failed to load configuration")?;

    let telegram = Bot::new(config.bot.token.clone());
    // referral links need the bot username
    if config.bot.username.is_none() {
        match telegram.get_me().await {
            Ok(me) => config.bot.username = me.username.clone(),
            Err(e) => log::warn!("Cannot resolve bot username: {e}"),
        }
    }
    let config = Arc::new(config);

    let pool = create_pool(&config.database)
        .await
        .context("Failed to create database connection pool")?;
    run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let panel: Arc<dyn PanelApi> = Arc::new(
        RemnaWaveClient::new(config.remnawave.clone()).context("Failed to create panel client")?,
    );
    let services = ServiceRegistry::new(pool.clone(), config.clone(), panel);

    tasks::spawn_all(services.clone(), telegram.clone());

    log::info!(
        "Starting HTTP server at {}:{}",
        config.server.host,
        config.server.port
    );
    let server = {
        let services = services.clone();
        let telegram = telegram.clone();
        HttpServer::new(move || {
            App::new()
                .wrap(Logger::default())
                .app_data(web::Data::new(services.clone()))
                .app_data(web::Data::new(telegram.clone()))
                .app_data(web::Data::new(pool.clone()))
                .configure(swagger_config)
                .configure(handlers::webhook_config)
        })
        .bind((config.server.host.as_str(), config.server.port))?
        .run()
    };
    let server_handle = server.handle();

    tokio::select! {
        res = server => res.context("HTTP server failed")?,
        _ = bot::run_bot(telegram, services) => {
            log::info!("Bot stopped, shutting down HTTP server");
            server_handle.stop(true).await;
        }
    }
    Ok(())
}
