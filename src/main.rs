use std::env;
use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use coupon_admission::config::Config;
use coupon_admission::counter::{CounterError, MemoryCounter, StockCounter};
use coupon_admission::csv::{read_commands, read_events, write_coupons};
use coupon_admission::engine::EngineError;
use coupon_admission::{Coupon, Engine};
use tokio_stream::wrappers::ReceiverStream;
use tracing::level_filters::LevelFilter;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(LevelFilter::WARN.into()))
        .with_writer(io::stderr)
        .init();

    let mut args = env::args().skip(1);
    let (Some(events_path), Some(commands_path)) = (args.next(), args.next()) else {
        error!("usage: coupon-admission <events.csv> <commands.csv>");
        return ExitCode::FAILURE;
    };

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let counter = match stock_counter(&config).await {
        Ok(counter) => counter,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let advisor = match config.reward_advisor() {
        Ok(advisor) => advisor,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let engine = Engine::builder()
        .mode(config.admission_mode)
        .counter(counter)
        .build();
    info!(mode = ?engine.mode(), "engine ready");

    let events = match read_events(&events_path) {
        Ok(events) => events,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    for result in events {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!("{e}");
                continue;
            }
        };
        let event = match engine.register_event(record.event).await {
            Ok(event) => event,
            Err(e) => {
                warn!("{e}");
                continue;
            }
        };
        // advisory only: a failed recommendation keeps the csv reward
        if let (Some(advisor), Some(profile)) = (&advisor, &record.reward) {
            if let Err(e) = engine
                .apply_reward_recommendation(event.id, advisor, profile)
                .await
            {
                warn!(event = event.id, "{e}");
            }
        }
    }

    let commands = match read_commands(commands_path) {
        Ok(commands) => commands,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let (command_sender, command_receiver) = tokio::sync::mpsc::channel(16);

    tokio::spawn(async move {
        for result in commands {
            match result {
                Ok(command) => {
                    if command_sender.send(command).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("{e}");
                }
            }
        }
    });

    engine.run(ReceiverStream::new(command_receiver)).await;

    let coupons = match ledger(&engine).await {
        Ok(coupons) => coupons,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = write_coupons(io::stdout().lock(), &coupons) {
        error!("failed to write coupons: {e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn stock_counter(config: &Config) -> Result<Arc<dyn StockCounter>, CounterError> {
    #[cfg(feature = "redis")]
    {
        if let Some(url) = &config.redis_url {
            let counter = coupon_admission::counter::RedisCounter::new(url).await?;
            return Ok(Arc::new(counter));
        }
    }
    #[cfg(not(feature = "redis"))]
    {
        if config.redis_url.is_some() {
            warn!("REDIS_URL is set but the `redis` feature is disabled; using in-memory counter");
        }
    }
    Ok(Arc::new(MemoryCounter::new()))
}

/// Every ledger entry, in coupon id order.
async fn ledger(engine: &Engine) -> Result<Vec<Coupon>, EngineError> {
    let mut coupons = Vec::new();
    for view in engine.list_events().await? {
        coupons.extend(engine.event_coupons(view.event.id).await?);
    }
    coupons.sort_by_key(|c| c.id);
    Ok(coupons)
}
