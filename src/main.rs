//! Seat-hold service entry point: wires up the record store, lock/overlay
//! store, event log, and starts the HTTP surface alongside the reconciler
//! and expiry-signaler background tasks.

use std::sync::Arc;

use seat_hold_exchange::config::AppConfig;
use seat_hold_exchange::db::Database;
use seat_hold_exchange::holds::consumer::TransitionConsumer;
use seat_hold_exchange::holds::db::RecordStore;
use seat_hold_exchange::holds::eventlog::{self, KafkaEventLogBuilder};
use seat_hold_exchange::holds::lockstore::RedisLockStore;
use seat_hold_exchange::holds::signaler::SEAT_STATE_TRANSITIONS_TOPIC;
use seat_hold_exchange::holds::{HoldOrchestrator, ReadAssembler, Reconciler, ReconcilerConfig};
use seat_hold_exchange::http::{self, AppState};
use seat_hold_exchange::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env();
    let _log_guard = logging::init_logging(&config.logging);

    tracing::info!("starting seat-hold service");

    let database = Database::connect(&config.database_url).await?;
    database.health_check().await?;
    let db = Arc::new(RecordStore::new(database.pool().clone()));

    let lock_store = Arc::new(RedisLockStore::connect(&config.redis_url).await?);
    let publisher = Arc::new(
        KafkaEventLogBuilder::new(&config.kafka_brokers)
            .client_id("seat-hold-service")
            .build()?,
    );

    let orchestrator = Arc::new(
        HoldOrchestrator::new(db.clone(), lock_store.clone(), publisher.clone())
            .with_max_seats_per_hold(config.max_seats_per_hold)
            .with_hold_duration(config.hold_duration)
            .with_operation_timeout(config.operation_timeout),
    );
    let read_assembler = Arc::new(ReadAssembler::new(db.clone(), lock_store.clone()));

    let reconciler = Reconciler::new(
        db.clone(),
        lock_store.clone(),
        publisher.clone(),
        ReconcilerConfig {
            enabled: config.reconciler_enabled,
            tick_interval: config.reconciler_interval,
        },
    );
    tokio::spawn(async move { reconciler.run().await });

    {
        let lock_store = lock_store.clone();
        let publisher = publisher.clone();
        tokio::spawn(async move {
            if let Err(e) = seat_hold_exchange::holds::signaler::run(lock_store, publisher).await {
                tracing::error!(error = %e, "expiry signaler exited");
            }
        });
    }

    // C6: consumes `seat-state-transitions`, partitioned by `{eventId}:{seatId}`
    // so ordering per seat is preserved by the consumer group.
    {
        let (mut rx, _subscribe_handle) = eventlog::subscribe(
            &config.kafka_brokers,
            "seat-hold-transition-consumer",
            SEAT_STATE_TRANSITIONS_TOPIC,
        )?;
        let consumer = TransitionConsumer::new(db.clone(), lock_store.clone(), publisher.clone());
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let payload = message.payload.clone();
                match consumer.handle(payload).await {
                    Ok(()) => message.ack(),
                    Err(e) => {
                        tracing::error!(error = %e, "state-transition consumer failed, message left unacked for redelivery");
                        message.nack();
                    }
                }
            }
        });
    }

    let state = AppState {
        orchestrator,
        read_assembler,
    };
    let app = http::router(state);

    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    tracing::info!(addr = %config.http_addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
