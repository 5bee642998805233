use anyhow::Result;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;

use dbus_interface::{MoodlensService, BUS_NAME, OBJECT_PATH};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("moodlensd starting");

    let config = config::Config::from_env();
    let engine = engine::spawn_engine(&config)?;

    let service = MoodlensService::new(engine.clone(), config.overlay, config.advanced_stats);

    let connection = zbus::connection::Builder::session()?
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await?;

    tracing::info!(bus = BUS_NAME, path = OBJECT_PATH, "moodlensd ready");

    // Forward each completed cycle to D-Bus subscribers as a signal.
    let iface = connection
        .object_server()
        .interface::<_, MoodlensService>(OBJECT_PATH)
        .await?;
    let mut updates = engine.subscribe();
    let (overlay, advanced_stats) = (config.overlay, config.advanced_stats);
    let forwarder = tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            // Hold the watch guard only long enough to clone the update out.
            let update = updates.borrow_and_update().clone();
            let Some(update) = update else { continue };

            let payload =
                dbus_interface::render_payload(&update, overlay, advanced_stats).to_string();
            if let Err(e) =
                MoodlensService::emotion_cycle(iface.signal_emitter(), payload).await
            {
                tracing::warn!(error = %e, "failed to emit emotion_cycle signal");
            }
        }
        tracing::info!("engine update stream closed");
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("moodlensd shutting down");

    // Stop the engine first so the update stream closes and the forwarder
    // drains out; both handles are released on every exit path.
    engine.stop().await;
    forwarder.abort();

    Ok(())
}
