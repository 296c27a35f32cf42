use anyhow::Result;
use rollcall_api::AttendanceClient;
use rollcall_core::SimilarityComparator;
use rollcall_store::{DescriptorCipher, Store};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod checkin;
mod config;
mod dbus_interface;
mod engine;

use checkin::CheckinFlow;
use config::Config;
use dbus_interface::{RollcallService, StatusInfo};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("rollcalld starting");

    let config = Config::from_env();

    let cipher = Arc::new(DescriptorCipher::load_or_generate(&config.key_path)?);
    let store = Store::open(&config.db_path, cipher.clone()).await?;

    // Fail-fast: camera and models are opened before the bus name is taken.
    let comparator = SimilarityComparator::new(config.max_distance);
    let engine = engine::spawn_engine(
        &config.camera_device,
        &config.detector_model_path(),
        &config.encoder_model_path(),
        config.warmup_frames,
        comparator,
        config.similarity_threshold,
    )?;

    if config.api_token.is_empty() {
        tracing::warn!("ROLLCALL_API_TOKEN is empty; attendance service posts will be rejected");
    }
    let api = AttendanceClient::new(&config.api_base_url, &config.api_token, config.api_timeout())?;

    let flow = CheckinFlow::new(
        engine.clone(),
        store.clone(),
        api,
        config.frames_per_verify,
    );
    let service = RollcallService::new(
        flow,
        engine,
        store,
        StatusInfo {
            camera_device: config.camera_device.clone(),
            similarity_threshold: config.similarity_threshold,
            max_distance: config.max_distance,
            api_base_url: config.api_base_url.clone(),
            key_fingerprint: cipher.fingerprint().to_string(),
        },
        config.frames_per_verify,
        config.frames_per_enroll,
    );

    let _conn = zbus::connection::Builder::session()?
        .name("org.ngo.Rollcall1")?
        .serve_at("/org/ngo/Rollcall1", service)?
        .build()
        .await?;

    tracing::info!("rollcalld ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("rollcalld shutting down");

    Ok(())
}
