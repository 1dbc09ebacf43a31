#[macro_use]
extern crate rocket;

mod api;
mod background;
mod common;
mod config;
mod storage;
mod utils;

use anyhow::Result;
use dotenv::dotenv;
use log::info;
use rocket::data::ByteUnit;
use rocket::{Build, Rocket};

use crate::api::generate_catchers;
use crate::api::handlers::cleanup::generate_cleanup_routes;
use crate::api::handlers::media::generate_media_routes;
use crate::background::sweeper::Sweeper;
use crate::config::ServiceConfig;
use crate::storage::ArtifactStore;

fn build_rocket(config: ServiceConfig, store: ArtifactStore) -> Rocket<Build> {
    let upload_limit = ByteUnit::Mebibyte(config.max_upload_mib);
    let figment = rocket::Config::figment()
        .merge(("port", config.port))
        .merge(("limits.file", upload_limit))
        // Headroom for the multipart framing around the file itself.
        .merge(("limits.data-form", upload_limit + ByteUnit::Mebibyte(1)));

    rocket::custom(figment)
        .manage(config)
        .manage(store)
        .mount("/", generate_media_routes())
        .mount("/", generate_cleanup_routes())
        .register("/", generate_catchers())
}

#[rocket::main]
async fn main() -> Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServiceConfig::from_env()?;
    let store = ArtifactStore::from_config(&config);
    store.ensure_dirs()?;

    // Both sweep timers fire immediately, so startup hygiene happens before
    // the first upload can land.
    info!("Performing startup cleanup...");
    let sweeper_handle = Sweeper::new(store.clone(), &config).start();

    info!("Server listening on port {}", config.port);
    let result = build_rocket(config, store).launch().await;
    sweeper_handle.stop();
    result?;

    Ok(())
}
