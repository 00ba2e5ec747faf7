mod access;
mod auth;
mod availability;
mod barbers;
mod booking;
mod config;
mod db;
mod error;
mod ledger;
mod lifecycle;
mod models;
mod push;
mod routes;
mod services;
mod settings;
mod slots;
mod state;

use actix_web::{middleware, web, App, HttpServer};

use crate::{config::Config, state::AppState};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    if let Err(err) = run().await {
        eprintln!("Startup error: {err}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .init();

    let config = Config::from_env();
    let pool = db::connect(&config).await?;

    db::run_migrations(&pool).await?;
    db::seed_defaults(&pool).await?;
    let shop = settings::load(&pool).await?;
    log::info!(
        "Shop '{}' loaded, booking horizon {} days",
        shop.shop_name,
        shop.booking_horizon_days
    );

    let state = AppState::new(pool.clone(), config.push);
    actix_web::rt::spawn(push::run_dispatcher(
        pool,
        state.push.clone(),
        state.events.subscribe(),
    ));

    let address = format!("0.0.0.0:{}", config.port);
    log::info!("Starting Barberbook on http://{address}");

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(middleware::Logger::default())
            .configure(routes::public::configure)
            .configure(routes::appointments::configure)
            .configure(routes::barber::configure)
            .configure(routes::admin::configure)
            .configure(routes::events::configure)
    })
    .bind(address)?
    .run()
    .await?;

    Ok(())
}
