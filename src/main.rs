use actix_server::ServerHandle;
use actix_web::{App, HttpServer, web::Data};
use anyhow::{Context, Result};
use connectivity_manager::{
    api::Api,
    config::AppConfig,
    registry_client::FirestoreClient,
    services::{
        access_point::AccessPointController,
        indicator::{self, GpioIndicator, Indicator, Signal},
        monitor::ConnectivityMonitor,
        probe::NetworkProbe,
        provisioning::ProvisioningService,
        radio::Radio,
        registry::{RegistrySync, RetryPolicy},
        uplink::UplinkConfigurator,
    },
    wifi_driver::SystemWifiDriver,
};
use env_logger::{Builder, Env, Target};
use log::{debug, error, info, warn};
use std::{io::Write, sync::Arc};
use tokio::{
    signal::unix::{SignalKind, signal},
    task::JoinHandle,
};

#[actix_web::main]
async fn main() {
    if let Err(e) = run().await {
        error!("application error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    initialize();

    let config = AppConfig::get();
    let driver = Arc::new(SystemWifiDriver::new(&config.uplink.interface));

    let indicator: Arc<dyn Indicator> = Arc::new(GpioIndicator::new(&config.indicator));
    indicator::set_or_log(indicator.as_ref(), Signal::Alive, true);
    indicator::set_or_log(indicator.as_ref(), Signal::Uplink, false);

    let (registry, registry_worker) = start_registry()?;

    let radio = Radio::new(AccessPointController::new(
        driver.clone(),
        config.access_point.services.clone(),
    ))
    .shared();

    let monitor = ConnectivityMonitor::new(
        radio.clone(),
        NetworkProbe::new(driver.clone()),
        indicator.clone(),
        registry.clone(),
        config.monitor.clone(),
    );

    let provisioning = ProvisioningService::new(
        config.device_id.as_str(),
        radio.clone(),
        UplinkConfigurator::new(driver, config.uplink.clone()),
        indicator,
        registry,
    );

    let monitor_task = tokio::spawn(monitor.run());
    let (server_handle, server_task) = run_server(Api::new(provisioning, radio))?;

    let mut sigterm =
        signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => debug!("ctrl-c received"),
        _ = sigterm.recv() => debug!("SIGTERM received"),
        result = server_task => match result {
            Ok(Ok(())) => debug!("server stopped normally"),
            Ok(Err(e)) => error!("server stopped with error: {e}"),
            Err(e) => error!("server task panicked: {e}"),
        },
    }

    info!("shutting down");

    server_handle.stop(true).await;
    monitor_task.abort();
    if let Some(worker) = registry_worker {
        worker.abort();
    }

    info!("shutdown complete");
    Ok(())
}

fn initialize() {
    log_panics::init();

    let mut builder = if cfg!(debug_assertions) {
        Builder::from_env(Env::default().default_filter_or("debug"))
    } else {
        Builder::from_env(Env::default().default_filter_or("info"))
    };

    builder.format(|f, record| match record.level() {
        log::Level::Error => {
            eprintln!("{}", record.args());
            Ok(())
        }
        _ => {
            writeln!(f, "{}", record.args())
        }
    });

    builder.target(Target::Stdout).init();

    info!("module version: {}", env!("CARGO_PKG_VERSION"));
}

fn start_registry() -> Result<(RegistrySync, Option<JoinHandle<()>>)> {
    let config = AppConfig::get();

    let Some(credentials) = &config.registry.credentials_path else {
        warn!("REGISTRY_CREDENTIALS not set, registry updates disabled");
        return Ok((RegistrySync::disabled(), None));
    };

    let client = FirestoreClient::from_credentials_file(credentials, &config.registry.collection)
        .context("failed to create registry client")?;

    let (registry, worker) = RegistrySync::spawn(
        client,
        config.device_id.clone(),
        RetryPolicy::from(&config.registry),
    );

    Ok((registry, Some(worker)))
}

fn run_server(
    api: Api<SystemWifiDriver>,
) -> Result<(ServerHandle, JoinHandle<Result<(), std::io::Error>>)> {
    let server_config = &AppConfig::get().server;

    info!(
        "provisioning endpoint on {}:{}",
        server_config.bind_address, server_config.port
    );

    let server = HttpServer::new(move || {
        App::new()
            .app_data(Data::new(api.clone()))
            .configure(Api::<SystemWifiDriver>::configure)
    })
    .bind((server_config.bind_address.as_str(), server_config.port))
    .context("failed to bind server")?
    .disable_signals()
    .run();

    Ok((server.handle(), tokio::spawn(server)))
}
