use std::process::ExitCode;

use astria_eyre::eyre::{
    self,
    eyre,
    WrapErr as _,
};
use astria_price_feed::{
    metrics_init,
    Config,
    PriceFeed,
};
use tokio::signal::unix::{
    signal,
    SignalKind,
};
use tracing::{
    error,
    info,
};

// Following the BSD convention for failing to read config
// See here: https://freedesktop.org/software/systemd/man/systemd.exec.html#Process%20Exit%20Codes
const EX_CONFIG: u8 = 78;

#[tokio::main]
async fn main() -> ExitCode {
    astria_eyre::install().expect("astria eyre hook must be the first hook installed");

    let cfg: Config = match config::get() {
        Err(err) => {
            eprintln!("failed to start astria-price-feed: failed reading config:\n{err:?}");
            return ExitCode::from(EX_CONFIG);
        }
        Ok(cfg) => cfg,
    };

    let mut telemetry_conf = telemetry::configure()
        .set_no_otel(cfg.no_otel)
        .set_force_stdout(cfg.force_stdout)
        .set_pretty_print(cfg.pretty_print)
        .set_filter_directives(&cfg.log);
    if !cfg.no_metrics {
        telemetry_conf = telemetry_conf
            .set_metrics(&cfg.metrics_http_listener_addr, env!("CARGO_PKG_NAME"))
            .add_histogram_buckets(
                metrics_init::LATENCY_SUFFIX,
                metrics_init::LATENCY_BUCKETS,
            );
    }
    let _telemetry_guard = match telemetry_conf
        .try_init()
        .wrap_err("failed to setup telemetry")
    {
        Err(err) => {
            eprintln!("initializing astria-price-feed failed:\n{err:?}");
            return ExitCode::FAILURE;
        }
        Ok(guard) => guard,
    };
    metrics_init::register();

    info!(
        config = %telemetry::display::json(&cfg),
        "initializing astria-price-feed"
    );

    let settings = match cfg.to_settings() {
        Err(err) => {
            error!(%err, "failed validating config");
            return ExitCode::from(EX_CONFIG);
        }
        Ok(settings) => settings,
    };

    let price_feed = match PriceFeed::new(settings) {
        Err(err) => {
            error!(%err, "failed initializing price feed");
            return ExitCode::FAILURE;
        }
        Ok(price_feed) => price_feed,
    };
    let shutdown_handle = price_feed.shutdown_handle();
    let mut price_feed = tokio::spawn(price_feed.run_until_stopped());

    let mut sigterm = signal(SignalKind::terminate())
        .expect("setting a SIGTERM listener should always work on Unix");

    let early_exit: Option<eyre::Result<()>> = tokio::select! {
        _ = sigterm.recv() => {
            info!("received SIGTERM, issuing shutdown to all tasks");
            shutdown_handle.shutdown();
            None
        }

        res = &mut price_feed => {
            Some(join_result(res).and_then(|()| Err(eyre!("price feed exited unexpectedly"))))
        }
    };

    let result = match early_exit {
        Some(result) => result,
        None => join_result(price_feed.await),
    };
    match result {
        Ok(()) => {
            info!("price feed stopped");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(%err, "price feed exited with error");
            ExitCode::FAILURE
        }
    }
}

fn join_result(res: Result<eyre::Result<()>, tokio::task::JoinError>) -> eyre::Result<()> {
    match res {
        Ok(res) => res,
        Err(err) => Err(err).wrap_err("price feed task panicked"),
    }
}
