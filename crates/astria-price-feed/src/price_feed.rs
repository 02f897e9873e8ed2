use std::time::Duration;

use astria_eyre::eyre::{
    self,
    eyre,
    WrapErr as _,
};
use itertools::Itertools as _;
use tokio::{
    select,
    time::timeout,
};
use tokio_util::{
    sync::CancellationToken,
    task::JoinMap,
};
use tracing::{
    error,
    info,
    instrument,
    warn,
};

use crate::{
    aggregator,
    config::Settings,
    provider::http::HttpJsonProvider,
    runner::{
        self,
        PollSchedule,
        ProviderSpec,
    },
    service::LocalOracleService,
    utils::{
        flatten,
        report_exit_reason,
    },
};

const RUNNER: &str = "runner";
const AGGREGATOR: &str = "aggregator";

/// Added on top of the providers' grace period before the remaining tasks are aborted.
const SHUTDOWN_MARGIN: Duration = Duration::from_secs(1);

/// The price feed sidecar: the supervised providers, the local aggregator, and the oracle service
/// reading from it.
pub struct PriceFeed {
    shutdown_token: CancellationToken,
    tasks: JoinMap<&'static str, eyre::Result<()>>,
    oracle_service: LocalOracleService,
    grace_period: Duration,
}

impl PriceFeed {
    /// Creates a price feed querying the HTTP providers listed in `settings`.
    ///
    /// Spawns all tasks immediately, so it must be called from within a tokio runtime.
    ///
    /// # Errors
    /// Returns an error if an HTTP client could not be constructed.
    pub fn new(settings: Settings) -> eyre::Result<Self> {
        let providers = settings
            .http_providers
            .iter()
            .map(|provider| {
                let schedule = PollSchedule {
                    interval: provider.interval,
                    request_timeout: provider.request_timeout,
                };
                HttpJsonProvider::new(provider)
                    .map(|http| ProviderSpec::polling(http, provider.pairs.clone(), schedule))
                    .wrap_err_with(|| format!("failed constructing provider `{}`", provider.name))
            })
            .collect::<eyre::Result<Vec<_>>>()?;
        Self::with_providers(settings, providers)
    }

    /// Creates a price feed running `providers`, ignoring the HTTP providers listed in
    /// `settings`.
    ///
    /// Spawns all tasks immediately, so it must be called from within a tokio runtime.
    ///
    /// # Errors
    /// Returns an error if two providers share a name.
    pub fn with_providers(settings: Settings, providers: Vec<ProviderSpec>) -> eyre::Result<Self> {
        let Settings {
            markets,
            http_providers: _,
            aggregator,
            supervision,
            shutdown_grace_period,
        } = settings;

        if providers.is_empty() {
            warn!("no providers are configured; no prices will be published");
        } else {
            let names = providers.iter().map(ProviderSpec::name).join(", ");
            info!(providers = format_args!("[{names}]"), "configured providers");
        }

        let shutdown_token = CancellationToken::new();

        let (runner, observations) = runner::Builder {
            providers,
            settings: supervision,
            grace_period: shutdown_grace_period,
            shutdown: shutdown_token.child_token(),
        }
        .build()
        .wrap_err("failed constructing provider runner")?;
        let provider_states = runner.states();

        let aggregator = aggregator::Builder {
            markets,
            settings: aggregator,
            observations,
            provider_states: provider_states.clone(),
            shutdown: shutdown_token.child_token(),
        }
        .build();
        let oracle_service = LocalOracleService::new(aggregator.subscribe(), provider_states);

        let mut tasks = JoinMap::new();
        tasks.spawn(RUNNER, runner.run_until_stopped());
        tasks.spawn(AGGREGATOR, aggregator.run_until_stopped());

        Ok(Self {
            shutdown_token,
            tasks,
            oracle_service,
            grace_period: shutdown_grace_period,
        })
    }

    /// Returns a service answering price queries from this price feed.
    #[must_use]
    pub fn oracle_service(&self) -> LocalOracleService {
        self.oracle_service.clone()
    }

    /// Returns a handle to shut down the price feed.
    ///
    /// Dropping the handle shuts the price feed down, too.
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            token: self.shutdown_token.clone(),
        }
    }

    /// Runs the price feed until it is shut down through its [`ShutdownHandle`] or one of its
    /// tasks exits.
    ///
    /// # Errors
    /// Returns an error if one of its tasks exited unexpectedly.
    #[instrument(skip_all)]
    pub async fn run_until_stopped(mut self) -> eyre::Result<()> {
        info!("price feed is running");
        let exit_reason = select! {
            biased;

            () = self.shutdown_token.cancelled() => Ok("received shutdown signal"),

            Some((name, res)) = self.tasks.join_next() => {
                match flatten(res) {
                    Ok(()) => Err(eyre!("task `{name}` exited unexpectedly")),
                    Err(err) => Err(err).wrap_err_with(|| format!("task `{name}` failed")),
                }
            }
        };

        report_exit_reason(exit_reason.as_ref().copied());
        self.shutdown().await;
        exit_reason.map(|_| ())
    }

    #[instrument(skip_all)]
    async fn shutdown(mut self) {
        self.shutdown_token.cancel();

        let shutdown_loop = async {
            while let Some((name, res)) = self.tasks.join_next().await {
                let message = "task shut down";
                match flatten(res) {
                    Ok(()) => info!(task = name, message),
                    Err(error) => error!(task = name, %error, message),
                }
            }
        };

        // the runner itself waits up to the grace period for the providers
        let limit = self.grace_period.saturating_add(SHUTDOWN_MARGIN);
        if timeout(limit, shutdown_loop).await.is_err() {
            let tasks = self.tasks.keys().join(", ");
            warn!(
                tasks = format_args!("[{tasks}]"),
                "aborting all tasks that have not yet shut down",
            );
            self.tasks.abort_all();
        } else {
            info!("all tasks shut down regularly");
        }
    }
}

/// A handle for instructing the [`PriceFeed`] to shut down.
///
/// The price feed begins to shut down as soon as [`ShutdownHandle::shutdown`] is called or the
/// handle is dropped.
pub struct ShutdownHandle {
    token: CancellationToken,
}

impl ShutdownHandle {
    /// Returns a clone of the wrapped cancellation token.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Consumes `self` and cancels the wrapped cancellation token.
    pub fn shutdown(self) {
        self.token.cancel();
    }
}

impl Drop for ShutdownHandle {
    #[instrument(skip_all)]
    fn drop(&mut self) {
        if !self.token.is_cancelled() {
            info!("shutdown handle dropped, issuing shutdown to all tasks");
        }
        self.token.cancel();
    }
}
