//! Runs all configured providers concurrently and funnels their observations into one buffer.
use std::{
    sync::Arc,
    time::Duration,
};

use astria_eyre::eyre::{
    self,
    eyre,
    WrapErr as _,
};
use astria_price_feed_core::types::CurrencyPair;
use itertools::Itertools as _;
use tokio::{
    select,
    sync::watch,
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
    config::SupervisionSettings,
    provider::{
        PollingProvider,
        Provider,
        StreamingProvider,
    },
    utils::flatten,
};

mod backoff;
pub(crate) mod buffer;
mod supervisor;

pub use supervisor::{
    Health,
    ProviderState,
};

/// How often and how patiently a polling provider is queried.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollSchedule {
    pub interval: Duration,
    pub request_timeout: Duration,
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            request_timeout: Duration::from_millis(500),
        }
    }
}

/// A provider together with the pairs it is asked for.
#[derive(Debug)]
pub struct ProviderSpec {
    provider: Provider,
    pairs: Vec<CurrencyPair>,
    schedule: PollSchedule,
}

impl ProviderSpec {
    #[must_use]
    pub fn polling<P: PollingProvider>(
        provider: P,
        pairs: Vec<CurrencyPair>,
        schedule: PollSchedule,
    ) -> Self {
        Self {
            provider: Provider::Polling(Box::new(provider)),
            pairs,
            schedule,
        }
    }

    #[must_use]
    pub fn streaming<P: StreamingProvider>(provider: P, pairs: Vec<CurrencyPair>) -> Self {
        Self {
            provider: Provider::Streaming(Box::new(provider)),
            pairs,
            schedule: PollSchedule::default(),
        }
    }

    #[must_use]
    pub fn name(&self) -> Arc<str> {
        self.provider.name()
    }
}

pub(crate) struct Builder {
    pub(crate) providers: Vec<ProviderSpec>,
    pub(crate) settings: SupervisionSettings,
    pub(crate) grace_period: Duration,
    pub(crate) shutdown: CancellationToken,
}

impl Builder {
    /// Spawns one supervised task per provider.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// Returns an error if two providers share a name.
    pub(crate) fn build(self) -> eyre::Result<(Runner, buffer::Receiver)> {
        let Self {
            providers,
            settings,
            grace_period,
            shutdown,
        } = self;

        if let Some(name) = providers.iter().map(ProviderSpec::name).duplicates().next() {
            return Err(eyre!("provider `{name}` was registered more than once"));
        }

        let (senders, receiver) =
            buffer::channel(providers.iter().map(|spec| (spec.name(), spec.pairs.clone())));

        let mut tasks = JoinMap::new();
        let mut states = Vec::with_capacity(providers.len());
        for (spec, sender) in providers.into_iter().zip(senders) {
            let ProviderSpec {
                provider,
                pairs,
                schedule,
            } = spec;
            let name = provider.name();
            let (state, state_rx) = watch::channel(ProviderState::new(name.clone()));
            states.push(state_rx);
            let supervisor = supervisor::Supervisor {
                provider,
                pairs,
                schedule,
                settings,
                sender,
                state,
                shutdown: shutdown.child_token(),
            };
            tasks.spawn(name, supervisor.run_until_stopped());
        }

        Ok((
            Runner {
                tasks,
                states,
                grace_period,
                shutdown,
            },
            receiver,
        ))
    }
}

/// The supervised provider tasks.
pub struct Runner {
    tasks: JoinMap<Arc<str>, eyre::Result<()>>,
    states: Vec<watch::Receiver<ProviderState>>,
    grace_period: Duration,
    shutdown: CancellationToken,
}

impl Runner {
    /// Watches on the state of every provider, in registration order.
    #[must_use]
    pub fn states(&self) -> Vec<watch::Receiver<ProviderState>> {
        self.states.clone()
    }

    /// Runs the providers until shutdown is requested.
    ///
    /// Provider failures are handled by their supervisors; a task only exits early if it
    /// panicked, which is reported as an error.
    #[instrument(skip_all)]
    pub async fn run_until_stopped(mut self) -> eyre::Result<()> {
        let exit = select! {
            biased;

            () = self.shutdown.cancelled() => Ok(()),

            Some((name, res)) = self.tasks.join_next() => {
                match flatten(res) {
                    Ok(()) => Err(eyre!("provider `{name}` exited unexpectedly")),
                    Err(err) => Err(err).wrap_err_with(|| format!("provider `{name}` failed")),
                }
            }
        };
        self.stop().await;
        exit
    }

    /// Signals all providers to stop and waits for them for at most the grace period, after
    /// which the remaining ones are aborted.
    ///
    /// Once this returns, all providers have exited and no further observations are emitted.
    pub async fn stop(mut self) {
        self.shutdown.cancel();

        let shutdown_loop = async {
            while let Some((name, res)) = self.tasks.join_next().await {
                let message = "provider shut down";
                match flatten(res) {
                    Ok(()) => info!(%name, message),
                    Err(error) => error!(%name, %error, message),
                }
            }
        };

        if timeout(self.grace_period, shutdown_loop).await.is_err() {
            let providers = self.tasks.keys().join(", ");
            warn!(
                providers = format_args!("[{providers}]"),
                "aborting all providers that have not yet shut down",
            );
            self.tasks.abort_all();
            // aborted tasks drop their fan-in senders when they are reaped
            while self.tasks.join_next().await.is_some() {}
        } else {
            info!("all providers shut down regularly");
        }
    }
}
