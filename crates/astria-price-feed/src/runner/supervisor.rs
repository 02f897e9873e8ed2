//! Drives a single provider: runs its sessions, forwards its observations, and restarts it with
//! backoff when a session fails.
use std::{
    collections::BTreeMap,
    sync::Arc,
    time::Duration,
};

use astria_eyre::eyre::{
    self,
    bail,
    eyre,
    WrapErr as _,
};
use astria_price_feed_core::types::CurrencyPair;
use metrics::{
    counter,
    histogram,
};
use tokio::{
    select,
    sync::watch,
    time::{
        interval,
        interval_at,
        sleep,
        sleep_until,
        timeout,
        Instant,
        MissedTickBehavior,
    },
};
use tokio_util::sync::CancellationToken;
use tracing::{
    debug,
    info,
    instrument,
    warn,
};

use super::{
    backoff::Backoff,
    buffer::{
        self,
        Delivery,
    },
    PollSchedule,
};
use crate::{
    config::SupervisionSettings,
    metrics_init::{
        HEALTH_LABEL,
        OBSERVATIONS_DROPPED,
        OBSERVATIONS_RECEIVED,
        PROVIDER_FETCH_LATENCY,
        PROVIDER_LABEL,
        PROVIDER_STATUS_TRANSITIONS,
    },
    provider::{
        Connection,
        PollingProvider,
        PriceObservation,
        Provider,
        StreamEvent,
        StreamingProvider,
    },
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Health {
    /// Delivering observations.
    Healthy,
    /// The last session failed; the provider is being restarted with backoff.
    Degraded,
    /// Failed too often in a row. Its observations are excluded from aggregation until a
    /// periodic re-check succeeds.
    Failed,
}

impl Health {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for Health {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The state of a provider as seen by its supervisor.
#[derive(Clone, Debug)]
pub struct ProviderState {
    pub source: Arc<str>,
    pub latest: BTreeMap<CurrencyPair, PriceObservation>,
    pub health: Health,
    pub consecutive_failures: u32,
    /// When the provider will be restarted, if it is currently waiting to be.
    pub next_retry: Option<Instant>,
}

impl ProviderState {
    pub(super) fn new(source: Arc<str>) -> Self {
        Self {
            source,
            latest: BTreeMap::new(),
            // a provider is not trusted until it produced something
            health: Health::Degraded,
            consecutive_failures: 0,
            next_retry: None,
        }
    }
}

pub(super) struct Supervisor {
    pub(super) provider: Provider,
    pub(super) pairs: Vec<CurrencyPair>,
    pub(super) schedule: PollSchedule,
    pub(super) settings: SupervisionSettings,
    pub(super) sender: buffer::Sender,
    pub(super) state: watch::Sender<ProviderState>,
    pub(super) shutdown: CancellationToken,
}

impl Supervisor {
    #[instrument(skip_all, fields(provider = %self.provider.name(), kind = self.provider.kind()))]
    pub(super) async fn run_until_stopped(self) -> eyre::Result<()> {
        let backoff = Backoff::new(
            self.settings.backoff_initial_delay,
            self.settings.backoff_max_delay,
        );
        info!(pairs = %telemetry::display::json(&self.pairs), "starting provider");

        loop {
            let session = select! {
                biased;

                () = self.shutdown.cancelled() => break,

                res = self.run_session() => res,
            };
            let error = match session {
                Ok(()) => eyre!("provider session ended without an error"),
                Err(error) => error,
            };

            let delay = self.record_failure(&backoff, &error);
            select! {
                biased;

                () = self.shutdown.cancelled() => break,

                () = sleep(delay) => {}
            }
        }
        info!("shutting down provider");
        Ok(())
    }

    async fn run_session(&self) -> eyre::Result<()> {
        match &self.provider {
            Provider::Polling(provider) => self.run_polling_session(&**provider).await,
            Provider::Streaming(provider) => self.run_streaming_session(&**provider).await,
        }
    }

    /// Fetches prices on every tick of the poll interval until a fetch fails.
    ///
    /// Fetches run sequentially, so at most one request is in flight. Ticks missed while a
    /// fetch was running are delayed rather than fired in a burst.
    async fn run_polling_session(&self, provider: &dyn PollingProvider) -> eyre::Result<()> {
        let mut ticker = interval(self.schedule.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let start = Instant::now();
            let observations = timeout(self.schedule.request_timeout, provider.fetch(&self.pairs))
                .await
                .map_err(|_| {
                    eyre!(
                        "fetch did not complete within {}",
                        telemetry::display::format_duration(self.schedule.request_timeout)
                    )
                })?
                .wrap_err("fetch failed")?;
            histogram!(PROVIDER_FETCH_LATENCY, PROVIDER_LABEL => provider.name().to_string())
                .record(start.elapsed());
            self.mark_healthy();
            for observation in observations {
                self.forward(observation);
            }
        }
    }

    /// Reads events from a connection until it fails, times out, or is closed.
    ///
    /// The connection is considered failed if connecting or pinging takes longer than the write
    /// timeout, if no event arrives within the read timeout, or if no observation (heartbeats
    /// do not count) arrives within the maximum idle interval.
    async fn run_streaming_session(&self, provider: &dyn StreamingProvider) -> eyre::Result<()> {
        let SupervisionSettings {
            read_timeout,
            write_timeout,
            max_idle_interval,
            ping_interval,
            ..
        } = self.settings;

        let mut connection = timeout(write_timeout, provider.connect(&self.pairs))
            .await
            .map_err(|_| eyre!("connecting did not complete within the write timeout"))?
            .wrap_err("failed to connect")?;
        debug!("connected");

        let mut pinger = interval_at(Instant::now() + ping_interval, ping_interval);
        pinger.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut idle_deadline = Instant::now() + max_idle_interval;
        let mut read_deadline = Instant::now() + read_timeout;

        loop {
            select! {
                biased;

                _ = pinger.tick() => {
                    ping(&mut *connection, write_timeout).await?;
                }

                () = sleep_until(idle_deadline) => {
                    bail!(
                        "no observation received within {}",
                        telemetry::display::format_duration(max_idle_interval),
                    );
                }

                () = sleep_until(read_deadline) => {
                    bail!(
                        "no event received within {}",
                        telemetry::display::format_duration(read_timeout),
                    );
                }

                event = connection.next_event() => {
                    read_deadline = Instant::now() + read_timeout;
                    match event {
                        None => bail!("connection was closed by the venue"),
                        Some(Err(error)) => {
                            return Err(error).wrap_err("connection returned an error");
                        }
                        Some(Ok(StreamEvent::Heartbeat)) => self.mark_healthy(),
                        Some(Ok(StreamEvent::Observation(observation))) => {
                            self.mark_healthy();
                            self.forward(observation);
                            idle_deadline = Instant::now() + max_idle_interval;
                        }
                    }
                }
            }
        }
    }

    /// Forwards `observation` under the provider's registered name, whatever source the
    /// provider stamped on it.
    fn forward(&self, mut observation: PriceObservation) {
        let provider = self.state.borrow().source.clone();
        observation.source = provider.clone();
        match self.sender.send(observation.clone()) {
            Delivery::Dropped => {
                debug!(pair = %observation.pair, "dropping observation for unconfigured pair");
                counter!(OBSERVATIONS_DROPPED, PROVIDER_LABEL => provider.to_string()).increment(1);
            }
            Delivery::Queued | Delivery::Superseded => {
                counter!(OBSERVATIONS_RECEIVED, PROVIDER_LABEL => provider.to_string())
                    .increment(1);
                self.state.send_modify(|state| {
                    state.latest.insert(observation.pair.clone(), observation);
                });
            }
        }
    }

    fn mark_healthy(&self) {
        let previous = self.state.borrow().health;
        self.state.send_if_modified(|state| {
            let changed = state.health != Health::Healthy || state.consecutive_failures != 0;
            state.health = Health::Healthy;
            state.consecutive_failures = 0;
            state.next_retry = None;
            changed
        });
        if previous != Health::Healthy {
            info!(from = %previous, "provider is healthy");
            self.count_transition(Health::Healthy);
        }
    }

    /// Records a failed session and returns how long to wait before the next one.
    fn record_failure(&self, backoff: &Backoff, error: &eyre::Report) -> Duration {
        let mut transition = None;
        let mut delay = Duration::ZERO;
        self.state.send_modify(|state| {
            state.consecutive_failures = state.consecutive_failures.saturating_add(1);
            let backoff_delay = backoff.delay(state.consecutive_failures);
            let health = if state.consecutive_failures >= self.settings.max_consecutive_failures {
                // never retry sooner than the backoff would have
                delay = self.settings.health_recheck_interval.max(backoff_delay);
                Health::Failed
            } else {
                delay = backoff_delay;
                Health::Degraded
            };
            if health != state.health {
                transition = Some((state.health, health));
            }
            state.health = health;
            state.next_retry = Some(Instant::now() + delay);
        });

        let failures = self.state.borrow().consecutive_failures;
        warn!(
            %error,
            consecutive_failures = failures,
            retry_in = %telemetry::display::format_duration(delay),
            "provider session failed",
        );
        if let Some((from, to)) = transition {
            warn!(%from, %to, "provider health changed");
            self.count_transition(to);
        }
        delay
    }

    fn count_transition(&self, to: Health) {
        let provider = self.state.borrow().source.to_string();
        counter!(
            PROVIDER_STATUS_TRANSITIONS,
            PROVIDER_LABEL => provider,
            HEALTH_LABEL => to.as_str(),
        )
        .increment(1);
    }
}

async fn ping(connection: &mut dyn Connection, write_timeout: Duration) -> eyre::Result<()> {
    timeout(write_timeout, connection.ping())
        .await
        .map_err(|_| eyre!("ping did not complete within the write timeout"))?
        .wrap_err("failed sending ping")
}
