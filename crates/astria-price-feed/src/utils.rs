use astria_eyre::eyre::{
    self,
    Report,
    WrapErr as _,
};
use tokio::task::JoinError;
use tracing::{
    error,
    info,
};

pub(crate) fn flatten<T>(res: Result<eyre::Result<T>, JoinError>) -> eyre::Result<T> {
    match res {
        Ok(Ok(val)) => Ok(val),
        Ok(Err(err)) => Err(err).wrap_err("task returned with error"),
        Err(err) => Err(err).wrap_err("task panicked"),
    }
}

pub(crate) fn report_exit_reason(reason: Result<&str, &Report>) {
    match &reason {
        Ok(reason) => {
            info!(reason, "shutting down");
        }
        Err(reason) => {
            error!(%reason, "shutting down");
        }
    }
}
