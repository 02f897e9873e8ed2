//! An [`eyre`] report handler for the price feed services.
//!
//! Reports are rendered as a single line containing every error in the source chain, keyed by
//! its depth, e.g. `{"0": "failed to start runner", "1": "provider `coinbase` misconfigured"}`.
//! This keeps multi-cause errors readable inside structured (json) log lines.
//!
//! Call [`install`] once at startup, before any [`eyre::Report`] is constructed.

use std::{
    error::Error,
    fmt::{
        self,
        Write as _,
    },
};

pub use eyre;
#[doc(hidden)]
pub use eyre::Result;

/// Installs the `astria-eyre` hook as the global error report hook.
///
/// **NOTE**: It must be called before any `eyre::Report`s are constructed
/// to prevent the default handler from being installed.
///
/// # Errors
///
/// Calling this function after another handler has been installed will cause
/// an error.
pub fn install() -> Result<()> {
    eyre::set_hook(Box::new(|_| Box::new(ChainHandler)))?;
    Ok(())
}

struct ChainHandler;

impl eyre::EyreHandler for ChainHandler {
    fn debug(&self, error: &(dyn Error + 'static), f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_chain(error, f)
    }

    fn display(&self, error: &(dyn Error + 'static), f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_chain(error, f)
    }
}

fn write_chain(error: &(dyn Error + 'static), f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut depth = itoa::Buffer::new();
    f.write_char('{')?;
    let mut current = Some(error);
    let mut level = 0u32;
    while let Some(err) = current {
        if level > 0 {
            f.write_str(", ")?;
        }
        write!(f, "\"{}\": \"{err}\"", depth.format(level))?;
        level = level.saturating_add(1);
        current = err.source();
    }
    f.write_char('}')
}

#[cfg(test)]
mod tests {
    use std::fmt;

    use super::write_chain;

    #[derive(Debug, thiserror::Error)]
    #[error("failed fetching prices")]
    struct Outer(#[source] Inner);

    #[derive(Debug, thiserror::Error)]
    #[error("connection reset")]
    struct Inner;

    struct Render<'a>(&'a (dyn std::error::Error + 'static));

    impl fmt::Display for Render<'_> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write_chain(self.0, f)
        }
    }

    #[test]
    fn chain_is_rendered_with_depth_keys() {
        let error = Outer(Inner);
        assert_eq!(
            r#"{"0": "failed fetching prices", "1": "connection reset"}"#,
            Render(&error).to_string(),
        );
    }

    #[test]
    fn single_error_has_one_entry() {
        assert_eq!(r#"{"0": "connection reset"}"#, Render(&Inner).to_string());
    }
}
