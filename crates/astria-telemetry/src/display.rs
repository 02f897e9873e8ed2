//! Helpers to emit tracing fields through their [`std::fmt::Display`] implementation.
use std::{
    fmt::{
        self,
        Display,
        Formatter,
    },
    io,
    str,
    time::Duration,
};

/// Format `bytes` as lower-cased hex.
///
/// # Example
/// ```
/// use astria_telemetry::display;
/// let validator = [0xabu8; 20];
/// tracing::info!(validator = %display::hex(&validator), "received vote extension");
/// ```
pub fn hex<T: AsRef<[u8]> + ?Sized>(bytes: &T) -> Hex<'_> {
    Hex(bytes.as_ref())
}

/// See [`hex`].
pub struct Hex<'a>(&'a [u8]);

impl Display for Hex<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl serde::Serialize for Hex<'_> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Format `serializable` as a compact json string.
///
/// # Example
/// ```
/// use astria_telemetry::display;
/// let pairs = vec!["BTC/USD", "ETH/USD"];
/// tracing::info!(pairs = %display::json(&pairs), "tracking currency pairs");
/// ```
pub fn json<T>(serializable: &T) -> Json<'_, T>
where
    T: serde::Serialize,
{
    Json(serializable)
}

/// See [`json`].
///
/// Serialization failures are reported as [`fmt::Error`].
pub struct Json<'a, T>(&'a T);

impl<T> Display for Json<'_, T>
where
    T: serde::Serialize,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        struct Adapter<'a, 'b: 'a> {
            inner: &'a mut Formatter<'b>,
        }

        impl io::Write for Adapter<'_, '_> {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                let s = str::from_utf8(buf)
                    .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
                self.inner
                    .write_str(s)
                    .map_err(|_| io::Error::new(io::ErrorKind::Other, "fmt error"))?;
                Ok(buf.len())
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut wr = Adapter {
            inner: f,
        };
        serde_json::to_writer(&mut wr, self.0).map_err(|_| fmt::Error)
    }
}

/// Format a duration in human readable form, e.g. `1m 30s`.
pub fn format_duration(duration: Duration) -> humantime::FormattedDuration {
    humantime::format_duration(duration)
}
