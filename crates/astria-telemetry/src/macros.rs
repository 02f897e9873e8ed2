// re-export so that they need not be imported by downstream users.
// hidden because they shouldn't be imported.
#[doc(hidden)]
pub use const_format::{
    concatcp as __concatcp,
    map_ascii_case as __map_ascii_case,
    Case as __Case,
};

/// Declare a group of `const` metric names, each prefixed with the declaring crate's name.
///
/// Every listed identifier becomes a `&str` constant `${CARGO_CRATE_NAME}_<lower-cased ident>`.
/// The group identifier becomes a slice of all of them, which is handy for asserting that
/// every metric was described.
///
/// # Examples
/// ```
/// use astria_telemetry::metric_names;
/// metric_names!(pub const METRICS_NAMES: PROVIDER_FETCHES, AGGREGATION_TICKS);
/// // The prefix is `astria_telemetry` because this doctest is part of this crate.
/// assert_eq!(PROVIDER_FETCHES, "astria_telemetry_provider_fetches");
/// assert_eq!(METRICS_NAMES, &[PROVIDER_FETCHES, AGGREGATION_TICKS]);
/// ```
#[macro_export]
macro_rules! metric_names {
    ($vis:vis const $group:ident: $($name:ident),+ $(,)?) => {
        $(
            $crate::__metric_name_internal!($vis [$name][::core::stringify!($name)]);
        )+
        $vis const $group: &[&str] = &[$($name),+];
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __metric_name_internal {
    ($vis:vis [$name:ident][$suffix:expr]) => {
        $vis const $name: &str = $crate::macros::__concatcp!(
            ::core::env!("CARGO_CRATE_NAME"),
            "_",
            $crate::macros::__map_ascii_case!($crate::macros::__Case::Lower, $suffix),
        );
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn gives_expected_consts_and_group() {
        crate::metric_names!(const GROUP: FIRST_METRIC, SECOND_METRIC);
        assert_eq!("astria_telemetry_first_metric", FIRST_METRIC);
        assert_eq!("astria_telemetry_second_metric", SECOND_METRIC);
        assert_eq!(&["astria_telemetry_first_metric", "astria_telemetry_second_metric"], GROUP);
    }
}
