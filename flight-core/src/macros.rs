// Logging macros shared by every crate in the workspace.
// Messages always go to the `log` facade; with the `defmt` feature they are
// mirrored to defmt over RTT. The feature is resolved here, in the
// defining crate, so callers never need their own `defmt` dependency.

#[doc(hidden)]
pub use log as __log;

#[cfg(feature = "defmt")]
#[doc(hidden)]
pub use defmt as __defmt;

#[cfg(feature = "defmt")]
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {{
        $crate::macros::__defmt::info!($($arg)*);
        $crate::macros::__log::info!($($arg)*);
    }};
}

#[cfg(not(feature = "defmt"))]
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::macros::__log::info!($($arg)*)
    };
}

#[cfg(feature = "defmt")]
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {{
        $crate::macros::__defmt::warn!($($arg)*);
        $crate::macros::__log::warn!($($arg)*);
    }};
}

#[cfg(not(feature = "defmt"))]
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::macros::__log::warn!($($arg)*)
    };
}

#[cfg(feature = "defmt")]
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {{
        $crate::macros::__defmt::error!($($arg)*);
        $crate::macros::__log::error!($($arg)*);
    }};
}

#[cfg(not(feature = "defmt"))]
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::macros::__log::error!($($arg)*)
    };
}

#[cfg(feature = "defmt")]
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {{
        $crate::macros::__defmt::debug!($($arg)*);
        $crate::macros::__log::debug!($($arg)*);
    }};
}

#[cfg(not(feature = "defmt"))]
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::macros::__log::debug!($($arg)*)
    };
}

#[cfg(feature = "defmt")]
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {{
        $crate::macros::__defmt::trace!($($arg)*);
        $crate::macros::__log::trace!($($arg)*);
    }};
}

#[cfg(not(feature = "defmt"))]
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {
        $crate::macros::__log::trace!($($arg)*)
    };
}
