//! Logging shim.
//!
//! Forwards to `defmt` or `log` depending on the enabled feature. With
//! neither enabled the macros only evaluate their arguments by reference.
#![allow(unused_macros, unused_imports)]

cfg_if::cfg_if! {
    if #[cfg(feature = "defmt")] {
        pub(crate) use defmt::{debug, error, info, trace, warn};
    } else if #[cfg(feature = "log")] {
        pub(crate) use log::{debug, error, info, trace, warn};
    } else {
        macro_rules! noop {
            ($fmt:literal $(, $x:expr)* $(,)?) => {{
                $( let _ = &$x; )*
            }};
        }

        pub(crate) use noop as trace;
        pub(crate) use noop as debug;
        pub(crate) use noop as info;
        pub(crate) use noop as warn;
        pub(crate) use noop as error;
    }
}
