//! Runtime-tunable configuration, read from environment variables under the
//! `SHENANDOAH_` prefix or set programmatically. Every knob from the external-interfaces
//! configuration table lives here, with a typed default and a validator closure, in the
//! same `options!`-macro shape `mmtk-core` uses for its own `Options` struct.

use std::fmt::Debug;

use strum_macros::EnumString;

/// Which heuristics variant drives trigger + cset selection.
#[derive(Copy, Clone, Eq, PartialEq, EnumString, Debug)]
pub enum HeuristicsKind {
    Static,
    Compact,
    Adaptive,
    Passive,
}

#[derive(Clone)]
pub struct ShenandoahOption<T: Debug + Clone> {
    value: T,
    validator: fn(&T) -> bool,
}

impl<T: Debug + Clone> ShenandoahOption<T> {
    pub fn new(value: T, validator: fn(&T) -> bool) -> Self {
        ShenandoahOption { value, validator }
    }

    /// Sets the option if `validator` accepts the value; returns whether it was set.
    pub fn set(&mut self, value: T) -> bool {
        if (self.validator)(&value) {
            self.value = value;
            true
        } else {
            false
        }
    }
}

impl<T: Debug + Clone> std::ops::Deref for ShenandoahOption<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.value
    }
}

fn always_valid<T>(_: &T) -> bool {
    true
}

fn is_percent(v: &f64) -> bool {
    (0.0..=100.0).contains(v)
}

fn is_positive_usize(v: &usize) -> bool {
    *v > 0
}

macro_rules! options {
    ($($name:ident: $type:ty [$validator:expr] = $default:expr),* $(,)?) => {
        #[derive(Clone)]
        pub struct Options {
            $(pub $name: ShenandoahOption<$type>),*
        }

        impl Options {
            fn new() -> Self {
                Options {
                    $($name: ShenandoahOption::new($default, $validator)),*
                }
            }

            fn set_inner(&mut self, key: &str, val: &str) -> bool {
                match key {
                    $(stringify!($name) => {
                        if let Ok(typed) = val.parse::<$type>() {
                            let ok = self.$name.set(typed);
                            if !ok {
                                log::warn!("rejected {key}={val:?}: failed validation, keeping default");
                            }
                            ok
                        } else {
                            log::warn!("rejected {key}={val:?}: could not parse as {}", stringify!($type));
                            false
                        }
                    })*
                    _ => false,
                }
            }

            /// Scans `SHENANDOAH_<NAME>` environment variables and applies any that match a
            /// known option key (matched case-insensitively against the lower-cased suffix).
            pub fn read_env_var_settings(&mut self) {
                const PREFIX: &str = "SHENANDOAH_";
                for (key, val) in std::env::vars() {
                    if let Some(rest) = key.strip_prefix(PREFIX) {
                        let lower = rest.to_lowercase();
                        self.set_inner(&lower, &val);
                    }
                }
            }
        }

        impl Default for Options {
            fn default() -> Self {
                Self::new()
            }
        }
    };
}

options! {
    heuristics: HeuristicsKind [always_valid] = HeuristicsKind::Adaptive,

    min_free_threshold_percent: f64 [is_percent] = 10.0,
    allocation_threshold_percent: f64 [is_percent] = 0.0,
    critical_free_threshold_percent: f64 [is_percent] = 1.0,
    garbage_threshold_percent: f64 [is_percent] = 25.0,
    immediate_threshold_percent: f64 [is_percent] = 90.0,
    evac_reserve_percent: f64 [is_percent] = 5.0,
    evac_waste: f64 [|v: &f64| *v >= 1.0] = 1.2,

    full_gc_threshold: usize [always_valid] = 3,
    guaranteed_gc_interval_ms: u64 [always_valid] = 0,
    uncommit_delay_ms: u64 [always_valid] = 5 * 60 * 1000,

    satb_barrier: bool [always_valid] = true,
    iu_barrier: bool [always_valid] = false,
    clone_barrier: bool [always_valid] = true,
    load_ref_barrier: bool [always_valid] = true,

    self_fixing: bool [always_valid] = true,
    pacing: bool [always_valid] = true,
    humongous_moves: bool [always_valid] = false,
    elastic_tlab: bool [always_valid] = true,

    region_size_bytes: usize [is_positive_usize] = crate::util::constants::DEFAULT_REGION_SIZE_BYTES,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let opts = Options::default();
        assert_eq!(*opts.heuristics, HeuristicsKind::Adaptive);
        assert!(*opts.load_ref_barrier);
    }

    #[test]
    fn set_inner_rejects_out_of_range_percent() {
        let mut opts = Options::default();
        assert!(!opts.set_inner("garbage_threshold_percent", "150"));
        assert_eq!(*opts.garbage_threshold_percent, 25.0);
        assert!(opts.set_inner("garbage_threshold_percent", "40"));
        assert_eq!(*opts.garbage_threshold_percent, 40.0);
    }

    #[test]
    fn set_inner_rejects_unparseable_value() {
        let mut opts = Options::default();
        assert!(!opts.set_inner("full_gc_threshold", "not-a-number"));
    }

    #[test]
    fn unknown_key_is_ignored() {
        let mut opts = Options::default();
        assert!(!opts.set_inner("nonexistent_knob", "1"));
    }
}
