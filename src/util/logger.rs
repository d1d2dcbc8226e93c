//! Built-in logger, enabled by the "builtin_env_logger" Cargo feature (on by default). When
//! enabled, it is initialized by [`crate::heap::Heap::new`] and shows logs of level INFO or
//! lower. Embeddings that want to route logs through their own subscriber can disable the
//! feature and register their own `log` implementation instead.

/// Attempt to init an env_logger. Does nothing if "builtin_env_logger" is disabled.
pub(crate) fn try_init() {
    cfg_if::cfg_if! {
        if #[cfg(feature = "builtin_env_logger")] {
            let result = env_logger::try_init_from_env(
                env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
            );
            match result {
                Ok(()) => log::debug!("initialized the built-in logger"),
                Err(e) => log::debug!("failed to initialize the built-in logger: {e}"),
            }
        } else {
            log::debug!("built-in logger not enabled (\"builtin_env_logger\" feature is off)");
        }
    }
}
