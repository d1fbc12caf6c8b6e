//! Escdf global configuration options.

use std::sync::{OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Global configuration options for the escdf crate.
///
/// Retrieve the global [`Config`] with [`global_config`] and modify it with [`global_config_mut`].
///
/// ## Validate Ranges On Read
///  > default: [`true`]
///
/// If enabled, attribute and dataset values read back from a store are checked against the value range of their specification, exactly as values are checked before they are written.
/// Disabling this allows reading stores written by tools that do not enforce ranges.
///
/// ## Default String Length
///  > default: `80`
///
/// The fixed width (in bytes, including the terminating NUL) of string elements whose specification does not declare a string length.
#[derive(Debug)]
pub struct Config {
    validate_ranges_on_read: bool,
    default_string_length: usize,
}

#[allow(clippy::derivable_impls)]
impl Default for Config {
    fn default() -> Self {
        Config {
            validate_ranges_on_read: true,
            default_string_length: 80,
        }
    }
}

impl Config {
    /// Get the [validate ranges on read](#validate-ranges-on-read) configuration.
    #[must_use]
    pub fn validate_ranges_on_read(&self) -> bool {
        self.validate_ranges_on_read
    }

    /// Set the [validate ranges on read](#validate-ranges-on-read) configuration.
    pub fn set_validate_ranges_on_read(&mut self, validate_ranges_on_read: bool) {
        self.validate_ranges_on_read = validate_ranges_on_read;
    }

    /// Get the [default string length](#default-string-length) configuration.
    #[must_use]
    pub fn default_string_length(&self) -> usize {
        self.default_string_length
    }

    /// Set the [default string length](#default-string-length) configuration.
    ///
    /// A length of zero is clamped to one, the width of an empty NUL-terminated string.
    pub fn set_default_string_length(&mut self, default_string_length: usize) {
        self.default_string_length = default_string_length.max(1);
    }
}

static CONFIG: OnceLock<RwLock<Config>> = OnceLock::new();

/// Returns a reference to the global escdf configuration.
///
/// # Panics
/// This function panics if the underlying lock has been poisoned and might panic if the global config is already held by the current thread.
pub fn global_config() -> RwLockReadGuard<'static, Config> {
    CONFIG
        .get_or_init(|| RwLock::new(Config::default()))
        .read()
        .unwrap()
}

/// Returns a mutable reference to the global escdf configuration.
///
/// # Panics
/// This function panics if the underlying lock has been poisoned and might panic if the global config is already held by the current thread.
pub fn global_config_mut() -> RwLockWriteGuard<'static, Config> {
    CONFIG
        .get_or_init(|| RwLock::new(Config::default()))
        .write()
        .unwrap()
}
