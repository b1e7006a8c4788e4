//! Engine configuration.

/// Configuration for an [`Engine`](crate::Engine).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Check declared field types on every write.
    ///
    /// The primary key type is checked regardless.
    pub validate_records: bool,

    /// Reject records carrying fields the schema does not declare.
    pub reject_unknown_fields: bool,

    /// Let the query engine read candidate keys from a declared index
    /// when an `equals` field has one.
    pub use_indexes: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            validate_records: true,
            reject_unknown_fields: false,
            use_indexes: true,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether declared field types are checked on write.
    #[must_use]
    pub const fn validate_records(mut self, value: bool) -> Self {
        self.validate_records = value;
        self
    }

    /// Sets whether undeclared fields are rejected on write.
    #[must_use]
    pub const fn reject_unknown_fields(mut self, value: bool) -> Self {
        self.reject_unknown_fields = value;
        self
    }

    /// Sets whether queries may use declared indexes.
    #[must_use]
    pub const fn use_indexes(mut self, value: bool) -> Self {
        self.use_indexes = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.validate_records);
        assert!(!config.reject_unknown_fields);
        assert!(config.use_indexes);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .validate_records(false)
            .reject_unknown_fields(true)
            .use_indexes(false);

        assert!(!config.validate_records);
        assert!(config.reject_unknown_fields);
        assert!(!config.use_indexes);
    }
}
