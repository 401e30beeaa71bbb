use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    /// An environment variable was set to something unparsable.
    #[error("Invalid value '{value}' for {key}: {expected}")]
    InvalidVar {
        key: String,
        value: String,
        expected: &'static str,
    },

    #[error("{service} credentials missing: set {service_upper}_CLIENT_ID and {service_upper}_CLIENT_SECRET")]
    MissingCredentials {
        service: &'static str,
        service_upper: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
