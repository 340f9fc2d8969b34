use std::num::NonZeroUsize;
use std::str::FromStr;
use std::time;

use envconfig::Envconfig;

use crate::processor::Dispatch;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "3302")]
    pub port: u16,

    /// Messages of one batch processed at the same time. 1 processes a batch sequentially.
    #[envconfig(default = "1")]
    pub max_concurrent_messages: NonZeroUsize,

    /// Per-message handler timeout in milliseconds. No timeout when unset.
    pub handler_timeout: Option<EnvMsDuration>,

    #[envconfig(default = "6291456")]
    pub max_body_size: usize,

    #[envconfig(default = "true")]
    pub export_prometheus: bool,

    #[envconfig(default = "acknowledge")]
    pub message_handler: HandlerKind,

    #[envconfig(default = "id")]
    pub record_key_field: NonEmptyString,
}

impl Config {
    /// Produce a host:port address for binding a TcpListener.
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn dispatch(&self) -> Dispatch {
        Dispatch::with_max_in_flight(self.max_concurrent_messages)
    }
}

/// Which `MessageHandler` the binary wires into the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    /// Acknowledge every message without looking at it.
    Acknowledge,
    /// Store JSON bodies through the repository.
    Persist,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseHandlerKindError(String);

impl FromStr for HandlerKind {
    type Err = ParseHandlerKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "acknowledge" => Ok(HandlerKind::Acknowledge),
            "persist" => Ok(HandlerKind::Persist),
            other => Err(ParseHandlerKindError(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}

#[derive(Debug, Clone)]
pub struct NonEmptyString(pub String);

impl NonEmptyString {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct StringIsEmptyError;

impl FromStr for NonEmptyString {
    type Err = StringIsEmptyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            Err(StringIsEmptyError)
        } else {
            Ok(NonEmptyString(s.to_owned()))
        }
    }
}
