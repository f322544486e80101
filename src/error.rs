#![forbid(unsafe_code)]

use crate::readiness::{ReadinessResult, ReadinessState};
use std::time::Duration;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Message(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("address parse error: {0}")]
    AddrParse(#[from] std::net::AddrParseError),
    #[error("{context}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn new<E>(error: E) -> Self
    where
        Error: From<E>,
    {
        error.into()
    }

    pub fn msg<M>(message: M) -> Self
    where
        M: Into<String>,
    {
        Self::Message(message.into())
    }

    pub fn with_context<M>(context: M, source: Error) -> Self
    where
        M: Into<String>,
    {
        Self::Context {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

pub trait Context<T> {
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Into<String>;

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>;
}

impl<T, E> Context<T> for std::result::Result<T, E>
where
    Error: From<E>,
{
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Into<String>,
    {
        self.map_err(|err| Error::with_context(context.into(), err.into()))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>,
    {
        self.map_err(|err| Error::with_context(f().into(), err.into()))
    }
}

impl From<String> for Error {
    fn from(value: String) -> Self {
        Error::Message(value)
    }
}

impl From<&str> for Error {
    fn from(value: &str) -> Self {
        Error::Message(value.to_string())
    }
}

/// Rejections surfaced to the transport layer.
///
/// `NotReady` is the normal hard-failure path and carries enough state for a protocol-level close
/// (failed services, final state and a retry hint). `Orchestration` signals a fault inside the
/// orchestrator itself and keeps the partially built result for diagnostics.
#[derive(Debug, Error)]
pub enum GateError {
    #[error(
        "connection rejected in state {state}: failed services {failed_services:?} (retry after {}s)",
        retry_after.as_secs()
    )]
    NotReady {
        state: ReadinessState,
        failed_services: Vec<String>,
        retry_after: Duration,
        result: Box<ReadinessResult>,
    },
    #[error("readiness orchestration fault: {reason}")]
    Orchestration {
        reason: String,
        partial: Box<ReadinessResult>,
    },
}

impl GateError {
    pub fn failed_services(&self) -> &[String] {
        match self {
            GateError::NotReady {
                failed_services, ..
            } => failed_services,
            GateError::Orchestration { partial, .. } => partial.failed_services(),
        }
    }

    pub fn state(&self) -> ReadinessState {
        match self {
            GateError::NotReady { state, .. } => *state,
            GateError::Orchestration { partial, .. } => partial.state(),
        }
    }

    pub fn result(&self) -> &ReadinessResult {
        match self {
            GateError::NotReady { result, .. } => result,
            GateError::Orchestration { partial, .. } => partial,
        }
    }
}

#[macro_export]
macro_rules! err {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {{
        $crate::error::Error::msg(format!($fmt $(, $arg)*))
    }};
    ($err:expr) => {{
        $crate::error::Error::new($err)
    }};
}
