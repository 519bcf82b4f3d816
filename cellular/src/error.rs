use thiserror::Error;

use crate::modem::ModemState;
use crate::telemetry::Technology;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// A state-gated operation was attempted below its required modem state.
    /// Recoverable: retry once the modem has reached `required`.
    #[error(
        "can't {action}: modem state is '{actual}', but needs to be at least '{required}'"
    )]
    Precondition {
        action: &'static str,
        required: ModemState,
        actual: ModemState,
    },

    /// Telemetry decoding was requested for a radio technology that has no
    /// typed representation.
    #[error("radio technology {0} is not supported")]
    UnsupportedTechnology(Technology),

    /// An attribute read for a key the record does not carry.
    #[error("no value for key '{0}'")]
    MissingKey(String),

    /// An attribute read with a type the stored value does not have.
    #[error("value for key '{key}' is not a {expected}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
    },

    #[error("failed to connect to the modem management service, is it running?")]
    ServiceUnavailable(#[source] zbus::Error),

    /// The await was superseded by a newer one, or the registry went away.
    #[error("cancelled, awaiting another modem now")]
    Cancelled,

    #[error("incorrect PIN or PUK")]
    WrongCredential,

    #[error("malformed PIN or PUK")]
    InvalidCredentialFormat,

    #[error("SIM unlock failed: {0}")]
    Sim(String),

    /// The network management service could not resolve a dependent object,
    /// e.g. the device behind a bearer's kernel interface.
    #[error("lost the connection to the network management service")]
    ConnectionLost(#[source] zbus::Error),

    #[error(transparent)]
    Dbus(#[from] zbus::Error),
}
