use std::io;
use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use crate::registry::DeviceId;

/// A heart rate measurement payload could not be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("payload too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },
}

/// Failure reported by the BLE transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no bluetooth adapter at index {index}")]
    NoAdapter { index: usize },
    #[error("device {0} was not seen during the scan")]
    UnknownDevice(DeviceId),
    #[error("characteristic {0} not found")]
    CharacteristicNotFound(Uuid),
    #[error(transparent)]
    Btle(#[from] btleplug::Error),
    #[error("{0}")]
    Other(String),
}

/// Operator input that does not name a listed device.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("'{0}' is not a number")]
    NotANumber(String),
    #[error("{choice} is not between 1 and {count}")]
    OutOfRange { choice: usize, count: usize },
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("cannot create {}: {source}", .path.display())]
    Open { path: PathBuf, source: io::Error },
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("sink is not open")]
    NotOpen,
}

/// Reason a session ended in the `Failed` state.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no heart rate devices found")]
    NoDevices,
    #[error("device selection cancelled")]
    SelectionCancelled,
    #[error("heart rate measurement characteristic not found")]
    MissingCharacteristic,
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("session already ran")]
    AlreadyRan,
}
