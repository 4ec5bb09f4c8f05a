//! Record heart rate measurements from a BLE heart rate monitor.
//!
//! The crate finds peripherals advertising the Heart Rate service, connects
//! to the one the operator picks, subscribes to the Heart Rate Measurement
//! characteristic and writes every decoded sample to a CSV file while
//! keeping a bounded in-memory history.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use hrlog::{BtleTransport, ConsolePrompt, CsvSink, SessionConfig, SessionController};
//! use stream_cancel::Tripwire;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), hrlog::TransportError> {
//!     pretty_env_logger::init();
//!
//!     let config = SessionConfig::default();
//!     let transport = BtleTransport::new(config.get_adapter_index()).await?;
//!     let sink = CsvSink::new(config.get_output_dir());
//!
//!     // Dropping or cancelling the trigger interrupts the session
//!     let (_trigger, tripwire) = Tripwire::new();
//!
//!     let mut session =
//!         SessionController::new(config, transport, sink, ConsolePrompt::stdio(), tripwire);
//!     let outcome = session.run().await;
//!     println!("{:?}, {} samples recorded", outcome, session.samples_written());
//!
//!     Ok(())
//! }
//! ```

#![warn(clippy::all, future_incompatible, nonstandard_style, rust_2018_idioms)]

pub use btle::BtleTransport;
pub use characteristic::CharacteristicInfo;
pub use error::{DecodeError, PersistenceError, SelectionError, SessionError, TransportError};
pub use history::HistoryBuffer;
pub use measurement::{HeartRateSample, SensorContact};
pub use prompt::{ConsolePrompt, Operator};
pub use registry::{DeviceId, DeviceRegistry, DiscoveredDevice};
pub use service::ServiceInfo;
pub use session::{DisconnectReason, SessionConfig, SessionController, SessionOutcome, SessionState};
pub use sink::{CsvSink, SampleSink};
pub use transport::{AdvertisementCallback, NotificationStream, Transport};

mod btle;
mod characteristic;
mod service;

pub mod common;
pub mod error;
pub mod history;
pub mod measurement;
pub mod prompt;
pub mod registry;
pub mod session;
pub mod sink;
pub mod transport;
