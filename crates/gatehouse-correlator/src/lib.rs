//! Command/response correlation over the device message bus
//!
//! The two bus devices take commands on their command topics and report
//! progress on their status topics. This crate turns that fire-and-forget
//! exchange into a request/response call.
//!
//! # Components
//!
//! - **MessageBus**: transport seam, with `MqttBus` (rumqttc) and `MemoryBus`
//! - **Correlator**: pending commands, terminal matching, timeouts
//! - **StatusFeed**: broadcast of every status and connection change
//!
//! # Example
//!
//! ```no_run
//! use gatehouse_correlator::{BrokerConfig, Correlator, CorrelatorConfig, MqttBus};
//! use gatehouse_core::Uid;
//! use gatehouse_protocol::Command;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (bus, events) = MqttBus::start(&BrokerConfig::new("192.168.1.86", 9001));
//! let (correlator, _updates) = Correlator::new(bus, CorrelatorConfig::default());
//!
//! let runner = correlator.clone();
//! tokio::spawn(async move { runner.run(events).await });
//!
//! let result = correlator
//!     .send(Command::register_card(Uid::new(12)?), None)
//!     .await;
//! println!("success: {}", result.success);
//! # Ok(())
//! # }
//! ```

mod bus;
mod correlator;
mod error;
mod feed;
mod memory;
mod mqtt;

pub use bus::{BusEvent, MessageBus};
pub use correlator::{Correlator, CorrelatorConfig, registration_update};
pub use error::{CorrelatorError, CorrelatorResult};
pub use feed::{ConnectionState, FeedEventKind, FeedSnapshot, StatusEvent, StatusFeed};
pub use memory::MemoryBus;
pub use mqtt::{BrokerConfig, BrokerTransport, MqttBus};
