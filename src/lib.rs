//! enginectl: control client for a remote container engine.
//!
//! The library keeps live container/image/network/volume state in sync with
//! the engine (`poll`), runs lifecycle actions (`dispatcher`) and decodes
//! container logs (`logstream`). The `app` module is the terminal front end
//! used by the binary.

pub mod app;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod logstream;
pub mod model;
pub mod poll;
pub mod transport;

pub use config::ClientConfig;
pub use dispatcher::Dispatcher;
pub use engine::EngineClient;
pub use error::{EngineError, ProtocolError, TransportError};
pub use poll::{PollSession, Published};
