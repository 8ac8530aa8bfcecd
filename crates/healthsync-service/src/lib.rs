//! Library surface of the device-resident sync service: the HTTP/1.1
//! engine, the TLS listener, and the simulated health provider used for
//! development and integration tests. `main.rs` wires these into the CLI.

pub mod http;
pub mod listener;
pub mod simulated_provider;
