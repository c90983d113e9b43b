//! Arrow Flight server and client for constant datasets
//!
//! This crate serves in-memory datasets over Apache Arrow Flight and
//! provides a client to list and fetch them.
//!
//! # Features
//!
//! - **Dataset Registry**: Map tickets to producers that build a fresh dataset per request
//! - **Flight Server**: `ListFlights` and `DoGet` over gRPC with bind/shutdown lifecycle
//! - **Flight Client**: Lazy flight and batch streams with idempotent close
//!
//! # Example
//!
//! ```ignore
//! use tabula_core::FlightConfig;
//! use tabula_flight::{DatasetRegistry, FlightClient, FlightServer};
//!
//! let registry = DatasetRegistry::with_fixtures()?;
//! let mut server = FlightServer::bind(&FlightConfig::ephemeral(), registry).await?;
//!
//! let mut client = FlightClient::connect(&server.url()).await?;
//! let ints = client.fetch("ints").await?;
//! client.close();
//! server.shutdown().await?;
//! ```

pub mod client;
pub mod error;
pub mod registry;
pub mod server;

pub use client::{FlightClient, FlightInfoStream, RecordBatchStream};
pub use error::FlightError;
pub use registry::{CriteriaPolicy, DatasetProducer, DatasetRegistry};
pub use server::{FlightServer, RegistryFlightService, ServerState};

/// Result type for Flight operations
pub type Result<T> = std::result::Result<T, FlightError>;
