//! Arrow Flight server implementation
//!
//! Serves `ListFlights` and `DoGet` from a [`DatasetRegistry`]. The server
//! binds on construction and stops on [`FlightServer::shutdown`] or drop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arrow_flight::encode::FlightDataEncoderBuilder;
use arrow_flight::flight_service_server::{FlightService, FlightServiceServer};
use arrow_flight::{
    Action, ActionType, Criteria, Empty, FlightData, FlightDescriptor, FlightInfo,
    HandshakeRequest, HandshakeResponse, PollInfo, PutResult, SchemaResult, Ticket,
};
use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use parking_lot::RwLock;
use tabula_core::FlightConfig;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic::{Request, Response, Status, Streaming};
use tracing::{debug, info, warn};

use crate::error::FlightError;
use crate::registry::{display_ticket, DatasetRegistry};
use crate::Result;

/// How long `shutdown` waits for open connections to drain
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Lifecycle of a Flight server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Unbound,
    Listening,
    Closed,
}

/// Arrow Flight server bound to a local address
pub struct FlightServer {
    service: RegistryFlightService,
    local_addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<std::result::Result<(), tonic::transport::Error>>>,
}

impl FlightServer {
    /// Bind to `config.address()` and start serving `registry`
    ///
    /// Port 0 binds an ephemeral port; use [`FlightServer::local_addr`] to
    /// find out which one.
    pub async fn bind(config: &FlightConfig, registry: DatasetRegistry) -> Result<Self> {
        let service = RegistryFlightService::new(Arc::new(registry));

        let listener = TcpListener::bind(config.address()).await?;
        let local_addr = listener.local_addr()?;
        let incoming = TcpListenerStream::new(listener);

        let mut builder = Server::builder().timeout(config.timeout());
        if let Some(max) = config.max_concurrent_streams {
            builder = builder.max_concurrent_streams(max);
        }
        let router = builder.add_service(FlightServiceServer::new(service.clone()));

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        service.set_state(ServerState::Listening);
        let handle = tokio::spawn(async move {
            router
                .serve_with_incoming_shutdown(incoming, async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        info!("Flight server listening on {}", local_addr);

        Ok(Self {
            service,
            local_addr,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// URL a client can connect to
    pub fn url(&self) -> String {
        format!("http://{}", self.local_addr)
    }

    pub fn state(&self) -> ServerState {
        self.service.state()
    }

    pub fn is_closed(&self) -> bool {
        self.state() == ServerState::Closed
    }

    /// In-process handle to the service answering RPCs
    pub fn service(&self) -> &RegistryFlightService {
        &self.service
    }

    /// Stop accepting requests and wait for the listener to shut down.
    /// Calling this again is a no-op.
    pub async fn shutdown(&mut self) -> Result<()> {
        let Some(shutdown_tx) = self.shutdown_tx.take() else {
            return Ok(());
        };

        info!("Shutting down Flight server on {}", self.local_addr);
        self.service.set_state(ServerState::Closed);
        let _ = shutdown_tx.send(());

        if let Some(mut handle) = self.handle.take() {
            match tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await {
                Ok(Ok(served)) => served?,
                Ok(Err(e)) => return Err(FlightError::Internal(e.to_string())),
                Err(_) => {
                    warn!(
                        "Flight server on {} did not drain within {:?}, aborting",
                        self.local_addr, SHUTDOWN_GRACE
                    );
                    handle.abort();
                }
            }
        }

        Ok(())
    }
}

impl Drop for FlightServer {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            debug!("Flight server on {} dropped while listening", self.local_addr);
            self.service.set_state(ServerState::Closed);
            let _ = shutdown_tx.send(());
        }
    }
}

/// Flight service answering from a dataset registry
#[derive(Clone)]
pub struct RegistryFlightService {
    registry: Arc<DatasetRegistry>,
    state: Arc<RwLock<ServerState>>,
}

impl RegistryFlightService {
    /// Create a new service
    pub fn new(registry: Arc<DatasetRegistry>) -> Self {
        Self {
            registry,
            state: Arc::new(RwLock::new(ServerState::Unbound)),
        }
    }

    pub fn state(&self) -> ServerState {
        *self.state.read()
    }

    fn set_state(&self, state: ServerState) {
        *self.state.write() = state;
    }

    fn ensure_open(&self) -> std::result::Result<(), Status> {
        if self.state() == ServerState::Closed {
            return Err(FlightError::ServerClosed.into());
        }
        Ok(())
    }
}

#[tonic::async_trait]
impl FlightService for RegistryFlightService {
    type HandshakeStream = BoxStream<'static, std::result::Result<HandshakeResponse, Status>>;
    type ListFlightsStream = BoxStream<'static, std::result::Result<FlightInfo, Status>>;
    type DoGetStream = BoxStream<'static, std::result::Result<FlightData, Status>>;
    type DoPutStream = BoxStream<'static, std::result::Result<PutResult, Status>>;
    type DoActionStream = BoxStream<'static, std::result::Result<arrow_flight::Result, Status>>;
    type ListActionsStream = BoxStream<'static, std::result::Result<ActionType, Status>>;
    type DoExchangeStream = BoxStream<'static, std::result::Result<FlightData, Status>>;

    async fn handshake(
        &self,
        _request: Request<Streaming<HandshakeRequest>>,
    ) -> std::result::Result<Response<Self::HandshakeStream>, Status> {
        Err(Status::unimplemented("handshake is not supported"))
    }

    /// List catalog entries whose policy accepts the criteria
    async fn list_flights(
        &self,
        request: Request<Criteria>,
    ) -> std::result::Result<Response<Self::ListFlightsStream>, Status> {
        self.ensure_open()?;

        let criteria = request.into_inner().expression;
        debug!("list_flights: {} byte criteria", criteria.len());

        let matches = self.registry.matching(criteria);
        Ok(Response::new(stream::iter(matches.map(Ok)).boxed()))
    }

    async fn get_flight_info(
        &self,
        _request: Request<FlightDescriptor>,
    ) -> std::result::Result<Response<FlightInfo>, Status> {
        Err(Status::unimplemented("get_flight_info is not supported"))
    }

    async fn poll_flight_info(
        &self,
        _request: Request<FlightDescriptor>,
    ) -> std::result::Result<Response<PollInfo>, Status> {
        Err(Status::unimplemented("poll_flight_info is not supported"))
    }

    async fn get_schema(
        &self,
        _request: Request<FlightDescriptor>,
    ) -> std::result::Result<Response<SchemaResult>, Status> {
        Err(Status::unimplemented("get_schema is not supported"))
    }

    /// Produce a fresh dataset for the ticket and stream its batches
    async fn do_get(
        &self,
        request: Request<Ticket>,
    ) -> std::result::Result<Response<Self::DoGetStream>, Status> {
        self.ensure_open()?;

        let ticket = request.into_inner();
        let dataset = self.registry.resolve(&ticket.ticket).map_err(|e| {
            warn!("do_get failed: {}", e);
            Status::from(e)
        })?;

        info!(
            "Streaming {} batches ({} rows) for ticket '{}'",
            dataset.num_batches(),
            dataset.num_rows(),
            display_ticket(&ticket.ticket)
        );

        let schema = dataset.schema();
        let batches = dataset.into_batches();
        let flight_data_stream = FlightDataEncoderBuilder::new()
            .with_schema(schema)
            .build(stream::iter(batches.into_iter().map(Ok)))
            .map_err(|e| Status::internal(e.to_string()));

        Ok(Response::new(flight_data_stream.boxed()))
    }

    async fn do_put(
        &self,
        _request: Request<Streaming<FlightData>>,
    ) -> std::result::Result<Response<Self::DoPutStream>, Status> {
        Err(Status::unimplemented("do_put is not supported"))
    }

    async fn do_action(
        &self,
        request: Request<Action>,
    ) -> std::result::Result<Response<Self::DoActionStream>, Status> {
        Err(Status::unimplemented(format!(
            "Unknown action: {}",
            request.into_inner().r#type
        )))
    }

    async fn list_actions(
        &self,
        _request: Request<Empty>,
    ) -> std::result::Result<Response<Self::ListActionsStream>, Status> {
        Ok(Response::new(stream::empty().boxed()))
    }

    async fn do_exchange(
        &self,
        _request: Request<Streaming<FlightData>>,
    ) -> std::result::Result<Response<Self::DoExchangeStream>, Status> {
        Err(Status::unimplemented("do_exchange is not supported"))
    }
}
