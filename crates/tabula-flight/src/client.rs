//! Arrow Flight client for connecting to Flight servers
//!
//! Lists advertised flights and fetches datasets as record batch streams.
//! [`FlightClient::close`] may be called any number of times; once closed,
//! every call and every stream handed out earlier fails with
//! [`FlightError::ConnectionClosed`].

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use arrow::datatypes::{Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use arrow_flight::decode::FlightRecordBatchStream;
use arrow_flight::flight_service_client::FlightServiceClient;
use arrow_flight::{Criteria, FlightInfo, Ticket};
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt, TryStreamExt};
use tabula_core::{Dataset, FlightConfig};
use tonic::transport::{Channel, Endpoint};
use tonic::Status;
use tracing::{debug, info};

use crate::error::FlightError;
use crate::Result;

/// Flight client bound to one server
pub struct FlightClient {
    client: Option<FlightServiceClient<Channel>>,
    endpoint: String,
    closed: Arc<AtomicBool>,
}

impl FlightClient {
    /// Connect to a Flight server given as `host:port` or a full URL
    pub async fn connect(address: &str) -> Result<Self> {
        let endpoint = normalize_endpoint(address);
        let channel = Endpoint::from_shared(endpoint.clone())
            .map_err(|e| FlightError::InvalidRequest(e.to_string()))?
            .connect()
            .await?;
        Ok(Self::from_channel(channel, endpoint))
    }

    /// Connect using the host, port and timeouts from `config`
    pub async fn connect_with_config(config: &FlightConfig) -> Result<Self> {
        let endpoint = config.url();
        let channel = Endpoint::from_shared(endpoint.clone())
            .map_err(|e| FlightError::InvalidRequest(e.to_string()))?
            .connect_timeout(config.connect_timeout())
            .timeout(config.timeout())
            .connect()
            .await?;
        Ok(Self::from_channel(channel, endpoint))
    }

    fn from_channel(channel: Channel, endpoint: String) -> Self {
        info!("Connected to Flight server at {}", endpoint);
        Self {
            client: Some(FlightServiceClient::new(channel)),
            endpoint,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get the endpoint URL
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Release the connection. Closing an already closed client does nothing.
    pub fn close(&mut self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!("Flight client for {} already closed", self.endpoint);
            return;
        }
        self.client = None;
        info!("Closed Flight client for {}", self.endpoint);
    }

    fn client(&mut self) -> Result<&mut FlightServiceClient<Channel>> {
        if self.is_closed() {
            return Err(FlightError::ConnectionClosed);
        }
        self.client.as_mut().ok_or(FlightError::ConnectionClosed)
    }

    /// List flights the server advertises for `criteria`
    pub async fn list_flights(&mut self, criteria: impl Into<Bytes>) -> Result<FlightInfoStream> {
        let criteria = Criteria {
            expression: criteria.into(),
        };
        let response = self.client()?.list_flights(criteria).await?;

        Ok(FlightInfoStream {
            inner: response.into_inner().boxed(),
            guard: CloseGuard::new(Arc::clone(&self.closed)),
        })
    }

    /// List flights with empty criteria
    pub async fn list_flights_all(&mut self) -> Result<FlightInfoStream> {
        self.list_flights(Bytes::new()).await
    }

    /// Fetch the dataset behind `ticket` as a stream of batches
    ///
    /// Fails with [`FlightError::RequestError`] if the server does not know
    /// the ticket.
    pub async fn do_get(&mut self, ticket: impl Into<Bytes>) -> Result<RecordBatchStream> {
        let ticket = Ticket {
            ticket: ticket.into(),
        };
        let response = self.client()?.do_get(ticket).await?;

        let flight_data = response
            .into_inner()
            .map_err(arrow_flight::error::FlightError::from);

        Ok(RecordBatchStream {
            inner: Box::pin(FlightRecordBatchStream::new_from_flight_data(flight_data)),
            guard: CloseGuard::new(Arc::clone(&self.closed)),
        })
    }

    /// Fetch and collect a whole dataset
    pub async fn fetch(&mut self, ticket: impl Into<Bytes>) -> Result<Dataset> {
        let mut stream = self.do_get(ticket).await?;

        let mut batches = Vec::new();
        while let Some(batch) = stream.try_next().await? {
            batches.push(batch);
        }

        debug!("Fetched {} batches from {}", batches.len(), self.endpoint);

        let schema = stream
            .schema()
            .cloned()
            .or_else(|| batches.first().map(|b| b.schema()));
        match schema {
            Some(schema) => Ok(Dataset::try_new(schema, batches)?),
            // The server sent neither a schema nor any batch
            None => Ok(Dataset::empty(Arc::new(Schema::empty()))),
        }
    }
}

/// Ends a stream with `ConnectionClosed` once its client has been closed
struct CloseGuard {
    closed: Arc<AtomicBool>,
    done: bool,
}

impl CloseGuard {
    fn new(closed: Arc<AtomicBool>) -> Self {
        Self {
            closed,
            done: false,
        }
    }

    fn poll_closed<T>(&mut self) -> Option<Poll<Option<Result<T>>>> {
        if self.done {
            return Some(Poll::Ready(None));
        }
        if self.closed.load(Ordering::SeqCst) {
            self.done = true;
            return Some(Poll::Ready(Some(Err(FlightError::ConnectionClosed))));
        }
        None
    }

    fn observe<T>(&mut self, poll: Poll<Option<Result<T>>>) -> Poll<Option<Result<T>>> {
        if let Poll::Ready(None) = poll {
            self.done = true;
        }
        poll
    }
}

/// Lazy, single-pass stream of [`FlightInfo`] from `ListFlights`
pub struct FlightInfoStream {
    inner: BoxStream<'static, std::result::Result<FlightInfo, Status>>,
    guard: CloseGuard,
}

impl Stream for FlightInfoStream {
    type Item = Result<FlightInfo>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if let Some(closed) = this.guard.poll_closed() {
            return closed;
        }
        let poll = this
            .inner
            .poll_next_unpin(cx)
            .map(|item| item.map(|res| res.map_err(FlightError::from)));
        this.guard.observe(poll)
    }
}

/// Lazy stream of record batches from `DoGet`
pub struct RecordBatchStream {
    inner: Pin<Box<FlightRecordBatchStream>>,
    guard: CloseGuard,
}

impl RecordBatchStream {
    /// Schema of the stream, known once the first message has arrived
    pub fn schema(&self) -> Option<&SchemaRef> {
        self.inner.schema()
    }
}

impl Stream for RecordBatchStream {
    type Item = Result<RecordBatch>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if let Some(closed) = this.guard.poll_closed() {
            return closed;
        }
        let poll = this
            .inner
            .as_mut()
            .poll_next(cx)
            .map(|item| item.map(|res| res.map_err(FlightError::from)));
        this.guard.observe(poll)
    }
}

/// Accept `host:port` as well as full URLs
fn normalize_endpoint(address: &str) -> String {
    if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_connection() {
        // Nothing listens on port 1
        let result = FlightClient::connect("127.0.0.1:1").await;
        assert!(matches!(result, Err(FlightError::ConnectionError(_))));
    }

    #[tokio::test]
    async fn test_malformed_address() {
        let result = FlightClient::connect("http://bad host:50051").await;
        assert!(matches!(result, Err(FlightError::InvalidRequest(_))));
    }

    #[test]
    fn test_normalize_endpoint() {
        assert_eq!(normalize_endpoint("localhost:50051"), "http://localhost:50051");
        assert_eq!(
            normalize_endpoint("http://127.0.0.1:9000"),
            "http://127.0.0.1:9000"
        );
    }

    #[tokio::test]
    async fn test_close_guard_ends_stream() {
        let closed = Arc::new(AtomicBool::new(false));
        let mut stream = FlightInfoStream {
            inner: futures::stream::iter(vec![Ok(FlightInfo::new()), Ok(FlightInfo::new())])
                .boxed(),
            guard: CloseGuard::new(Arc::clone(&closed)),
        };

        assert!(stream.next().await.unwrap().is_ok());
        closed.store(true, Ordering::SeqCst);
        assert!(matches!(
            stream.next().await,
            Some(Err(FlightError::ConnectionClosed))
        ));
        assert!(stream.next().await.is_none());
    }
}
