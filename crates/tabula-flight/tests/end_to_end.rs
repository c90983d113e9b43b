use std::sync::Arc;

use arrow::array::{Array, AsArray};
use arrow::datatypes::Int64Type;
use futures::TryStreamExt;
use tabula_core::{fixtures, FlightConfig};
use tabula_flight::{DatasetRegistry, FlightClient, FlightError, FlightServer};

async fn start_server() -> FlightServer {
    let registry = DatasetRegistry::with_fixtures().unwrap();
    FlightServer::bind(&FlightConfig::ephemeral(), registry)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_flight_list_flights() {
    let mut server = start_server().await;
    let mut client = FlightClient::connect(&server.local_addr().to_string())
        .await
        .unwrap();

    let flights: Vec<_> = client
        .list_flights_all()
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert!(flights.is_empty());

    let flights: Vec<_> = client
        .list_flights(fixtures::EXPECTED_CRITERIA)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(flights.len(), 1);

    let info = &flights[0];
    assert_eq!(
        info.flight_descriptor.as_ref().unwrap().path,
        vec![fixtures::ADVERTISED_PATH.to_string()]
    );
    assert!(info.endpoint.is_empty());
    assert_eq!(info.total_records, -1);
    assert_eq!(info.total_bytes, -1);
    assert!(info.clone().try_decode_schema().unwrap().fields().is_empty());

    client.close();
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_flight_client_close() {
    let mut server = start_server().await;
    let mut client = FlightClient::connect(&server.url()).await.unwrap();

    let flights: Vec<_> = client
        .list_flights_all()
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert!(flights.is_empty());

    client.close();
    client.close();
    assert!(client.is_closed());

    assert!(matches!(
        client.list_flights_all().await,
        Err(FlightError::ConnectionClosed)
    ));
    assert!(matches!(
        client.do_get(fixtures::INTS_TICKET).await,
        Err(FlightError::ConnectionClosed)
    ));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_stream_from_before_close_fails_after_close() {
    let mut server = start_server().await;
    let mut client = FlightClient::connect(&server.url()).await.unwrap();

    let mut stream = client.do_get(fixtures::DICTS_TICKET).await.unwrap();
    client.close();

    let err = stream.try_next().await.unwrap_err();
    assert!(matches!(err, FlightError::ConnectionClosed));
    assert!(stream.try_next().await.unwrap().is_none());

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_do_get_every_fixture() {
    let mut server = start_server().await;
    let mut client = FlightClient::connect(&server.url()).await.unwrap();

    let expected = [
        (fixtures::INTS_TICKET, fixtures::simple_ints_table().unwrap()),
        (fixtures::DICTS_TICKET, fixtures::simple_dicts_table().unwrap()),
        (fixtures::MULTI_TICKET, fixtures::multiple_column_table().unwrap()),
    ];

    for (ticket, dataset) in expected {
        let fetched = client.fetch(ticket).await.unwrap();
        assert_eq!(fetched.num_rows(), dataset.num_rows());
        assert_eq!(fetched.num_batches(), dataset.num_batches());
        assert_eq!(
            fetched.schema().fields().len(),
            dataset.schema().fields().len()
        );
    }

    client.close();
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_repeated_do_get_yields_identical_data() {
    let mut server = start_server().await;
    let mut client = FlightClient::connect(&server.url()).await.unwrap();

    let first = client.fetch(fixtures::MULTI_TICKET).await.unwrap();
    let second = client.fetch(fixtures::MULTI_TICKET).await.unwrap();
    assert_eq!(first.batches(), second.batches());
    assert!(!Arc::ptr_eq(
        first.batches()[0].column(0),
        second.batches()[0].column(0)
    ));

    let ints = first.batches()[0].column(1).as_primitive::<Int64Type>();
    assert_eq!(ints.values().to_vec(), vec![1, 2, 3, 4]);

    client.close();
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_dictionary_nulls_survive_transfer() {
    let mut server = start_server().await;
    let mut client = FlightClient::connect(&server.url()).await.unwrap();

    let dicts = client.fetch(fixtures::DICTS_TICKET).await.unwrap();
    let nulls: usize = dicts
        .batches()
        .iter()
        .map(|b| b.column(0).null_count())
        .sum();
    assert_eq!(nulls, 1);

    client.close();
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_do_get_unknown_ticket_is_request_error() {
    let mut server = start_server().await;
    let mut client = FlightClient::connect(&server.url()).await.unwrap();

    let result = client.do_get("no-such-ticket").await;
    match result {
        Err(FlightError::RequestError(msg)) => assert!(msg.contains("no-such-ticket")),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("unknown ticket returned a stream"),
    }

    client.close();
    server.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_do_get_same_ticket() {
    let mut server = start_server().await;
    let url = server.url();

    let fetch = |url: String| async move {
        let mut client = FlightClient::connect(&url).await.unwrap();
        let dataset = client.fetch(fixtures::INTS_TICKET).await.unwrap();
        client.close();
        dataset
    };

    let (a, b) = tokio::join!(
        tokio::spawn(fetch(url.clone())),
        tokio::spawn(fetch(url.clone()))
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    for dataset in [&a, &b] {
        let values = dataset.batches()[0].column(0).as_primitive::<Int64Type>();
        assert_eq!(values.values().to_vec(), vec![-10, -5, 0, 5, 10]);
    }
    assert_eq!(a.batches(), b.batches());

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_connect_with_config() {
    let mut server = start_server().await;
    let config = FlightConfig::local(server.port()).with_timeout_secs(5);

    let mut client = FlightClient::connect_with_config(&config).await.unwrap();
    assert_eq!(client.endpoint(), server.url());
    assert_eq!(client.fetch(fixtures::INTS_TICKET).await.unwrap().num_rows(), 5);

    client.close();
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_requests_fail_after_server_shutdown() {
    let mut server = start_server().await;
    let mut client = FlightClient::connect(&server.url()).await.unwrap();

    assert_eq!(client.fetch(fixtures::INTS_TICKET).await.unwrap().num_rows(), 5);

    server.shutdown().await.unwrap();
    assert!(server.is_closed());

    match client.fetch(fixtures::INTS_TICKET).await {
        Err(FlightError::ConnectionError(_)) | Err(FlightError::ServerClosed) => {}
        Err(other) => panic!("unexpected error after shutdown: {other:?}"),
        Ok(_) => panic!("fetch succeeded after shutdown"),
    }
    client.close();
}
