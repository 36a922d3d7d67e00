//! End-to-end tests against the live mock server.
//!
//! # Design
//! Each test starts its own mock server on a random port (so catalog state
//! never leaks between tests) and drives the real reqwest transport through
//! the client's async and blocking surfaces.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use httwrap::{
    CancellationToken, Client, Configuration, Credentials, Error, HttpRequest, Interceptor, RequestOptions,
    ResponseHead, TransportError,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Product {
    id: u64,
    name: String,
    price: f64,
}

#[derive(Serialize)]
struct NewProduct<'a> {
    name: &'a str,
    price: f64,
}

async fn start_server() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(mock_server::run(listener));
    addr
}

/// Start the server on its own thread for the blocking tests.
fn start_server_thread() -> SocketAddr {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
        .unwrap();
    });
    addr
}

/// A listener that accepts connections and never writes a byte back.
async fn start_silent_listener() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    addr
}

fn base(addr: SocketAddr) -> String {
    format!("http://{addr}/api/")
}

async fn anonymous_client(addr: SocketAddr) -> Client {
    Client::connect(Configuration::new(base(addr)).unwrap()).await.unwrap()
}

#[tokio::test]
async fn get_products_returns_ok_with_data() {
    let client = anonymous_client(start_server().await).await;

    let response = client
        .get_as::<Vec<Product>>("products", &RequestOptions::new())
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert!(response.success());
    assert!(!response.data.is_empty());
    assert_eq!(
        response.raw().and_then(|h| h.header("content-type")),
        Some("application/json")
    );
}

#[tokio::test]
async fn create_product_returns_created_without_success() {
    let client = anonymous_client(start_server().await).await;

    let response = client
        .post(
            "products",
            &NewProduct {
                name: "Test Product",
                price: 29.99,
            },
            &RequestOptions::new(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), 201);
    assert!(!response.success());
    let created: Product = serde_json::from_str(response.body()).unwrap();
    assert_eq!(created.name, "Test Product");
}

#[tokio::test]
async fn delete_product_returns_no_content() {
    let client = anonymous_client(start_server().await).await;

    let response = client.delete("products/1", &RequestOptions::new()).await.unwrap();

    assert_eq!(response.status(), 204);
    assert_eq!(response.body(), "");
}

#[tokio::test]
async fn missing_product_raises_http_error() {
    let client = anonymous_client(start_server().await).await;

    let err = client.get("products/404", &RequestOptions::new()).await.unwrap_err();

    match err {
        Error::Http { status, body } => {
            assert_eq!(status, 404);
            assert_eq!(body, "product 404 not found");
        }
        other => panic!("expected Http error, got {other:?}"),
    }
}

#[tokio::test]
async fn noop_handler_returns_404_normally() {
    let client = anonymous_client(start_server().await).await;

    let response = client
        .get("products/404", &RequestOptions::new().error_handler(|_, _| Ok(())))
        .await
        .unwrap();

    assert_eq!(response.status(), 404);
    assert!(!response.success());
}

#[tokio::test]
async fn redirect_range_is_not_an_error_but_server_errors_are() {
    let client = anonymous_client(start_server().await).await;
    let options = RequestOptions::new();

    let accepted = client.get("status/202", &options).await.unwrap();
    assert_eq!(accepted.status(), 202);

    let err = client.get("status/503", &options).await.unwrap_err();
    assert_eq!(err.status(), Some(503));
}

#[tokio::test]
async fn password_grant_authenticates_later_calls() {
    let addr = start_server().await;
    let credentials = Credentials::password_grant(
        mock_server::DEMO_USERNAME,
        mock_server::DEMO_PASSWORD,
        format!("http://{addr}/api/token"),
    )
    .unwrap();
    let config = Configuration::new(base(addr)).unwrap().with_credentials(credentials);
    let client = Client::connect(config).await.unwrap();

    let me = client
        .get_as::<serde_json::Value>("me", &RequestOptions::new())
        .await
        .unwrap();
    assert_eq!(me.data["username"], "demo");
}

#[tokio::test]
async fn password_grant_with_bad_password_fails_construction() {
    let addr = start_server().await;
    let credentials =
        Credentials::password_grant("demo", "wrong", format!("http://{addr}/api/token")).unwrap();
    let config = Configuration::new(base(addr)).unwrap().with_credentials(credentials);

    let err = Client::connect(config).await.unwrap_err();
    assert!(matches!(err, Error::Authentication(ref m) if m.contains("invalid_grant")));
}

#[tokio::test]
async fn unreachable_token_endpoint_fails_construction() {
    let closed = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let credentials =
        Credentials::password_grant("demo", "secret", format!("http://{closed}/api/token")).unwrap();
    let config = Configuration::new(base(closed)).unwrap().with_credentials(credentials);

    let err = Client::connect(config).await.unwrap_err();
    assert!(matches!(err, Error::Authentication(_)));
}

#[tokio::test]
async fn custom_headers_replace_defaults_on_the_wire() {
    let client = anonymous_client(start_server().await).await;

    let echoed = client
        .get_as::<std::collections::HashMap<String, String>>(
            "headers",
            &RequestOptions::new()
                .header("Accept", "application/vnd.catalog+json")
                .header("X-Request-Id", "req-7"),
        )
        .await
        .unwrap();

    assert_eq!(echoed.data["accept"], "application/vnd.catalog+json");
    assert_eq!(echoed.data["user-agent"], "Httwrap");
    assert_eq!(echoed.data["x-request-id"], "req-7");
}

#[tokio::test]
async fn query_payload_reaches_server() {
    #[derive(Serialize)]
    struct Search<'a> {
        name: &'a str,
        max_price: Option<f64>,
    }

    let client = anonymous_client(start_server().await).await;

    let found = client
        .get_with_query_as::<Vec<Product>, _>(
            "products/search",
            &Search {
                name: "mug",
                max_price: None,
            },
            &RequestOptions::new(),
        )
        .await
        .unwrap();

    assert_eq!(found.data.len(), 1);
    assert_eq!(found.data[0].name, "Coffee Mug");
}

#[tokio::test]
async fn silent_token_endpoint_fails_construction_within_default_timeout() {
    let silent = start_silent_listener().await;
    let credentials =
        Credentials::password_grant("demo", "secret", format!("http://{silent}/api/token")).unwrap();
    let config = Configuration::new(base(silent))
        .unwrap()
        .with_credentials(credentials)
        .with_default_timeout(Duration::from_millis(200));

    let result = tokio::time::timeout(Duration::from_secs(5), Client::connect(config))
        .await
        .expect("construction must give up on its own");
    match result {
        Err(Error::Authentication(message)) => assert!(message.contains("timed out"), "{message}"),
        other => panic!("expected authentication failure, got {other:?}"),
    }
}

#[tokio::test]
async fn silent_server_times_out_without_per_call_timeout() {
    let silent = start_silent_listener().await;
    let config = Configuration::new(base(silent))
        .unwrap()
        .with_default_timeout(Duration::from_millis(200));
    let client = Client::connect(config).await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), client.get("products", &RequestOptions::new()))
        .await
        .expect("call must give up on its own");
    assert!(matches!(
        result,
        Err(Error::RequestFailed {
            source: TransportError::Timeout,
            ..
        })
    ));
}

#[tokio::test]
async fn per_call_timeouts_do_not_interfere() {
    let client = anonymous_client(start_server().await).await;
    let short = RequestOptions::new().timeout(Duration::from_millis(100));
    let long = RequestOptions::new().timeout(Duration::from_secs(10));

    let (fast_fail, slow_ok) = tokio::join!(
        client.get("slow?ms=2000", &short),
        client.get("slow?ms=300", &long),
    );

    assert!(matches!(
        fast_fail,
        Err(Error::RequestFailed {
            source: TransportError::Timeout,
            ..
        })
    ));
    assert_eq!(slow_ok.unwrap().body(), "done");
}

#[tokio::test]
async fn cancellation_aborts_in_flight_call() {
    let client = anonymous_client(start_server().await).await;
    let token = CancellationToken::new();
    let options = RequestOptions::new().cancel_on(token.clone());

    let canceller = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    };
    let (result, ()) = tokio::join!(client.get("slow?ms=5000", &options), canceller);

    match result {
        Err(Error::RequestFailed { path, source, .. }) => {
            assert_eq!(path, "slow?ms=5000");
            assert!(matches!(source, TransportError::Cancelled));
        }
        other => panic!("expected cancellation, got {other:?}"),
    }
}

#[tokio::test]
async fn tls_only_credentials_refuse_plain_http() {
    let addr = start_server().await;
    let config = Configuration::new(base(addr))
        .unwrap()
        .with_credentials(Credentials::bearer("token", true).unwrap());
    let client = Client::connect(config).await.unwrap();

    let err = client.get("products", &RequestOptions::new()).await.unwrap_err();
    assert!(matches!(err, Error::RequestFailed { .. }));
}

#[tokio::test]
async fn interceptors_see_live_exchange() {
    #[derive(Clone, Default)]
    struct Audit(Arc<Mutex<Vec<(String, u16)>>>);

    impl Interceptor for Audit {
        fn on_response(&self, request: &HttpRequest, response: &ResponseHead) {
            self.0.lock().unwrap().push((request.url.clone(), response.status));
        }
    }

    let addr = start_server().await;
    let mut client = anonymous_client(addr).await;
    let audit = Audit::default();
    client.add_interceptor(audit.clone());

    client.get("products", &RequestOptions::new()).await.unwrap();
    client.get("products/77", &RequestOptions::new()).await.unwrap_err();

    assert_eq!(
        *audit.0.lock().unwrap(),
        vec![
            (format!("http://{addr}/api/products"), 200),
            (format!("http://{addr}/api/products/77"), 404),
        ]
    );
}

#[test]
fn blocking_catalog_lifecycle() {
    let addr = start_server_thread();
    let credentials = Credentials::password_grant(
        mock_server::DEMO_USERNAME,
        mock_server::DEMO_PASSWORD,
        format!("http://{addr}/api/token"),
    )
    .unwrap();
    let config = Configuration::new(base(addr)).unwrap().with_credentials(credentials);
    let client = Client::new(config).unwrap();
    let options = RequestOptions::new();

    let created = client
        .post_blocking("products", &NewProduct { name: "Pen", price: 1.5 }, &options)
        .unwrap();
    assert_eq!(created.status(), 201);
    let created: Product = serde_json::from_str(created.body()).unwrap();

    let path = format!("products/{}", created.id);
    client
        .patch_blocking(&path, &serde_json::json!({ "price": 2.0 }), &options)
        .unwrap();
    let fetched = client.get_as_blocking::<Product>(&path, &options).unwrap();
    assert_eq!(fetched.data.price, 2.0);

    client
        .put_blocking(&path, &NewProduct { name: "Fountain Pen", price: 12.0 }, &options)
        .unwrap();
    let listed = client.get_as_blocking::<Vec<Product>>("products", &options).unwrap();
    assert!(listed.data.iter().any(|p| p.name == "Fountain Pen"));

    let deleted = client.delete_blocking(&path, &options).unwrap();
    assert_eq!(deleted.status(), 204);

    let err = client.get_blocking(&path, &options).unwrap_err();
    assert_eq!(err.status(), Some(404));

    client.dispose();
}
