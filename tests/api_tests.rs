use std::sync::Arc;
use std::time::Duration;

use soundpull::{
    ApiEndpoint, ApiError, Catalog, DetailResolver, ErrorKind, FetchError, Fetcher, ReqwestClient,
    RequestState, SearchClient, SoundBrowser, SqliteCatalog,
};
use tempfile::tempdir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const RAIN_SEARCH: &str = r#"{
    "batchcomplete": "",
    "query": {
        "searchinfo": {"totalhits": 3},
        "search": [
            {"ns": 6, "title": "Rain.ogg", "pageid": 11},
            {"ns": 6, "title": "Rain.pdf", "pageid": 12},
            {"ns": 0, "title": "Rain.wav", "pageid": 13}
        ]
    }
}"#;

const RAIN_DETAILS: &str = r#"{
    "query": {"pages": {"11": {
        "pageid": 11, "ns": 6, "title": "Rain.ogg",
        "imageinfo": [{
            "url": "https://x/Rain.ogg",
            "descriptionurl": "https://commons.example.org/wiki/File:Rain.ogg"
        }]
    }}}
}"#;

fn client() -> Arc<ReqwestClient> {
    Arc::new(
        ReqwestClient::new(
            Duration::from_secs(5),
            Duration::from_secs(5),
            Duration::from_secs(5),
        )
        .unwrap(),
    )
}

fn endpoint(server: &MockServer, token: Option<&str>) -> ApiEndpoint {
    ApiEndpoint::new(&server.uri(), token.map(str::to_string)).unwrap()
}

#[tokio::test]
async fn search_sends_qualified_query_and_filters_results() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/w/api.php"))
        .and(query_param("action", "query"))
        .and(query_param("list", "search"))
        .and(query_param("srsearch", "rain sounds"))
        .and(query_param("srnamespace", "6"))
        .and(query_param("format", "json"))
        .and(query_param("srlimit", "20"))
        .respond_with(ResponseTemplate::new(200).set_body_string(RAIN_SEARCH))
        .expect(1)
        .mount(&server)
        .await;

    let results = SearchClient::new(client(), endpoint(&server, None))
        .search("rain")
        .await
        .unwrap();

    let titles: Vec<_> = results.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, vec!["Rain.ogg"]);
    assert_eq!(results[0].identifier, 11);

    let requests = server.received_requests().await.unwrap();
    let query = requests[0].url.query().unwrap_or_default().to_string();
    assert!(query.contains("srsearch=rain+sounds"));
    assert!(!query.contains("token="));
}

#[tokio::test]
async fn configured_token_is_attached_to_api_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/w/api.php"))
        .and(query_param("token", "s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_string(RAIN_DETAILS))
        .expect(1)
        .mount(&server)
        .await;

    let details = DetailResolver::new(client(), endpoint(&server, Some("s3cret")))
        .resolve_details("Rain.ogg")
        .await
        .unwrap();

    assert_eq!(details.title, "Rain.ogg");
    assert_eq!(details.direct_url, "https://x/Rain.ogg");
}

#[tokio::test]
async fn details_query_names_the_title() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/w/api.php"))
        .and(query_param("prop", "imageinfo"))
        .and(query_param("titles", "Rain.ogg"))
        .and(query_param("iiprop", "url"))
        .respond_with(ResponseTemplate::new(200).set_body_string(RAIN_DETAILS))
        .mount(&server)
        .await;

    let details = DetailResolver::new(client(), endpoint(&server, None))
        .resolve_details("Rain.ogg")
        .await
        .unwrap();

    assert_eq!(
        details.description_url.as_deref(),
        Some("https://commons.example.org/wiki/File:Rain.ogg")
    );
}

#[tokio::test]
async fn server_errors_carry_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = SearchClient::new(client(), endpoint(&server, None))
        .search("rain")
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Status { status: 503, .. }));
    assert_eq!(err.kind(), ErrorKind::ApiError);
}

#[tokio::test]
async fn slow_server_times_out_as_network_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(RAIN_SEARCH)
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let client = Arc::new(
        ReqwestClient::new(
            Duration::from_millis(200),
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .unwrap(),
    );
    let err = SearchClient::new(client, endpoint(&server, None))
        .search("rain")
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Timeout { .. }));
    assert_eq!(err.kind(), ErrorKind::NetworkFailure);
}

#[tokio::test]
async fn browser_reports_success_state() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("list", "search"))
        .respond_with(ResponseTemplate::new(200).set_body_string(RAIN_SEARCH))
        .mount(&server)
        .await;

    let browser = SoundBrowser::new(client(), endpoint(&server, None));
    let handle = browser.search("rain");
    assert_eq!(handle.state(), RequestState::Loading);

    match handle.settled().await {
        RequestState::Success(results) => assert_eq!(results.len(), 1),
        other => panic!("unexpected state {other:?}"),
    }
}

#[tokio::test]
async fn fetch_downloads_and_catalogs_without_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/Rain.ogg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"OggS rain".to_vec()))
        .expect(2)
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let catalog = Arc::new(SqliteCatalog::open(&dir.path().join("catalog.db")).unwrap());
    let fetcher = Fetcher::new(client(), catalog.clone(), dir.path().join("sounds"));
    let url = format!("{}/files/Rain.ogg", server.uri());

    let first = fetcher.fetch_and_catalog(&url, "Rain.ogg").await.unwrap();
    let second = fetcher.fetch_and_catalog(&url, "Rain.ogg").await.unwrap();

    assert_eq!(first.local_path, dir.path().join("sounds").join("Rain.ogg"));
    assert_eq!(second.local_path, dir.path().join("sounds").join("Rain_1.ogg"));
    assert_eq!(std::fs::read(&first.local_path).unwrap(), b"OggS rain");
    assert_eq!(catalog.list_all().unwrap().len(), 2);

    let requests = server.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| r.url.query().is_none()));
}

#[tokio::test]
async fn fetch_of_missing_file_writes_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let root = dir.path().join("sounds");
    let catalog = Arc::new(SqliteCatalog::in_memory().unwrap());
    let fetcher = Fetcher::new(client(), catalog.clone(), &root);

    let err = fetcher
        .fetch_and_catalog(&format!("{}/files/Nope.ogg", server.uri()), "Nope.ogg")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ApiError);
    assert!(!root.exists());
    assert!(catalog.list_all().unwrap().is_empty());
}

/// Serves one response whose body arrives in chunks separated by `gaps`.
async fn trickle_server(chunks: Vec<&'static [u8]>, gaps: Vec<Duration>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = [0u8; 1024];
        let _ = socket.read(&mut request).await;
        let length: usize = chunks.iter().map(|c| c.len()).sum();
        let head = format!("HTTP/1.1 200 OK\r\nContent-Length: {length}\r\n\r\n");
        let _ = socket.write_all(head.as_bytes()).await;
        for (chunk, gap) in chunks.into_iter().zip(gaps) {
            tokio::time::sleep(gap).await;
            let _ = socket.write_all(chunk).await;
            let _ = socket.flush().await;
        }
    });
    format!("http://{addr}/files/Wind.ogg")
}

#[tokio::test]
async fn slow_download_outlives_api_timeout() {
    let gap = Duration::from_millis(400);
    let url = trickle_server(
        vec![b"OggS wind ", b"keeps on  ", b"blowing.  "],
        vec![gap, gap, gap],
    )
    .await;

    let dir = tempdir().unwrap();
    let catalog = Arc::new(SqliteCatalog::in_memory().unwrap());
    let client = Arc::new(
        ReqwestClient::new(
            Duration::from_millis(500),
            Duration::from_secs(1),
            Duration::from_secs(5),
        )
        .unwrap(),
    );
    let fetcher = Fetcher::new(client, catalog.clone(), dir.path());

    let entry = fetcher.fetch_and_catalog(&url, "Wind.ogg").await.unwrap();

    assert_eq!(
        std::fs::read(&entry.local_path).unwrap(),
        b"OggS wind keeps on  blowing.  "
    );
    assert_eq!(catalog.list_all().unwrap().len(), 1);
}

#[tokio::test]
async fn stalled_download_reports_timeout() {
    let url = trickle_server(
        vec![b"OggS wind ", b"never comes"],
        vec![Duration::ZERO, Duration::from_millis(1500)],
    )
    .await;

    let dir = tempdir().unwrap();
    let root = dir.path().join("sounds");
    let catalog = Arc::new(SqliteCatalog::in_memory().unwrap());
    let client = Arc::new(
        ReqwestClient::new(
            Duration::from_secs(5),
            Duration::from_secs(1),
            Duration::from_millis(300),
        )
        .unwrap(),
    );
    let fetcher = Fetcher::new(client, catalog.clone(), &root);

    let err = fetcher.fetch_and_catalog(&url, "Wind.ogg").await.unwrap_err();

    assert!(matches!(err, FetchError::Timeout { .. }), "got {err:?}");
    assert_eq!(err.kind(), ErrorKind::NetworkFailure);
    assert_eq!(std::fs::read_dir(&root).unwrap().count(), 0);
    assert!(catalog.list_all().unwrap().is_empty());
}
