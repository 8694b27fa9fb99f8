//! HTTPS collection against a local mutual-TLS server

use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::{Path as UrlPath, State};
use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
use axum::routing::get;
use axum::Router;
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair, KeyUsagePurpose,
};
use rustls::RootCertStore;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::server::WebPkiClientVerifier;
use serde_json::json;
use tempfile::TempDir;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tokio_rustls::server::TlsStream;
use url::Url;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use datafile_collector::collect::{
    CertificatePaths, Classify, ClientFactory, CollectSettings, ConnectionManager, FailureKind,
};
use datafile_collector::model::{FileData, FileReadyEvent};
use datafile_collector::observability::Counters;
use datafile_collector::publish::{PublishConfig, PublishOutcome, PublishedFileCache, Publisher};
use datafile_collector::worker::{Job, JobRunner};

const KEYSTORE_PASSWORD: &str = "changeit";

/// A CA plus the leaf certificates it signed
struct Authority {
    cert: rcgen::Certificate,
    key: KeyPair,
}

impl Authority {
    fn new(name: &str) -> Self {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.distinguished_name = named(name);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        let cert = params.self_signed(&key).unwrap();
        Self { cert, key }
    }

    fn issue(&self, name: &str, sans: Vec<String>, usage: ExtendedKeyUsagePurpose) -> (rcgen::Certificate, KeyPair) {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(sans).unwrap();
        params.distinguished_name = named(name);
        params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
        params.extended_key_usages = vec![usage];
        let cert = params.signed_by(&key, &self.cert, &self.key).unwrap();
        (cert, key)
    }

    fn issue_server(&self) -> (rcgen::Certificate, KeyPair) {
        self.issue(
            "pnf.local",
            vec!["127.0.0.1".to_string(), "localhost".to_string()],
            ExtendedKeyUsagePurpose::ServerAuth,
        )
    }
}

fn named(common_name: &str) -> DistinguishedName {
    let mut name = DistinguishedName::new();
    name.push(DnType::CommonName, common_name);
    name
}

/// Write the collector's keystore, its password and the trusted CA to `dir`
fn write_client_credentials(ca: &Authority, dir: &Path) -> CertificatePaths {
    let (cert, key) = ca.issue("dfc", Vec::new(), ExtendedKeyUsagePurpose::ClientAuth);

    let pkey = openssl::pkey::PKey::private_key_from_pem(key.serialize_pem().as_bytes()).unwrap();
    let x509 = openssl::x509::X509::from_pem(cert.pem().as_bytes()).unwrap();
    let keystore = openssl::pkcs12::Pkcs12::builder()
        .name("dfc")
        .pkey(&pkey)
        .cert(&x509)
        .build2(KEYSTORE_PASSWORD)
        .unwrap()
        .to_der()
        .unwrap();

    let paths = CertificatePaths {
        key_cert_path: dir.join("cert.p12"),
        key_cert_password_path: dir.join("p12.pass"),
        trusted_ca_path: dir.join("trust.pem"),
        trusted_ca_password_path: None,
    };
    std::fs::write(&paths.key_cert_path, keystore).unwrap();
    std::fs::write(&paths.key_cert_password_path, format!("{}\n", KEYSTORE_PASSWORD)).unwrap();
    std::fs::write(&paths.trusted_ca_path, ca.cert.pem()).unwrap();
    paths
}

/// TLS 1.2 server config that only accepts clients signed by `client_ca`
fn server_config(server_ca: &Authority, client_ca: &Authority) -> rustls::ServerConfig {
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let mut roots = RootCertStore::empty();
    roots.add(client_ca.cert.der().clone()).unwrap();
    let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), Arc::clone(&provider))
        .build()
        .unwrap();

    let (cert, key) = server_ca.issue_server();
    let chain: Vec<CertificateDer<'static>> = vec![cert.der().clone()];
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key.serialize_der()));

    rustls::ServerConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS12])
        .unwrap()
        .with_client_cert_verifier(verifier)
        .with_single_cert(chain, key)
        .unwrap()
}

/// Accepts TCP connections and completes the TLS handshake before handing them to axum
struct TlsListener {
    tcp: TcpListener,
    acceptor: TlsAcceptor,
}

impl axum::serve::Listener for TlsListener {
    type Io = TlsStream<TcpStream>;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        loop {
            let Ok((stream, addr)) = self.tcp.accept().await else {
                continue;
            };
            // rejected handshakes never reach the router
            if let Ok(tls) = self.acceptor.accept(stream).await {
                return (tls, addr);
            }
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        self.tcp.local_addr()
    }
}

async fn serve_file(
    State(hits): State<Arc<AtomicUsize>>,
    UrlPath(file): UrlPath<String>,
    headers: HeaderMap,
) -> (StatusCode, Vec<u8>) {
    hits.fetch_add(1, Ordering::SeqCst);
    // pnf:secret
    let authorized = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "Basic cG5mOnNlY3JldA==");
    if !authorized {
        return (StatusCode::UNAUTHORIZED, Vec::new());
    }
    (StatusCode::OK, format!("<measCollecFile name=\"{}\"/>", file).into_bytes())
}

/// Start the PNF file server; returns its address and a request counter
async fn start_pnf(config: rustls::ServerConfig) -> (SocketAddr, Arc<AtomicUsize>) {
    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = tcp.local_addr().unwrap();
    let listener = TlsListener {
        tcp,
        acceptor: TlsAcceptor::from(Arc::new(config)),
    };

    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/pm/{file}", get(serve_file))
        .with_state(Arc::clone(&hits));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, hits)
}

fn https_file(pnf: SocketAddr, name: &str) -> FileData {
    let value = json!({
        "event": {
            "commonEventHeader": {
                "eventName": "Noti_RnNode-Ericsson_FileReady",
                "sourceName": "5GRAN_DU",
                "startEpochMicrosec": 8745745764578_i64,
                "lastEpochMicrosec": 8745745764578_i64,
                "timeZoneOffset": "UTC+05.30"
            },
            "notificationFields": {
                "changeIdentifier": "PM_MEAS_FILES",
                "changeType": "FileReady",
                "notificationFieldsVersion": "2.0",
                "arrayOfNamedHashMap": [{
                    "name": name,
                    "hashMap": {
                        "location": format!("https://pnf:secret@{}/pm/{}", pnf, name),
                        "compression": "gzip",
                        "fileFormatType": "org.3GPP.32.435#measCollec",
                        "fileFormatVersion": "V10"
                    }
                }]
            }
        }
    });
    let mut event = FileReadyEvent::from_json(&value).unwrap();
    event.files.remove(0)
}

struct Collector {
    runner: JobRunner,
    counters: Arc<Counters>,
    cache: Arc<PublishedFileCache>,
}

fn collector(connections: Arc<ConnectionManager>, paths: CertificatePaths, router: &MockServer, root: &Path) -> Collector {
    let counters = Arc::new(Counters::new());
    let cache = Arc::new(PublishedFileCache::new(16));
    let settings = CollectSettings {
        certificates: Some(paths),
        ..CollectSettings::default()
    };
    let factory = ClientFactory::new(settings, connections).unwrap();
    let publisher = Publisher::new(
        PublishConfig {
            url: Url::parse(&format!("{}/publish/1", router.uri())).unwrap(),
            user: "dradmin".to_string(),
            password: "dradmin".to_string(),
            timeout: Duration::from_secs(5),
            max_redirects: 2,
        },
        Arc::clone(&cache),
        Arc::clone(&counters),
    )
    .unwrap();
    let runner = JobRunner::new(
        Arc::new(factory),
        Arc::new(publisher),
        Arc::clone(&counters),
        root.join("collected"),
    );
    Collector {
        runner,
        counters,
        cache,
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_https_file_collected_and_published() {
    let ca = Authority::new("dfc test ca");
    let dir = TempDir::new().unwrap();
    let paths = write_client_credentials(&ca, dir.path());
    let (pnf, hits) = start_pnf(server_config(&ca, &ca)).await;

    let router = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&router)
        .await;

    let connections = Arc::new(ConnectionManager::new(8));
    connections.setup_or_update(&paths).unwrap();
    assert!(connections.is_initialized());

    let collector = collector(connections, paths, &router, dir.path());
    let file = https_file(pnf, "A20240101.0000-0015.xml.gz");

    let outcome = collector.runner.run(Job::new(file.clone(), 1)).await.unwrap();
    assert_eq!(outcome, PublishOutcome::Published);

    let counters = collector.counters.snapshot();
    assert_eq!(counters.collected_files, 1);
    assert_eq!(counters.total_published_files, 1);
    assert_eq!(counters.failed_publish, 0);
    assert_eq!(counters.http_attempts, 1);
    assert_eq!(counters.failed_http_attempts, 0);
    assert_eq!(collector.cache.size(), 1);
    assert!(collector.cache.contains(&file.identity()));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_untrusted_server_is_not_retried() {
    let ca = Authority::new("dfc test ca");
    let rogue = Authority::new("rogue ca");
    let dir = TempDir::new().unwrap();
    let paths = write_client_credentials(&ca, dir.path());
    let (pnf, hits) = start_pnf(server_config(&rogue, &ca)).await;

    let router = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&router)
        .await;

    let connections = Arc::new(ConnectionManager::new(8));
    connections.setup_or_update(&paths).unwrap();
    let collector = collector(connections, paths, &router, dir.path());

    let err = collector
        .runner
        .run(Job::new(https_file(pnf, "B.gz"), 1))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::NonRetryable);
    assert!(err.during_collect());

    let counters = collector.counters.snapshot();
    assert_eq!(counters.http_attempts, 1);
    assert_eq!(counters.failed_http_attempts, 1);
    assert_eq!(counters.collected_files, 0);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_setup_replaces_pool_with_new_credentials() {
    let first = Authority::new("first ca");
    let second = Authority::new("second ca");
    let dir = TempDir::new().unwrap();
    let first_dir = dir.path().join("first");
    let second_dir = dir.path().join("second");
    std::fs::create_dir_all(&first_dir).unwrap();
    std::fs::create_dir_all(&second_dir).unwrap();

    let connections = ConnectionManager::new(4);
    connections
        .setup_or_update(&write_client_credentials(&first, &first_dir))
        .unwrap();
    connections
        .setup_or_update(&write_client_credentials(&second, &second_dir))
        .unwrap();
    assert!(connections.instance().is_ok());
}
