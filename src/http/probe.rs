use crate::bench::{Probe, ProbeOutcome};
use crate::config::{BenchConfig, Timeouts};
use crate::error::{BenchError, BenchResult, ProbeError, ProbeStage};
use crate::http::timing_connector::{ConnectCheckpoint, HandoffCheckpoint};
use crate::http::timing_resolver::TimingResolver;
use crate::timing::{PhaseMeasurement, TraceRecorder};
use crate::tls::build_client_config;
use bytes::Bytes;
use futures::future::BoxFuture;
use http_body_util::{BodyExt, Empty};
use hyper::header::{HeaderValue, ACCEPT, USER_AGENT};
use hyper::{Method, Request, Uri};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use rustls::ClientConfig;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::timeout;

type ProbeConnector = HandoffCheckpoint<HttpsConnector<ConnectCheckpoint<HttpConnector<TimingResolver>>>>;

const USER_AGENT_VALUE: &str = concat!("latbench/", env!("CARGO_PKG_VERSION"));

/// A single instrumented `GET` against the configured url.
///
/// Each probe gets its own connector stack and therefore a fresh
/// connection; only the TLS settings are shared between probes.
#[derive(Clone)]
pub struct HttpProbe {
    uri: Uri,
    tls_config: Arc<ClientConfig>,
    timeouts: Timeouts,
}

impl HttpProbe {
    pub fn new(config: &BenchConfig) -> BenchResult<Self> {
        let tls_config = build_client_config(config.insecure, config.ca_cert.as_deref())
            .map_err(|e| BenchError::InvalidInput(format!("TLS setup failed: {:#}", e)))?;
        Ok(Self {
            uri: config.url.clone(),
            tls_config,
            timeouts: config.timeouts,
        })
    }

    fn client(&self, recorder: &Arc<TraceRecorder>) -> Client<ProbeConnector, Empty<Bytes>> {
        let resolver = TimingResolver::new(Arc::clone(recorder));
        let mut connector = HttpConnector::new_with_resolver(resolver);
        connector.enforce_http(false);
        connector.set_connect_timeout(Some(self.timeouts.connect));
        connector.set_nodelay(true);

        let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(self.tls_config.as_ref().clone())
            .https_or_http()
            .enable_http1()
            .wrap_connector(ConnectCheckpoint::new(connector, Arc::clone(recorder)));
        let connector = HandoffCheckpoint::new(
            https_connector,
            Arc::clone(recorder),
            self.timeouts.handshake,
        );

        Client::builder(TokioExecutor::new())
            .pool_timer(TokioTimer::new())
            .pool_idle_timeout(self.timeouts.pool_idle)
            .build(connector)
    }

    fn build_request(&self) -> Result<Request<Empty<Bytes>>, ProbeError> {
        Request::builder()
            .method(Method::GET)
            .uri(self.uri.clone())
            .header(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE))
            .header(ACCEPT, HeaderValue::from_static("*/*"))
            .body(Empty::new())
            .map_err(|e| ProbeError::new(ProbeStage::Request, e.to_string()))
    }

    /// Runs the exchange and returns the measurement along with the body size.
    async fn fetch(self) -> Result<Fetched, ProbeError> {
        let request = self.build_request()?;
        let recorder = Arc::new(TraceRecorder::new());
        let client = self.client(&recorder);

        let exchange = async {
            let response = client.request(request).await?;
            let status = response.status();
            let body = response.into_body().collect().await?.to_bytes();
            let done = Instant::now();
            Ok::<_, anyhow::Error>((status, body.len(), done))
        };

        match timeout(self.timeouts.request, exchange).await {
            Ok(Ok((status, body_len, done))) => {
                let measurement = recorder.snapshot().measure(done);
                debug!(
                    url = %self.uri,
                    %status,
                    body_len,
                    total = ?measurement.total,
                    "Probe complete"
                );
                Ok(Fetched {
                    measurement,
                    body_len,
                })
            }
            Ok(Err(e)) => Err(ProbeError::new(
                recorder.snapshot().stage_reached(),
                format!("{:#}", e),
            )),
            Err(_) => Err(ProbeError::new(
                recorder.snapshot().stage_reached(),
                format!("request timed out after {:?}", self.timeouts.request),
            )),
        }
    }

    async fn execute(self) -> ProbeOutcome {
        self.fetch().await.map(|fetched| fetched.measurement)
    }
}

struct Fetched {
    measurement: PhaseMeasurement,
    body_len: usize,
}

impl Probe for HttpProbe {
    fn probe(&self) -> BoxFuture<'static, ProbeOutcome> {
        Box::pin(self.clone().execute())
    }
}
