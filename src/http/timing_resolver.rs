use crate::timing::TraceRecorder;
use hyper_util::client::legacy::connect::dns::Name;
use std::future::Future;
use std::net::SocketAddr;
use std::net::ToSocketAddrs;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as OtherContext, Poll};
use std::vec;
use tower_service::Service;

/// System resolver that marks the DNS checkpoints of one probe.
///
/// hyper-util skips the resolver for literal IP hosts, in which case neither
/// checkpoint is marked. A failed lookup leaves `dns_done` unmarked.
#[derive(Clone, Debug)]
pub struct TimingResolver {
    recorder: Arc<TraceRecorder>,
}

impl TimingResolver {
    pub fn new(recorder: Arc<TraceRecorder>) -> Self {
        Self { recorder }
    }
}

impl Service<Name> for TimingResolver {
    type Response = vec::IntoIter<SocketAddr>;
    type Error = anyhow::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;
    fn poll_ready(&mut self, _cx: &mut OtherContext<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }
    fn call(&mut self, name: Name) -> Self::Future {
        let recorder = Arc::clone(&self.recorder);
        Box::pin(async move {
            let host = name.as_str().to_string();
            let host_for_log = host.clone();

            recorder.mark_dns_start();
            let resolved = tokio::task::spawn_blocking(move || (host, 0).to_socket_addrs()).await?;

            let addresses: Vec<_> = resolved
                .map_err(|e| anyhow!("DNS lookup for {} failed: {}", host_for_log, e))?
                .collect();
            if addresses.is_empty() {
                return Err(anyhow!("No IP addresses found for host {}", host_for_log));
            }
            recorder.mark_dns_done();
            debug!(host = %host_for_log, addrs = ?addresses, "Resolved");

            Ok(addresses.into_iter())
        })
    }
}
