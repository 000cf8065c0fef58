/// ValueScout — Mirror Resolver
///
/// Upstream běží na sadě zrcadel se stejným path/query kontraktem.
/// Proběhne probe v pevném prioritním pořadí, první 2xx vyhrává a drží
/// se jako active host dokud proti němu fetch neselže — pak scheduler
/// volá `invalidate()` a příští cyklus probe opakuje.

use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct MirrorResolver {
    client: reqwest::Client,
    hosts: Vec<String>,
    probe_path: String,
    active_host: Mutex<Option<String>>,
}

impl MirrorResolver {
    pub fn new(hosts: Vec<String>, probe_path: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent("Mozilla/5.0")
                .timeout(PROBE_TIMEOUT)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            hosts: hosts
                .into_iter()
                .map(|h| h.trim_end_matches('/').to_string())
                .filter(|h| !h.is_empty())
                .collect(),
            probe_path: probe_path.into(),
            active_host: Mutex::new(None),
        }
    }

    /// Cached active host, jinak probe. None = všechna zrcadla down,
    /// scheduler musí backoffnout bez fetchování.
    pub async fn resolve_active_host(&self) -> Option<String> {
        if let Some(host) = self.active_host.lock().unwrap().clone() {
            return Some(host);
        }

        // jediný host bez probe nemá co zkoušet
        if self.hosts.len() == 1 {
            let host = self.hosts[0].clone();
            *self.active_host.lock().unwrap() = Some(host.clone());
            return Some(host);
        }

        for host in &self.hosts {
            if self.probe(host).await {
                info!("mirror {} is alive, using as active host", host);
                *self.active_host.lock().unwrap() = Some(host.clone());
                return Some(host.clone());
            }
        }

        warn!("no reachable mirror among {} hosts", self.hosts.len());
        None
    }

    /// Po selhaném fetchi proti active hostu — příští resolve probe opakuje.
    pub fn invalidate(&self) {
        let mut active = self.active_host.lock().unwrap();
        if let Some(host) = active.take() {
            debug!("invalidated active host {}", host);
        }
    }

    pub fn active(&self) -> Option<String> {
        self.active_host.lock().unwrap().clone()
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    async fn probe(&self, host: &str) -> bool {
        let url = format!("{}{}", host, self.probe_path);
        match self.client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                debug!("mirror {} probe HTTP {}", host, resp.status());
                false
            }
            Err(e) => {
                debug!("mirror {} probe failed: {}", host, e);
                false
            }
        }
    }
}
