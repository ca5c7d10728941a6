//! Upload Fanout: per-resolution concurrent upload stage with an
//! inter-host dependency DAG. Runs on the engine's dedicated Tokio runtime,
//! detached from the Worker thread that spawned it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::watch;

use crate::config::HostToggles;
use crate::dashboard::{DashboardSnapshot, HostSlot, HostStatus};
use crate::error::UploadError;
use crate::history::{HistoryStore, ResultRecord};
use crate::recipe::Resolution;

use super::host::{HostKind, RemoteIngestHost, UploadHost};

/// Terminal outcome for one host, broadcast to anything awaiting it as a
/// dependency.
#[derive(Debug, Clone)]
pub struct HostOutcome {
    pub status: HostStatus,
    pub url: Option<String>,
}

pub struct HostSet {
    local: HashMap<HostKind, Arc<dyn UploadHost>>,
    remote: HashMap<HostKind, Arc<dyn RemoteIngestHost>>,
}

impl HostSet {
    pub fn new() -> Self {
        Self {
            local: HashMap::new(),
            remote: HashMap::new(),
        }
    }

    pub fn with_local(mut self, kind: HostKind, host: Arc<dyn UploadHost>) -> Self {
        self.local.insert(kind, host);
        self
    }

    pub fn with_remote(mut self, kind: HostKind, host: Arc<dyn RemoteIngestHost>) -> Self {
        self.remote.insert(kind, host);
        self
    }

    /// Looks up a single local-file sink directly, for pipelines that
    /// upload to one named host rather than running the full fanout DAG
    /// (`convert`, ).
    pub fn local(&self, kind: HostKind) -> Option<Arc<dyn UploadHost>> {
        self.local.get(&kind).cloned()
    }
}

impl Default for HostSet {
    fn default() -> Self {
        Self::new()
    }
}

fn is_enabled(toggles: &HostToggles, kind: HostKind) -> bool {
    match kind {
        HostKind::Seedbox => toggles.seedbox,
        HostKind::Drive => toggles.drive,
        HostKind::Mirror => toggles.mirror,
        HostKind::OneClick => toggles.one_click,
        HostKind::GeneralFile => toggles.general_file,
        HostKind::FilePress => toggles.filepress,
        HostKind::Abyss => toggles.abyss,
        HostKind::TurboVid => toggles.turbovid,
        HostKind::VidHide => toggles.vidhide,
    }
}

/// Runs the full nine-host fanout for one finished resolution. Returns once
/// every host has reached a terminal state; the caller
/// spawns this onto the Tokio runtime and does not await it before moving
/// the Worker on to the next resolution.
pub async fn run_fanout(
    hosts: Arc<HostSet>,
    toggles: HostToggles,
    output_path: PathBuf,
    resolution: Resolution,
    display_name: String,
    dashboard: Arc<DashboardSnapshot>,
    history: Arc<HistoryStore>,
    metadata: crate::history::ResultMetadata,
) {
    let mut senders: HashMap<HostKind, watch::Sender<Option<HostOutcome>>> = HashMap::new();
    let mut receivers: HashMap<HostKind, watch::Receiver<Option<HostOutcome>>> = HashMap::new();
    for kind in HostKind::ALL {
        let (tx, rx) = watch::channel(None);
        senders.insert(kind, tx);
        receivers.insert(kind, rx);
    }

    let mut tasks = Vec::new();
    for kind in HostKind::ALL {
        let sender = senders.remove(&kind).unwrap();
        let dependency_rx = kind.depends_on().map(|dep| receivers[&dep].clone());
        let enabled = is_enabled(&toggles, kind);
        let needs_1080p = kind.is_embed_host() && resolution != Resolution::P1080;
        let hosts = hosts.clone();
        let output_path = output_path.clone();
        let dashboard = dashboard.clone();

        dashboard.update_host(resolution, kind, HostSlot {
                status: Some(HostStatus::Pending),
                url: None,
            });

        let task = tokio::spawn(async move {
                let outcome = if !enabled {
                    HostOutcome { status: HostStatus::Skipped, url: None }
                } else if needs_1080p {
                    HostOutcome { status: HostStatus::Skipped, url: None }
                } else if let Some(mut dependency_rx) = dependency_rx {
                    dashboard.update_host(resolution, kind, HostSlot {
                            status: Some(HostStatus::Running),
                            url: None,
                        });
                    let dependency = wait_for_terminal(&mut dependency_rx).await;
                    match dependency {
                        Some(HostOutcome { status: HostStatus::Success, url: Some(url) }) => {
                            run_remote_ingest(&hosts, kind, &url, &output_path).await
                        }
                        _ => HostOutcome {
                            status: HostStatus::Skipped,
                            url: None,
                        },
                    }
                } else {
                    dashboard.update_host(resolution, kind, HostSlot {
                            status: Some(HostStatus::Running),
                            url: None,
                        });
                    run_local_upload(&hosts, kind, &output_path).await
                };

                dashboard.update_host(resolution, kind, HostSlot {
                        status: Some(outcome.status),
                        url: outcome.url.clone(),
                    });
                let _ = sender.send(Some(outcome.clone()));
                (kind, outcome)
            });
        tasks.push(task);
    }

    let mut links = HashMap::new();
    for task in tasks {
        if let Ok((kind, outcome)) = task.await {
            links.insert(format!("{kind:?}"), outcome.url);
        }
    }

    history.append(ResultRecord {
            filename: display_name,
            resolution,
            timestamp: chrono::Utc::now(),
            links,
            metadata,
        });

    let _ = std::fs::remove_file(&output_path);
}

async fn wait_for_terminal(rx: &mut watch::Receiver<Option<HostOutcome>>) -> Option<HostOutcome> {
    loop {
        if let Some(outcome) = rx.borrow().clone() {
            return Some(outcome);
        }
        if rx.changed().await.is_err() {
            return None;
        }
    }
}

async fn run_local_upload(hosts: &HostSet, kind: HostKind, path: &Path) -> HostOutcome {
    let Some(host) = hosts.local.get(&kind) else {
        return HostOutcome { status: HostStatus::Skipped, url: None };
    };
    match host.upload(path).await {
        Ok(url) => HostOutcome { status: HostStatus::Success, url: Some(url) },
        Err(_err) => HostOutcome { status: HostStatus::Failed, url: None },
    }
}

async fn run_remote_ingest(hosts: &HostSet, kind: HostKind, source_url: &str, path: &Path) -> HostOutcome {
    let Some(host) = hosts.remote.get(&kind) else {
        return HostOutcome { status: HostStatus::Skipped, url: None };
    };
    let filename = path
    .file_name()
    .and_then(|n| n.to_str())
    .unwrap_or("output.mp4");
    match host.remote(source_url, filename).await {
        Ok(url) => HostOutcome { status: HostStatus::Success, url: Some(url) },
        Err(err) => {
            if matches!(err, UploadError::Failed(_, _)) {
                HostOutcome { status: HostStatus::Failed, url: None }
            } else {
                HostOutcome { status: HostStatus::Skipped, url: None }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::history::ResultMetadata;

    struct AlwaysSucceeds;
    #[async_trait]
    impl UploadHost for AlwaysSucceeds {
        async fn upload(&self, _path: &Path) -> Result<String, UploadError> {
            Ok("https://seedbox.example/file".to_string())
        }
    }

    struct AlwaysFails;
    #[async_trait]
    impl UploadHost for AlwaysFails {
        async fn upload(&self, _path: &Path) -> Result<String, UploadError> {
            Err(UploadError::Failed("Drive".into(), "boom".into()))
        }
    }

    struct EchoRemote(AtomicUsize);
    #[async_trait]
    impl RemoteIngestHost for EchoRemote {
        async fn remote(&self, source_url: &str, _filename: &str) -> Result<String, UploadError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(format!("{source_url}/mirrored"))
        }
    }

    fn metadata() -> ResultMetadata {
        ResultMetadata {
            duration_seconds: 1.0,
            input_size_bytes: 1,
            output_size_bytes: 1,
            encode_time_seconds: 1.0,
        }
    }

    #[tokio::test]
    async fn fanout_resolves_dependencies_and_skips_disabled_hosts() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("Video.1080p.mp4");
        std::fs::write(&output, b"data").unwrap();

        let hosts = Arc::new(
            HostSet::new()
            .with_local(HostKind::Seedbox, Arc::new(AlwaysSucceeds))
            .with_local(HostKind::Drive, Arc::new(AlwaysSucceeds))
            .with_remote(HostKind::TurboVid, Arc::new(EchoRemote(AtomicUsize::new(0)))),
        );
        let mut toggles = HostToggles {
            seedbox: true,
            drive: true,
            mirror: false,
            one_click: false,
            general_file: false,
            filepress: false,
            abyss: false,
            turbovid: true,
            vidhide: false,
        };
        toggles.mirror = false;

        let dashboard = Arc::new(DashboardSnapshot::new());
        let history = Arc::new(HistoryStore::load(dir.path().join("history.json")).unwrap());

        run_fanout(
            hosts,
            toggles,
            output.clone(),
            Resolution::P1080,
            "Video".to_string(),
            dashboard,
            history.clone(),
            metadata(),
        )
        .await;

        assert!(!output.exists());
        let records = history.list();
        assert_eq!(records.len(), 1);
        let links = &records[0].links;
        assert_eq!(links.get("Seedbox").unwrap().as_deref(), Some("https://seedbox.example/file"));
        assert_eq!(
            links.get("TurboVid").unwrap().as_deref(),
            Some("https://seedbox.example/file/mirrored")
        );
        assert_eq!(links.get("Mirror"), None);
    }

    #[tokio::test]
    async fn dependency_failure_skips_dependents() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("Video.1080p.mp4");
        std::fs::write(&output, b"data").unwrap();

        let hosts = Arc::new(
            HostSet::new()
            .with_local(HostKind::Drive, Arc::new(AlwaysFails))
            .with_remote(HostKind::FilePress, Arc::new(EchoRemote(AtomicUsize::new(0))))
            .with_remote(HostKind::Abyss, Arc::new(EchoRemote(AtomicUsize::new(0)))),
        );
        let toggles = HostToggles {
            seedbox: false,
            drive: true,
            mirror: false,
            one_click: false,
            general_file: false,
            filepress: true,
            abyss: true,
            turbovid: false,
            vidhide: false,
        };

        let dashboard = Arc::new(DashboardSnapshot::new());
        let history = Arc::new(HistoryStore::load(dir.path().join("history.json")).unwrap());

        run_fanout(
            hosts,
            toggles,
            output,
            Resolution::P1080,
            "Video".to_string(),
            dashboard,
            history.clone(),
            metadata(),
        )
        .await;

        let records = history.list();
        assert_eq!(records[0].links.get("FilePress").unwrap(), &None);
        assert_eq!(records[0].links.get("Abyss").unwrap(), &None);
    }

    #[tokio::test]
    async fn embed_hosts_skip_below_1080p_without_network_call() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("Video.720p.mp4");
        std::fs::write(&output, b"data").unwrap();

        let call_count = Arc::new(AtomicUsize::new(0));
        struct CountingRemote(Arc<AtomicUsize>);
        #[async_trait]
        impl RemoteIngestHost for CountingRemote {
            async fn remote(&self, _source_url: &str, _filename: &str) -> Result<String, UploadError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok("unused".into())
            }
        }

        let hosts = Arc::new(
            HostSet::new()
            .with_local(HostKind::Seedbox, Arc::new(AlwaysSucceeds))
            .with_remote(HostKind::TurboVid, Arc::new(CountingRemote(call_count.clone()))),
        );
        let toggles = HostToggles {
            seedbox: true,
            drive: false,
            mirror: false,
            one_click: false,
            general_file: false,
            filepress: false,
            abyss: false,
            turbovid: true,
            vidhide: false,
        };

        let dashboard = Arc::new(DashboardSnapshot::new());
        let history = Arc::new(HistoryStore::load(dir.path().join("history.json")).unwrap());

        run_fanout(
            hosts,
            toggles,
            output,
            Resolution::P720,
            "Video".to_string(),
            dashboard,
            history,
            metadata(),
        )
        .await;

        assert_eq!(call_count.load(Ordering::SeqCst), 0);
    }
}
