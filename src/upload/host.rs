use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::UploadError;

/// The nine sinks named in "Host set".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostKind {
    Seedbox,
    Drive,
    Mirror,
    OneClick,
    GeneralFile,
    FilePress,
    Abyss,
    TurboVid,
    VidHide,
}

impl HostKind {
    pub const ALL: [HostKind; 9] = [
        HostKind::Seedbox,
        HostKind::Drive,
        HostKind::Mirror,
        HostKind::OneClick,
        HostKind::GeneralFile,
        HostKind::FilePress,
        HostKind::Abyss,
        HostKind::TurboVid,
        HostKind::VidHide,
    ];

    /// Embed hosts require 1080p output regardless of dependency outcome.
    pub fn is_embed_host(self) -> bool {
        matches!(self, HostKind::Abyss | HostKind::TurboVid | HostKind::VidHide)
    }

    /// What this host depends on, if anything.
    pub fn depends_on(self) -> Option<HostKind> {
        match self {
            HostKind::FilePress | HostKind::Abyss => Some(HostKind::Drive),
            HostKind::TurboVid | HostKind::VidHide => Some(HostKind::Seedbox),
            _ => None,
        }
    }
}

/// A local-file upload sink: `upload(path) -> URL | error`.
#[async_trait]
pub trait UploadHost: Send + Sync {
    async fn upload(&self, local_path: &std::path::Path) -> Result<String, UploadError>;
}

/// A remote-ingest sink that mirrors from another host's URL:
/// `remote(source_url, filename) -> URL | error`.
#[async_trait]
pub trait RemoteIngestHost: Send + Sync {
    async fn remote(&self, source_url: &str, filename: &str) -> Result<String, UploadError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependency_graph_matches_spec() {
        assert_eq!(HostKind::FilePress.depends_on(), Some(HostKind::Drive));
        assert_eq!(HostKind::Abyss.depends_on(), Some(HostKind::Drive));
        assert_eq!(HostKind::TurboVid.depends_on(), Some(HostKind::Seedbox));
        assert_eq!(HostKind::VidHide.depends_on(), Some(HostKind::Seedbox));
        assert_eq!(HostKind::Seedbox.depends_on(), None);
        assert_eq!(HostKind::Drive.depends_on(), None);
        assert_eq!(HostKind::Mirror.depends_on(), None);
        assert_eq!(HostKind::OneClick.depends_on(), None);
        assert_eq!(HostKind::GeneralFile.depends_on(), None);
    }

    #[test]
    fn embed_hosts_are_abyss_turbovid_vidhide() {
        for host in HostKind::ALL {
            assert_eq!(
                host.is_embed_host(),
                matches!(host, HostKind::Abyss | HostKind::TurboVid | HostKind::VidHide)
            );
        }
    }
}
