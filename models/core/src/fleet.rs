//! Fleet descriptor entries.
use serde::Deserialize;
use serde::Serialize;

/// One monitored target from the fleet descriptor.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct FleetEntry {
    /// Hostname or IP of the cluster admin endpoint.
    pub host: String,

    /// Reference to the secret holding the cluster credentials.
    pub secret_ref: String,

    /// Per-target option overrides, in descriptor order.
    pub overrides: Vec<(String, String)>,
}

impl FleetEntry {
    pub fn new<H, S>(host: H, secret_ref: S) -> FleetEntry
    where
        H: Into<String>,
        S: Into<String>,
    {
        FleetEntry {
            host: host.into(),
            secret_ref: secret_ref.into(),
            overrides: Vec::new(),
        }
    }

    /// Cluster identifier used for audit-log stream names.
    ///
    /// Managed clusters expose their management endpoint under a DNS name
    /// whose second label is the filesystem id; bare hostnames are used
    /// unchanged.
    pub fn cluster_id(&self) -> &str {
        let dns_like = self.host.chars().any(|c| c.is_ascii_alphabetic());
        if dns_like {
            let mut labels = self.host.split('.');
            labels.next();
            if let Some(label) = labels.next() {
                if !label.is_empty() {
                    return label;
                }
            }
        }
        &self.host
    }
}
