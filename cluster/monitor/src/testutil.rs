//! Shared fixtures for evaluator unit tests.
use mos_client_ontap::mock::MockTransport;
use mos_client_ontap::Api;
use mos_conf::MonitorConf;
use mos_conf::MonitorOptions;
use mos_conf::Payload;
use mos_models::EventRecord;
use mos_models::ServiceBlock;
use mos_models::SystemStatus;
use mos_store::Blobs;
use mos_store::BlobsFixture;
use mos_store::Domain;
use mos_store::StateKeys;
use mos_store::StateStore;
use mos_stream_alerts::AlertSinks;
use mos_stream_alerts::PubSub;
use mos_stream_alerts::PubSubFixture;

use crate::ClusterProbe;
use crate::ClusterRun;

/// Everything a domain evaluator needs, over in-memory backends.
pub struct Harness {
    pub api: Api,
    pub transport: MockTransport,
    pub state: StateStore,
    pub blobs: BlobsFixture,
    pub alerts: AlertSinks,
    pub published: PubSubFixture,
    pub cluster: ClusterProbe,
    pub conf: MonitorConf,
}

impl Harness {
    pub fn new() -> Harness {
        let (api, transport) = Api::mock();
        let (blobs_handle, blobs) = Blobs::fixture();
        let state = StateStore::new(blobs_handle, StateKeys::fixture("fsx.example"));
        let (pubsub, published) = PubSub::fixture();
        let alerts = AlertSinks::new(pubsub);
        let cluster = ClusterProbe {
            name: "fsx-test".to_string(),
            version: "9.13.1P6".to_string(),
            timezone: None,
        };
        let mut payload = Payload::new();
        payload.insert("OntapAdminServer".to_string(), "fsx.example".to_string());
        payload.insert("s3BucketName".to_string(), "state-bucket".to_string());
        payload.insert("s3BucketRegion".to_string(), "us-west-2".to_string());
        payload.insert("snsTopicArn".to_string(), "arn:sns:alerts".to_string());
        payload.insert("secretArn".to_string(), "arn:secret:fsx".to_string());
        let conf = MonitorOptions::gather(&payload)
            .expect("harness payload must gather")
            .finish()
            .expect("harness payload must resolve");
        Harness {
            api,
            transport,
            state,
            blobs,
            alerts,
            published,
            cluster,
            conf,
        }
    }

    /// A [`ClusterRun`] borrowing this harness.
    pub fn run(&self) -> ClusterRun<'_> {
        ClusterRun {
            api: &self.api,
            state: &self.state,
            alerts: &self.alerts,
            cluster: &self.cluster,
        }
    }

    /// Seed a persisted system status.
    pub fn seed_system_status(&self, status: &SystemStatus) {
        let body = serde_json::to_vec(status).expect("system status must encode");
        self.blobs.insert("fsx.example-systemStatus", body);
    }

    /// Seed a persisted event history for a domain.
    pub fn seed_events(&self, domain: Domain, events: &[EventRecord]) {
        let key = match domain {
            Domain::Ems => "fsx.example-emsEvents",
            Domain::Snapmirror => "fsx.example-smEvents",
            Domain::Storage => "fsx.example-storageEvents",
            Domain::Quota => "fsx.example-quotaEvents",
            Domain::Vserver => "fsx.example-vserverEvents",
        };
        let body = serde_json::to_vec(events).expect("events must encode");
        self.blobs.insert(key, body);
    }
}

/// Build a service block from literal rule JSON.
pub fn service(name: &str, rules: serde_json::Value) -> ServiceBlock {
    ServiceBlock {
        name: name.to_string(),
        rules: serde_json::from_value(rules).expect("rules must decode"),
    }
}
