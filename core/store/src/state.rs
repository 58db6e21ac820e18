//! Typed access to the per-cluster state objects.
use anyhow::Result;

use mos_context::Context;
use mos_models::EventRecord;
use mos_models::MatchConditions;
use mos_models::SystemStatus;
use mos_models::TransferWatch;

use super::Blobs;

/// Service domains with a persisted event history.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Domain {
    Ems,
    Snapmirror,
    Storage,
    Quota,
    Vserver,
}

/// Resolved blob keys for one cluster's state objects.
///
/// The keys come from the `*Filename` invocation options, defaulted to
/// `<host>-<stem>` by the configuration layer.
#[derive(Clone, Debug)]
pub struct StateKeys {
    pub system_status: String,
    pub ems_events: String,
    pub sm_events: String,
    pub sm_relationships: String,
    pub storage_events: String,
    pub quota_events: String,
    pub vserver_events: String,
    pub conditions: String,
}

/// Per-cluster, per-domain persisted state with missing-key-as-empty
/// semantics.
#[derive(Clone)]
pub struct StateStore {
    blobs: Blobs,
    keys: StateKeys,
}

impl StateStore {
    pub fn new(blobs: Blobs, keys: StateKeys) -> StateStore {
        StateStore { blobs, keys }
    }

    fn events_key(&self, domain: Domain) -> &str {
        match domain {
            Domain::Ems => &self.keys.ems_events,
            Domain::Snapmirror => &self.keys.sm_events,
            Domain::Storage => &self.keys.storage_events,
            Domain::Quota => &self.keys.quota_events,
            Domain::Vserver => &self.keys.vserver_events,
        }
    }

    /// Load a domain's event history, empty when never persisted.
    pub async fn events(&self, context: &Context, domain: Domain) -> Result<Vec<EventRecord>> {
        let events = self.blobs.get_json(context, self.events_key(domain)).await?;
        Ok(events.unwrap_or_default())
    }

    /// Overwrite a domain's event history.
    pub async fn save_events(
        &self,
        context: &Context,
        domain: Domain,
        events: &[EventRecord],
    ) -> Result<()> {
        self.blobs
            .put_json(context, self.events_key(domain), &events)
            .await
    }

    /// Load the cluster system status, if one was ever persisted.
    pub async fn system_status(&self, context: &Context) -> Result<Option<SystemStatus>> {
        self.blobs.get_json(context, &self.keys.system_status).await
    }

    pub async fn save_system_status(
        &self,
        context: &Context,
        status: &SystemStatus,
    ) -> Result<()> {
        self.blobs
            .put_json(context, &self.keys.system_status, status)
            .await
    }

    /// Load the replication transfer watchlist, empty when never persisted.
    pub async fn watchlist(&self, context: &Context) -> Result<Vec<TransferWatch>> {
        let watchlist = self
            .blobs
            .get_json(context, &self.keys.sm_relationships)
            .await?;
        Ok(watchlist.unwrap_or_default())
    }

    pub async fn save_watchlist(
        &self,
        context: &Context,
        watchlist: &[TransferWatch],
    ) -> Result<()> {
        self.blobs
            .put_json(context, &self.keys.sm_relationships, &watchlist)
            .await
    }

    /// Load the match-conditions document, [`None`] when never persisted.
    ///
    /// A document that exists but fails to decode is an error: the run must
    /// abort rather than overwrite an operator-edited file.
    pub async fn conditions(&self, context: &Context) -> Result<Option<MatchConditions>> {
        self.blobs.get_json(context, &self.keys.conditions).await
    }

    pub async fn save_conditions(
        &self,
        context: &Context,
        conditions: &MatchConditions,
    ) -> Result<()> {
        self.blobs
            .put_json_pretty(context, &self.keys.conditions, conditions)
            .await
    }
}

#[cfg(any(test, feature = "test-fixture"))]
impl StateKeys {
    /// State keys for unit tests, following the production defaults.
    pub fn fixture(host: &str) -> StateKeys {
        StateKeys {
            system_status: format!("{}-systemStatus", host),
            ems_events: format!("{}-emsEvents", host),
            sm_events: format!("{}-smEvents", host),
            sm_relationships: format!("{}-smRelationships", host),
            storage_events: format!("{}-storageEvents", host),
            quota_events: format!("{}-quotaEvents", host),
            vserver_events: format!("{}-vserverEvents", host),
            conditions: format!("{}-conditions", host),
        }
    }
}

#[cfg(test)]
mod tests {
    use mos_context::Context;
    use mos_models::EventRecord;

    use super::Blobs;
    use super::Domain;
    use super::StateKeys;
    use super::StateStore;

    #[tokio::test]
    async fn events_default_to_empty() {
        let context = Context::fixture();
        let (blobs, _) = Blobs::fixture();
        let state = StateStore::new(blobs, StateKeys::fixture("fsx"));
        let events = state.events(&context, Domain::Ems).await.unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn events_round_trip_per_domain() {
        let context = Context::fixture();
        let (blobs, _) = Blobs::fixture();
        let state = StateStore::new(blobs, StateKeys::fixture("fsx"));
        let events = vec![EventRecord::new("42")];
        state
            .save_events(&context, Domain::Storage, &events)
            .await
            .unwrap();
        let found = state.events(&context, Domain::Storage).await.unwrap();
        assert_eq!(found, events);
        let other = state.events(&context, Domain::Quota).await.unwrap();
        assert!(other.is_empty());
    }
}
