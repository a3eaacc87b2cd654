//! Create-or-reuse reconciliation of named remote entities.
//!
//! A destination that must bind tags, custom fields or event definitions to
//! a primary entity exposes each remote collection through the traits below.
//! The [`Reconciler`] drives one pass over a collection:
//!
//! 1. **Fetch**: list the collection. Failure aborts the invocation.
//! 2. **Diff**: split the desired names into existing and missing.
//! 3. **Create**: create every missing entity concurrently.
//! 4. **Link**: bind every existing or created entity to the primary entity,
//!    concurrently.
//!
//! A failed create or link drops that one item and is recorded as a
//! [`RemotePartialWriteError`]. It never fails the pass.
//!
//! The entity cache lives for one pass only. Nothing is shared between
//! invocations.

use crate::errors::{RemotePartialWriteError, Result, TransformError, WriteStep};
use crate::metrics_defs::{RECONCILE_CREATED, RECONCILE_LINKED, RECONCILE_PARTIAL_FAILURE};
use async_trait::async_trait;
use serde_json::Value;
use shared::counter;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::task::JoinSet;

pub type RemoteId = String;

/// An entity the message wants to exist remotely, plus the value to bind
/// when linking (a custom field value, for instance).
#[derive(Clone, Debug, PartialEq)]
pub struct DesiredEntity {
    pub name: String,
    pub value: Option<Value>,
}

impl DesiredEntity {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }

    pub fn with_value(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value: Some(value),
        }
    }
}

/// Natural key to remote id, populated by a list call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RemoteEntityCache {
    ids: HashMap<String, RemoteId>,
}

impl RemoteEntityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, id: impl Into<RemoteId>) {
        self.ids.insert(name.into(), id.into());
    }

    pub fn get(&self, name: &str) -> Option<&RemoteId> {
        self.ids.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ids.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl<K: Into<String>, V: Into<RemoteId>> FromIterator<(K, V)> for RemoteEntityCache {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut cache = RemoteEntityCache::new();
        for (name, id) in iter {
            cache.insert(name, id);
        }
        cache
    }
}

#[async_trait]
pub trait RemoteCollection: Send + Sync + 'static {
    /// Entity kind used in logs and errors, e.g. `tag`.
    fn kind(&self) -> &'static str;

    async fn list(&self) -> Result<RemoteEntityCache>;
}

#[async_trait]
pub trait CreatableCollection: RemoteCollection {
    async fn create(&self, entity: &DesiredEntity) -> Result<RemoteId>;
}

#[async_trait]
pub trait LinkableCollection: RemoteCollection {
    async fn link(&self, primary_id: &str, remote_id: &str, entity: &DesiredEntity) -> Result<()>;
}

/// What one reconciliation pass did, by entity name.
#[derive(Debug, Default)]
pub struct ReconcileOutcome {
    pub existing: Vec<String>,
    pub created: Vec<String>,
    pub linked: Vec<String>,
    /// Desired names the collection does not know and that are never created
    pub skipped: Vec<String>,
    pub failures: Vec<RemotePartialWriteError>,
}

/// Items spawned into a batch, tracked by task id so a panicked task can
/// still be attributed to its item.
struct SpawnedBatch<T> {
    join_set: JoinSet<(DesiredEntity, Result<T>)>,
    task_items: HashMap<tokio::task::Id, String>,
}

pub struct Reconciler<C> {
    collection: Arc<C>,
}

impl<C: RemoteCollection> Reconciler<C> {
    pub fn new(collection: C) -> Self {
        Self {
            collection: Arc::new(collection),
        }
    }

    async fn fetch(&self) -> Result<RemoteEntityCache> {
        let kind = self.collection.kind();
        self.collection.list().await.inspect_err(|e| {
            tracing::error!(kind, error = %e, "failed to fetch remote entities");
        })
    }

    /// Links each item to `primary_id`, concurrently, waiting for all.
    async fn link_all(
        &self,
        primary_id: &str,
        items: Vec<(DesiredEntity, RemoteId)>,
        outcome: &mut ReconcileOutcome,
    ) where
        C: LinkableCollection,
    {
        let mut batch = SpawnedBatch {
            join_set: JoinSet::new(),
            task_items: HashMap::new(),
        };

        for (entity, remote_id) in items {
            let collection = self.collection.clone();
            let primary_id = primary_id.to_string();
            let name = entity.name.clone();
            let handle = batch.join_set.spawn(async move {
                let result = collection.link(&primary_id, &remote_id, &entity).await;
                (entity, result)
            });
            batch.task_items.insert(handle.id(), name);
        }

        self.collect(batch, WriteStep::Link, outcome, |entity, (), outcome| {
            counter!(RECONCILE_LINKED, "kind" => self.collection.kind()).increment(1);
            outcome.linked.push(entity.name);
        })
        .await;
    }

    async fn collect<T: Send + 'static>(
        &self,
        batch: SpawnedBatch<T>,
        step: WriteStep,
        outcome: &mut ReconcileOutcome,
        mut on_success: impl FnMut(DesiredEntity, T, &mut ReconcileOutcome),
    ) {
        let SpawnedBatch {
            mut join_set,
            mut task_items,
        } = batch;
        let kind = self.collection.kind();

        while let Some(joined) = join_set.join_next_with_id().await {
            let (item, reason) = match joined {
                Ok((id, (entity, result))) => {
                    task_items.remove(&id);
                    match result {
                        Ok(value) => {
                            on_success(entity, value, outcome);
                            continue;
                        }
                        Err(e) => (entity.name, e.to_string()),
                    }
                }
                Err(e) => {
                    let item = task_items.remove(&e.id()).unwrap_or_default();
                    (item, e.to_string())
                }
            };

            let failure = RemotePartialWriteError {
                kind,
                step,
                item,
                reason,
            };
            tracing::error!(
                kind,
                step = step.as_str(),
                item = %failure.item,
                error = %failure,
                "dropping item from reconciliation"
            );
            counter!(RECONCILE_PARTIAL_FAILURE, "kind" => kind, "step" => step.as_str())
                .increment(1);
            outcome.failures.push(failure);
        }
    }
}

impl<C: CreatableCollection + LinkableCollection> Reconciler<C> {
    /// Full fetch, diff, create, link pass for `desired`.
    ///
    /// Duplicate names are reconciled once. Only a failed fetch is an error.
    pub async fn reconcile(
        &self,
        primary_id: &str,
        desired: Vec<DesiredEntity>,
    ) -> Result<ReconcileOutcome> {
        let mut outcome = ReconcileOutcome::default();
        let desired = dedupe(desired);
        if desired.is_empty() {
            return Ok(outcome);
        }

        let cache = self.fetch().await?;

        let mut to_link = Vec::new();
        let mut to_create = Vec::new();
        for entity in desired {
            match cache.get(&entity.name) {
                Some(id) => {
                    outcome.existing.push(entity.name.clone());
                    to_link.push((entity, id.clone()));
                }
                None => to_create.push(entity),
            }
        }

        tracing::debug!(
            kind = self.collection.kind(),
            existing = to_link.len(),
            missing = to_create.len(),
            "diffed remote entities"
        );

        let mut batch = SpawnedBatch {
            join_set: JoinSet::new(),
            task_items: HashMap::new(),
        };
        for entity in to_create {
            let collection = self.collection.clone();
            let name = entity.name.clone();
            let handle = batch.join_set.spawn(async move {
                let result = collection.create(&entity).await;
                (entity, result)
            });
            batch.task_items.insert(handle.id(), name);
        }

        let mut created = Vec::new();
        self.collect(batch, WriteStep::Create, &mut outcome, |entity, id, outcome| {
            counter!(RECONCILE_CREATED, "kind" => self.collection.kind()).increment(1);
            outcome.created.push(entity.name.clone());
            created.push((entity, id));
        })
        .await;
        to_link.extend(created);

        self.link_all(primary_id, to_link, &mut outcome).await;
        Ok(outcome)
    }
}

impl<C: LinkableCollection> Reconciler<C> {
    /// Fetch, diff and link for collections the message may only reference.
    ///
    /// Names the collection does not know are logged and skipped.
    pub async fn link_existing(
        &self,
        primary_id: &str,
        desired: Vec<DesiredEntity>,
    ) -> Result<ReconcileOutcome> {
        let mut outcome = ReconcileOutcome::default();
        let desired = dedupe(desired);
        if desired.is_empty() {
            return Ok(outcome);
        }

        let cache = self.fetch().await?;
        let kind = self.collection.kind();

        let mut to_link = Vec::new();
        for entity in desired {
            match cache.get(&entity.name) {
                Some(id) => {
                    outcome.existing.push(entity.name.clone());
                    to_link.push((entity, id.clone()));
                }
                None => {
                    tracing::error!(kind, item = %entity.name, "entity does not exist in destination, skipping");
                    outcome.skipped.push(entity.name);
                }
            }
        }

        self.link_all(primary_id, to_link, &mut outcome).await;
        Ok(outcome)
    }
}

impl<C: CreatableCollection> Reconciler<C> {
    /// Makes sure a single named entity exists, creating it if needed.
    ///
    /// Sequential: the caller depends on the entity, so a failed create is a
    /// [`TransformError::RemoteWrite`].
    pub async fn ensure_exists(&self, entity: DesiredEntity) -> Result<RemoteId> {
        let cache = self.fetch().await?;
        if let Some(id) = cache.get(&entity.name) {
            return Ok(id.clone());
        }

        let kind = self.collection.kind();
        let id = self.collection.create(&entity).await.map_err(|e| {
            tracing::error!(kind, item = %entity.name, error = %e, "failed to create remote entity");
            TransformError::write(format!("{kind} `{}`", entity.name), e)
        })?;
        counter!(RECONCILE_CREATED, "kind" => kind).increment(1);
        Ok(id)
    }
}

fn dedupe(desired: Vec<DesiredEntity>) -> Vec<DesiredEntity> {
    let mut seen = HashSet::new();
    desired
        .into_iter()
        .filter(|entity| seen.insert(entity.name.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    /// In-memory collection with scripted failures.
    #[derive(Default)]
    struct FakeTags {
        remote: RemoteEntityCache,
        fail_list: bool,
        fail_create: HashSet<String>,
        fail_link: HashSet<String>,
        creates: Mutex<Vec<String>>,
        links: Mutex<Vec<(String, String, Option<Value>)>>,
    }

    #[async_trait]
    impl RemoteCollection for FakeTags {
        fn kind(&self) -> &'static str {
            "tag"
        }

        async fn list(&self) -> Result<RemoteEntityCache> {
            if self.fail_list {
                return Err(TransformError::fetch("tags", "connection reset"));
            }
            Ok(self.remote.clone())
        }
    }

    #[async_trait]
    impl CreatableCollection for FakeTags {
        async fn create(&self, entity: &DesiredEntity) -> Result<RemoteId> {
            self.creates.lock().unwrap().push(entity.name.clone());
            if self.fail_create.contains(&entity.name) {
                return Err(TransformError::write("tag", "500 Internal Server Error"));
            }
            Ok(format!("new-{}", entity.name))
        }
    }

    #[async_trait]
    impl LinkableCollection for FakeTags {
        async fn link(&self, primary_id: &str, remote_id: &str, entity: &DesiredEntity) -> Result<()> {
            if self.fail_link.contains(&entity.name) {
                return Err(TransformError::write("contactTag", "422 Unprocessable Entity"));
            }
            self.links.lock().unwrap().push((
                primary_id.to_string(),
                remote_id.to_string(),
                entity.value.clone(),
            ));
            Ok(())
        }
    }

    fn names(names: &[&str]) -> Vec<DesiredEntity> {
        names.iter().map(|n| DesiredEntity::named(*n)).collect()
    }

    fn sorted(mut items: Vec<String>) -> Vec<String> {
        items.sort();
        items
    }

    #[tokio::test]
    async fn test_existing_entities_are_reused() {
        let collection = FakeTags {
            remote: RemoteEntityCache::from_iter([("vip", "1")]),
            ..Default::default()
        };
        let reconciler = Reconciler::new(collection);

        let outcome = reconciler
            .reconcile("contact-9", names(&["vip", "new_tag"]))
            .await
            .unwrap();

        let collection = &reconciler.collection;
        assert_eq!(*collection.creates.lock().unwrap(), vec!["new_tag".to_string()]);

        let mut links = collection.links.lock().unwrap().clone();
        links.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));
        assert_eq!(
            links,
            vec![
                ("contact-9".to_string(), "1".to_string(), None),
                ("contact-9".to_string(), "new-new_tag".to_string(), None),
            ]
        );
        assert_eq!(outcome.existing, vec!["vip".to_string()]);
        assert_eq!(outcome.created, vec!["new_tag".to_string()]);
        assert!(outcome.failures.is_empty());
    }

    #[tokio::test]
    async fn test_failed_create_drops_only_that_item() {
        let collection = FakeTags {
            fail_create: HashSet::from(["b".to_string()]),
            ..Default::default()
        };
        let reconciler = Reconciler::new(collection);

        let outcome = reconciler
            .reconcile("contact-1", names(&["a", "b", "c"]))
            .await
            .unwrap();

        assert_eq!(sorted(outcome.created), vec!["a", "c"]);
        assert_eq!(sorted(outcome.linked), vec!["a", "c"]);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(
            outcome.failures[0],
            RemotePartialWriteError {
                kind: "tag",
                step: WriteStep::Create,
                item: "b".to_string(),
                reason: "Failed to write tag: 500 Internal Server Error".to_string(),
            }
        );
        assert_eq!(
            outcome.failures[0].to_string(),
            "Failed to create tag `b`: Failed to write tag: 500 Internal Server Error"
        );
    }

    #[tokio::test]
    async fn test_failed_link_is_recorded() {
        let collection = FakeTags {
            remote: RemoteEntityCache::from_iter([("a", "1"), ("b", "2")]),
            fail_link: HashSet::from(["a".to_string()]),
            ..Default::default()
        };
        let reconciler = Reconciler::new(collection);

        let outcome = reconciler.reconcile("contact-1", names(&["a", "b"])).await.unwrap();
        assert_eq!(outcome.linked, vec!["b".to_string()]);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].step, WriteStep::Link);
        assert_eq!(outcome.failures[0].item, "a");
    }

    #[tokio::test]
    async fn test_fetch_failure_is_fatal() {
        let collection = FakeTags {
            fail_list: true,
            ..Default::default()
        };
        let reconciler = Reconciler::new(collection);

        let result = reconciler.reconcile("contact-1", names(&["a"])).await;
        assert!(matches!(result, Err(TransformError::RemoteFetch { .. })));
        assert!(reconciler.collection.creates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicates_and_empty_input() {
        let reconciler = Reconciler::new(FakeTags::default());

        let outcome = reconciler.reconcile("contact-1", vec![]).await.unwrap();
        assert!(outcome.created.is_empty());

        let outcome = reconciler
            .reconcile("contact-1", names(&["a", "a", "a"]))
            .await
            .unwrap();
        assert_eq!(outcome.created, vec!["a".to_string()]);
        assert_eq!(reconciler.collection.creates.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_link_existing_skips_unknown_names() {
        let collection = FakeTags {
            remote: RemoteEntityCache::from_iter([("plan", "7")]),
            ..Default::default()
        };
        let reconciler = Reconciler::new(collection);

        let outcome = reconciler
            .link_existing(
                "contact-1",
                vec![
                    DesiredEntity::with_value("plan", json!("pro")),
                    DesiredEntity::with_value("unknown", json!("x")),
                ],
            )
            .await
            .unwrap();

        assert_eq!(outcome.linked, vec!["plan".to_string()]);
        assert_eq!(outcome.skipped, vec!["unknown".to_string()]);
        assert!(reconciler.collection.creates.lock().unwrap().is_empty());
        assert_eq!(
            *reconciler.collection.links.lock().unwrap(),
            vec![("contact-1".to_string(), "7".to_string(), Some(json!("pro")))]
        );
    }

    #[tokio::test]
    async fn test_ensure_exists() {
        let collection = FakeTags {
            remote: RemoteEntityCache::from_iter([("Signed Up", "3")]),
            fail_create: HashSet::from(["Broken".to_string()]),
            ..Default::default()
        };
        let reconciler = Reconciler::new(collection);

        assert_eq!(
            reconciler.ensure_exists(DesiredEntity::named("Signed Up")).await.unwrap(),
            "3"
        );
        assert_eq!(
            reconciler.ensure_exists(DesiredEntity::named("Logged In")).await.unwrap(),
            "new-Logged In"
        );
        assert!(matches!(
            reconciler.ensure_exists(DesiredEntity::named("Broken")).await,
            Err(TransformError::RemoteWrite { .. })
        ));
    }
}
