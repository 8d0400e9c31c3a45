//! Extensions and listeners that record the events they receive.
//!
//! Every entry has the form `key.event` or `key.event(detail)`, where the
//! detail names the object ids, class or property involved. Objects are
//! written as `Class/key`, for example `Customer/1`.

use domobj_codec::{ClassId, ObjectId, Value};
use domobj_core::{
    ClientTransaction, ClientTransactionExtension, ClientTransactionListener,
    CommittingEventRegistrar, CoreError, CoreResult, DomainObject, PersistableData, QueryResult,
    RelatedObjects, ValueAccess,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// A shared, ordered log of recorded events.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn push(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    /// Returns a copy of all entries.
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// Returns the entries that start with `prefix`.
    pub fn entries_starting_with(&self, prefix: &str) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Returns whether an entry equals `entry`.
    pub fn contains(&self, entry: &str) -> bool {
        self.entries.lock().iter().any(|e| e == entry)
    }

    /// Returns how many entries equal `entry`.
    pub fn count(&self, entry: &str) -> usize {
        self.entries.lock().iter().filter(|e| *e == entry).count()
    }

    /// Removes all entries.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

/// Formats an id as `Class/key`.
pub fn short_id(id: &ObjectId) -> String {
    format!("{}/{}", id.class_id(), id.value())
}

fn ids(ids: &[ObjectId]) -> String {
    ids.iter().map(short_id).collect::<Vec<_>>().join(",")
}

fn objects(objects: &[DomainObject]) -> String {
    objects
        .iter()
        .map(|o| short_id(o.id()))
        .collect::<Vec<_>>()
        .join(",")
}

fn optional(object: Option<&DomainObject>) -> String {
    object.map_or_else(|| "null".to_owned(), |o| short_id(o.id()))
}

fn access(access: ValueAccess) -> &'static str {
    match access {
        ValueAccess::Current => "current",
        ValueAccess::Original => "original",
    }
}

/// Shared bookkeeping of the recording extension and listener.
#[derive(Debug)]
struct Recorder {
    key: String,
    log: EventLog,
    veto: Option<String>,
}

impl Recorder {
    fn record(&self, event: &str, detail: Option<String>) -> CoreResult<()> {
        match detail {
            Some(detail) => self.log.push(format!("{}.{event}({detail})", self.key)),
            None => self.log.push(format!("{}.{event}", self.key)),
        }
        if self.veto.as_deref() == Some(event) {
            return Err(CoreError::veto(&self.key, format!("{event} vetoed")));
        }
        Ok(())
    }
}

/// An extension that records every event into an [`EventLog`].
///
/// With [`vetoing`](Self::vetoing), the extension returns
/// [`CoreError::ExtensionVeto`] from the named event after recording it.
#[derive(Debug)]
pub struct RecordingExtension {
    recorder: Recorder,
}

impl RecordingExtension {
    /// Creates an extension that records into `log`.
    pub fn new(key: impl Into<String>, log: &EventLog) -> Self {
        Self {
            recorder: Recorder {
                key: key.into(),
                log: log.clone(),
                veto: None,
            },
        }
    }

    /// Makes the extension veto `event`, for example `"committing"`.
    pub fn vetoing(mut self, event: impl Into<String>) -> Self {
        self.recorder.veto = Some(event.into());
        self
    }

    /// Wraps the extension for installation.
    pub fn into_arc(self) -> Arc<dyn ClientTransactionExtension> {
        Arc::new(self)
    }
}

impl ClientTransactionExtension for RecordingExtension {
    fn key(&self) -> &str {
        &self.recorder.key
    }

    fn transaction_initialize(&self, _tx: &ClientTransaction) -> CoreResult<()> {
        self.recorder.record("transaction_initialize", None)
    }

    fn transaction_discard(&self, _tx: &ClientTransaction) -> CoreResult<()> {
        self.recorder.record("transaction_discard", None)
    }

    fn sub_transaction_creating(&self, _tx: &ClientTransaction) -> CoreResult<()> {
        self.recorder.record("sub_transaction_creating", None)
    }

    fn sub_transaction_initialize(
        &self,
        _tx: &ClientTransaction,
        _sub: &ClientTransaction,
    ) -> CoreResult<()> {
        self.recorder.record("sub_transaction_initialize", None)
    }

    fn sub_transaction_created(
        &self,
        _tx: &ClientTransaction,
        _sub: &ClientTransaction,
    ) -> CoreResult<()> {
        self.recorder.record("sub_transaction_created", None)
    }

    fn new_object_creating(&self, _tx: &ClientTransaction, class_id: &ClassId) -> CoreResult<()> {
        self.recorder
            .record("new_object_creating", Some(class_id.to_string()))
    }

    fn objects_loading(&self, _tx: &ClientTransaction, loading: &[ObjectId]) -> CoreResult<()> {
        self.recorder.record("objects_loading", Some(ids(loading)))
    }

    fn objects_loaded(&self, _tx: &ClientTransaction, loaded: &[DomainObject]) -> CoreResult<()> {
        self.recorder.record("objects_loaded", Some(objects(loaded)))
    }

    fn objects_not_found(&self, _tx: &ClientTransaction, missing: &[ObjectId]) -> CoreResult<()> {
        self.recorder.record("objects_not_found", Some(ids(missing)))
    }

    fn objects_unloading(
        &self,
        _tx: &ClientTransaction,
        unloading: &[DomainObject],
    ) -> CoreResult<()> {
        self.recorder
            .record("objects_unloading", Some(objects(unloading)))
    }

    fn objects_unloaded(
        &self,
        _tx: &ClientTransaction,
        unloaded: &[DomainObject],
    ) -> CoreResult<()> {
        self.recorder.record("objects_unloaded", Some(objects(unloaded)))
    }

    fn object_deleting(&self, _tx: &ClientTransaction, object: &DomainObject) -> CoreResult<()> {
        self.recorder
            .record("object_deleting", Some(short_id(object.id())))
    }

    fn object_deleted(&self, _tx: &ClientTransaction, object: &DomainObject) -> CoreResult<()> {
        self.recorder
            .record("object_deleted", Some(short_id(object.id())))
    }

    fn property_value_reading(
        &self,
        _tx: &ClientTransaction,
        _object: &DomainObject,
        property: &str,
        value_access: ValueAccess,
    ) -> CoreResult<()> {
        self.recorder.record(
            "property_value_reading",
            Some(format!("{property},{}", access(value_access))),
        )
    }

    fn property_value_read(
        &self,
        _tx: &ClientTransaction,
        _object: &DomainObject,
        property: &str,
        value: &Value,
        _access: ValueAccess,
    ) -> CoreResult<()> {
        self.recorder
            .record("property_value_read", Some(format!("{property}={value}")))
    }

    fn property_value_changing(
        &self,
        _tx: &ClientTransaction,
        _object: &DomainObject,
        property: &str,
        old_value: &Value,
        new_value: &Value,
    ) -> CoreResult<()> {
        self.recorder.record(
            "property_value_changing",
            Some(format!("{property}:{old_value}->{new_value}")),
        )
    }

    fn property_value_changed(
        &self,
        _tx: &ClientTransaction,
        _object: &DomainObject,
        property: &str,
        old_value: &Value,
        new_value: &Value,
    ) -> CoreResult<()> {
        self.recorder.record(
            "property_value_changed",
            Some(format!("{property}:{old_value}->{new_value}")),
        )
    }

    fn relation_reading(
        &self,
        _tx: &ClientTransaction,
        _object: &DomainObject,
        property: &str,
        value_access: ValueAccess,
    ) -> CoreResult<()> {
        self.recorder.record(
            "relation_reading",
            Some(format!("{property},{}", access(value_access))),
        )
    }

    fn relation_read(
        &self,
        _tx: &ClientTransaction,
        _object: &DomainObject,
        property: &str,
        related: &RelatedObjects,
        _access: ValueAccess,
    ) -> CoreResult<()> {
        let related = match related {
            RelatedObjects::Single(object) => optional(object.as_ref()),
            RelatedObjects::Collection(items) => format!("[{}]", objects(items)),
        };
        self.recorder
            .record("relation_read", Some(format!("{property}={related}")))
    }

    fn relation_changing(
        &self,
        _tx: &ClientTransaction,
        object: &DomainObject,
        property: &str,
        old_related: Option<&DomainObject>,
        new_related: Option<&DomainObject>,
    ) -> CoreResult<()> {
        self.recorder.record(
            "relation_changing",
            Some(format!(
                "{}.{property}:{}->{}",
                short_id(object.id()),
                optional(old_related),
                optional(new_related)
            )),
        )
    }

    fn relation_changed(
        &self,
        _tx: &ClientTransaction,
        object: &DomainObject,
        property: &str,
        old_related: Option<&DomainObject>,
        new_related: Option<&DomainObject>,
    ) -> CoreResult<()> {
        self.recorder.record(
            "relation_changed",
            Some(format!(
                "{}.{property}:{}->{}",
                short_id(object.id()),
                optional(old_related),
                optional(new_related)
            )),
        )
    }

    fn committing(
        &self,
        _tx: &ClientTransaction,
        committing: &[DomainObject],
        _registrar: &CommittingEventRegistrar,
    ) -> CoreResult<()> {
        self.recorder.record("committing", Some(objects(committing)))
    }

    fn commit_validate(&self, _tx: &ClientTransaction, data: &[PersistableData]) -> CoreResult<()> {
        let validated: Vec<DomainObject> = data.iter().map(|d| d.domain_object.clone()).collect();
        self.recorder
            .record("commit_validate", Some(objects(&validated)))
    }

    fn committed(&self, _tx: &ClientTransaction, committed: &[DomainObject]) -> CoreResult<()> {
        self.recorder.record("committed", Some(objects(committed)))
    }

    fn rolling_back(&self, _tx: &ClientTransaction, rolling: &[DomainObject]) -> CoreResult<()> {
        self.recorder.record("rolling_back", Some(objects(rolling)))
    }

    fn rolled_back(&self, _tx: &ClientTransaction, rolled: &[DomainObject]) -> CoreResult<()> {
        self.recorder.record("rolled_back", Some(objects(rolled)))
    }

    fn filter_query_result(
        &self,
        _tx: &ClientTransaction,
        result: QueryResult,
    ) -> CoreResult<QueryResult> {
        self.recorder
            .record("filter_query_result", Some(result.len().to_string()))?;
        Ok(result)
    }
}

/// A listener that records lifecycle, invalidation and commit events.
///
/// Listeners run before extensions, which lets tests check the relative
/// order of both.
#[derive(Debug)]
pub struct RecordingListener {
    recorder: Recorder,
}

impl RecordingListener {
    /// Creates a listener that records into `log` with entries prefixed
    /// by `name`.
    pub fn new(name: impl Into<String>, log: &EventLog) -> Self {
        Self {
            recorder: Recorder {
                key: name.into(),
                log: log.clone(),
                veto: None,
            },
        }
    }

    /// Makes the listener fail `event` after recording it.
    pub fn vetoing(mut self, event: impl Into<String>) -> Self {
        self.recorder.veto = Some(event.into());
        self
    }

    /// Installs the listener on `tx`.
    pub fn install(self, tx: &ClientTransaction) {
        tx.event_broker().add_listener(Arc::new(self));
    }
}

impl ClientTransactionListener for RecordingListener {
    fn transaction_discard(&self, _tx: &ClientTransaction) -> CoreResult<()> {
        self.recorder.record("transaction_discard", None)
    }

    fn new_object_creating(&self, _tx: &ClientTransaction, class_id: &ClassId) -> CoreResult<()> {
        self.recorder
            .record("new_object_creating", Some(class_id.to_string()))
    }

    fn objects_loading(&self, _tx: &ClientTransaction, loading: &[ObjectId]) -> CoreResult<()> {
        self.recorder.record("objects_loading", Some(ids(loading)))
    }

    fn property_value_changing(
        &self,
        _tx: &ClientTransaction,
        _object: &DomainObject,
        property: &str,
        old_value: &Value,
        new_value: &Value,
    ) -> CoreResult<()> {
        self.recorder.record(
            "property_value_changing",
            Some(format!("{property}:{old_value}->{new_value}")),
        )
    }

    fn committing(
        &self,
        _tx: &ClientTransaction,
        committing: &[DomainObject],
        _registrar: &CommittingEventRegistrar,
    ) -> CoreResult<()> {
        self.recorder.record("committing", Some(objects(committing)))
    }

    fn committed(&self, _tx: &ClientTransaction, committed: &[DomainObject]) -> CoreResult<()> {
        self.recorder.record("committed", Some(objects(committed)))
    }

    fn object_marked_invalid(&self, _tx: &ClientTransaction, object: &DomainObject) -> CoreResult<()> {
        self.recorder
            .record("object_marked_invalid", Some(short_id(object.id())))
    }

    fn object_marked_not_invalid(
        &self,
        _tx: &ClientTransaction,
        object: &DomainObject,
    ) -> CoreResult<()> {
        self.recorder
            .record("object_marked_not_invalid", Some(short_id(object.id())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_is_shared_between_clones() {
        let log = EventLog::new();
        let other = log.clone();
        other.push("a.b");
        assert_eq!(log.entries(), vec!["a.b".to_owned()]);
        assert!(log.contains("a.b"));
        log.clear();
        assert!(other.entries().is_empty());
    }

    #[test]
    fn recorder_vetoes_only_the_named_event() {
        let log = EventLog::new();
        let recorder = Recorder {
            key: "ext".into(),
            log: log.clone(),
            veto: Some("committing".into()),
        };
        assert!(recorder.record("committed", None).is_ok());
        let error = recorder.record("committing", Some("x".into())).unwrap_err();
        assert!(matches!(error, CoreError::ExtensionVeto { ref key, .. } if key == "ext"));
        assert_eq!(log.entries(), vec!["ext.committed", "ext.committing(x)"]);
    }

    #[test]
    fn short_ids_drop_the_key_kind() {
        assert_eq!(short_id(&ObjectId::new("Order", domobj_codec::StorageKey::Integer(7))), "Order/7");
    }
}
