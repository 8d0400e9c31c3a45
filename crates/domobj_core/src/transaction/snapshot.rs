//! CBOR snapshots of a transaction and its ancestors.

use super::{ClientTransaction, RootComponentFactory};
use crate::application_data::ApplicationData;
use crate::config::Config;
use crate::data_container::{DataContainer, PersistenceState, PropertyValue};
use crate::end_point::{CollectionEndPoint, RelationEndPointId, VirtualEndPoint, VirtualObjectEndPoint};
use crate::error::{CoreError, CoreResult};
use crate::mapping::MappingConfiguration;
use domobj_codec::{ObjectId, Value};
use domobj_storage::{StorageProvider, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct HierarchySnapshot {
    format_version: u32,
    /// Root first, the serialized transaction last.
    transactions: Vec<TransactionSnapshot>,
}

#[derive(Serialize, Deserialize)]
struct TransactionSnapshot {
    discarded: bool,
    config: Config,
    containers: Vec<ContainerSnapshot>,
    end_points: Vec<EndPointSnapshot>,
    invalid: Vec<ObjectId>,
    application_data: BTreeMap<String, Value>,
}

#[derive(Serialize, Deserialize)]
struct ContainerSnapshot {
    id: ObjectId,
    state: PersistenceState,
    timestamp: Option<Timestamp>,
    marked_changed: bool,
    new_in_hierarchy: bool,
    /// Property name to `(original, current)`.
    values: BTreeMap<String, (Value, Value)>,
}

#[derive(Serialize, Deserialize)]
enum EndPointSnapshot {
    Object {
        id: RelationEndPointId,
        original: Option<ObjectId>,
        current: Option<ObjectId>,
        touched: bool,
    },
    Collection {
        id: RelationEndPointId,
        original: Vec<ObjectId>,
        current: Vec<ObjectId>,
        touched: bool,
    },
}

impl ContainerSnapshot {
    fn capture(container: &DataContainer) -> Self {
        Self {
            id: container.id().clone(),
            state: container.persistence_state(),
            timestamp: container.timestamp(),
            marked_changed: container.is_marked_changed(),
            new_in_hierarchy: container.is_new_in_hierarchy(),
            values: container
                .values()
                .iter()
                .map(|(name, value)| (name.clone(), (value.original.clone(), value.current.clone())))
                .collect(),
        }
    }

    fn rebuild(self, mapping: &MappingConfiguration) -> CoreResult<DataContainer> {
        let class = mapping.class(self.id.class_id())?;
        let values = self
            .values
            .into_iter()
            .map(|(name, (original, current))| (name, PropertyValue { current, original }))
            .collect();
        Ok(DataContainer::restore(
            Arc::clone(class),
            self.id,
            values,
            self.state,
            self.timestamp,
            self.marked_changed,
            self.new_in_hierarchy,
        ))
    }
}

impl EndPointSnapshot {
    fn capture(end_point: &VirtualEndPoint) -> Self {
        match end_point {
            VirtualEndPoint::Object(e) => Self::Object {
                id: e.id().clone(),
                original: e.original().cloned(),
                current: e.current().cloned(),
                touched: e.is_touched(),
            },
            VirtualEndPoint::Collection(e) => Self::Collection {
                id: e.id().clone(),
                original: e.original().to_vec(),
                current: e.current().to_vec(),
                touched: e.is_touched(),
            },
        }
    }

    fn rebuild(self) -> VirtualEndPoint {
        match self {
            Self::Object {
                id,
                original,
                current,
                touched,
            } => VirtualEndPoint::Object(VirtualObjectEndPoint::restore(id, original, current, touched)),
            Self::Collection {
                id,
                original,
                current,
                touched,
            } => VirtualEndPoint::Collection(CollectionEndPoint::restore(id, original, current, touched)),
        }
    }
}

impl ClientTransaction {
    /// Serializes this transaction together with its ancestors.
    ///
    /// The snapshot holds the registered data, loaded virtual end-points,
    /// invalid objects and discarded flag of every transaction from the root
    /// down to this one, and the application data of the hierarchy.
    /// Sub-transactions of this transaction are not included.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Codec`] if encoding fails.
    pub fn to_snapshot_bytes(&self) -> CoreResult<Vec<u8>> {
        let mut chain = vec![self.clone()];
        while let Some(parent) = chain.last().and_then(|tx| tx.parent_transaction().cloned()) {
            chain.push(parent);
        }
        chain.reverse();

        let transactions = chain.iter().map(TransactionSnapshot::capture).collect();
        let snapshot = HierarchySnapshot {
            format_version: FORMAT_VERSION,
            transactions,
        };
        let bytes = domobj_codec::to_cbor(&snapshot)?;
        tracing::debug!(transaction = %self.id(), depth = chain.len(), bytes = bytes.len(), "snapshot written");
        Ok(bytes)
    }

    /// Rebuilds a transaction hierarchy from [`to_snapshot_bytes`] output
    /// and returns the transaction that was serialized.
    ///
    /// Objects are new instances; the restored hierarchy reads from and
    /// commits to `storage`.
    ///
    /// [`to_snapshot_bytes`]: Self::to_snapshot_bytes
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Codec`] for malformed input,
    /// [`CoreError::InvalidArgument`] for an unsupported format version or
    /// an empty snapshot, and [`CoreError::Mapping`] if the data does not
    /// fit `mapping`.
    pub fn from_snapshot_bytes(
        bytes: &[u8],
        mapping: Arc<MappingConfiguration>,
        storage: Arc<dyn StorageProvider>,
    ) -> CoreResult<Self> {
        let snapshot: HierarchySnapshot = domobj_codec::from_cbor(bytes)?;
        if snapshot.format_version != FORMAT_VERSION {
            return Err(CoreError::invalid_argument(format!(
                "unsupported snapshot format version {}",
                snapshot.format_version
            )));
        }
        let mut transactions = snapshot.transactions.into_iter();
        let root_snapshot = transactions
            .next()
            .ok_or_else(|| CoreError::invalid_argument("snapshot contains no transaction"))?;

        let factory = RootComponentFactory::new(
            Arc::clone(&mapping),
            storage,
            root_snapshot.config.clone(),
        )
        .with_application_data(ApplicationData::from_entries(
            root_snapshot.application_data.clone(),
        ));
        let mut tx = Self::from_factory(&factory)?;
        let mut first_discarded = root_snapshot.discarded.then(|| tx.clone());
        root_snapshot.restore_into(&tx, &mapping)?;

        for sub_snapshot in transactions {
            tx = tx.create_sub_transaction()?;
            if sub_snapshot.discarded && first_discarded.is_none() {
                first_discarded = Some(tx.clone());
            }
            sub_snapshot.restore_into(&tx, &mapping)?;
        }
        if let Some(discarded) = first_discarded {
            discarded.discard()?;
        }
        tracing::debug!(transaction = %tx.id(), "snapshot restored");
        Ok(tx)
    }
}

impl TransactionSnapshot {
    fn capture(tx: &ClientTransaction) -> Self {
        let (containers, end_points) = tx.data_manager().export();
        let mut invalid: Vec<ObjectId> = tx
            .invalid_objects()
            .invalid_objects()
            .iter()
            .map(|object| object.id().clone())
            .collect();
        invalid.sort_unstable();
        Self {
            discarded: tx.is_discarded(),
            config: tx.config().clone(),
            containers: containers.iter().map(ContainerSnapshot::capture).collect(),
            end_points: end_points.iter().map(EndPointSnapshot::capture).collect(),
            invalid,
            application_data: tx.application_data().snapshot(),
        }
    }

    fn restore_into(self, tx: &ClientTransaction, mapping: &MappingConfiguration) -> CoreResult<()> {
        let containers = self
            .containers
            .into_iter()
            .map(|c| c.rebuild(mapping))
            .collect::<CoreResult<Vec<_>>>()?;
        let end_points = self.end_points.into_iter().map(EndPointSnapshot::rebuild).collect();
        // A sub-transaction inherits its parent's invalid objects on creation,
        // which includes the objects created in the sub itself.
        let invalid = self
            .invalid
            .iter()
            .map(|id| tx.inner.lifetime.get_object_reference(id))
            .collect::<CoreResult<Vec<_>>>()?;
        tx.invalid_objects().reset(invalid);
        tx.data_manager().restore(containers, end_points)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::test_support::order_mapping;
    use domobj_storage::InMemoryStorage;

    fn storage() -> Arc<dyn StorageProvider> {
        Arc::new(InMemoryStorage::new())
    }

    #[test]
    fn root_round_trip_keeps_changes() {
        let mapping = order_mapping();
        let tx = ClientTransaction::create_root_transaction(Arc::clone(&mapping), storage()).unwrap();
        let customer = tx.new_object("Customer").unwrap();
        tx.set_property(&customer, "Name", "Ada").unwrap();
        let order = tx.new_object("Order").unwrap();
        tx.add_related_object(&customer, "Orders", &order).unwrap();
        tx.application_data().insert("user", "ada");

        let bytes = tx.to_snapshot_bytes().unwrap();
        let restored = ClientTransaction::from_snapshot_bytes(&bytes, mapping, storage()).unwrap();

        let customer = restored.get_object(customer.id()).unwrap();
        assert_eq!(restored.get_property(&customer, "Name").unwrap(), Value::from("Ada"));
        assert!(restored.object_state(&customer).unwrap().is_new());
        let orders = restored.get_related_objects(&customer, "Orders").unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].id(), order.id());
        assert_eq!(restored.application_data().get("user"), Some(Value::from("ada")));
    }

    #[test]
    fn sub_transaction_round_trip_restores_the_chain() {
        let mapping = order_mapping();
        let root = ClientTransaction::create_root_transaction(Arc::clone(&mapping), storage()).unwrap();
        let sub = root.create_sub_transaction().unwrap();
        let order = sub.new_object("Order").unwrap();

        let bytes = sub.to_snapshot_bytes().unwrap();
        let restored = ClientTransaction::from_snapshot_bytes(&bytes, mapping, storage()).unwrap();

        let parent = restored.parent_transaction().cloned().unwrap();
        assert!(restored.is_active());
        assert!(!parent.is_writeable());
        assert!(restored.get_object(order.id()).is_ok());
        assert!(parent.invalid_objects().is_invalid(order.id()));
    }

    #[test]
    fn discarded_flag_survives() {
        let mapping = order_mapping();
        let root = ClientTransaction::create_root_transaction(Arc::clone(&mapping), storage()).unwrap();
        let sub = root.create_sub_transaction().unwrap();
        sub.discard().unwrap();

        let bytes = sub.to_snapshot_bytes().unwrap();
        let restored = ClientTransaction::from_snapshot_bytes(&bytes, mapping, storage()).unwrap();
        assert!(restored.is_discarded());
        assert!(restored.parent_transaction().unwrap().is_writeable());
    }

    #[test]
    fn garbage_is_rejected() {
        let result = ClientTransaction::from_snapshot_bytes(&[0xff, 0x00], order_mapping(), storage());
        assert!(matches!(result, Err(CoreError::Codec(_))));
    }
}
