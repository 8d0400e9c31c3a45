//! Relation access through bidirectional end-point commands.

use super::ClientTransaction;
use crate::domain_object::DomainObject;
use crate::end_point::{RelatedObjects, RelationEndPointCommand, RelationEndPointId};
use crate::error::{CoreError, CoreResult};
use crate::mapping::RelationEndPointDefinition;
use crate::types::ValueAccess;

impl ClientTransaction {
    // ========================================================================
    // Reading
    // ========================================================================

    /// Returns the object related through a one-valued end-point.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Mapping`] for unknown end-points,
    /// [`CoreError::InvalidArgument`] for collection end-points,
    /// [`CoreError::ObjectDeleted`] for deleted objects and load errors.
    pub fn get_related_object(
        &self,
        object: &DomainObject,
        property: &str,
    ) -> CoreResult<Option<DomainObject>> {
        self.read_single(object, property, ValueAccess::Current)
    }

    /// Returns the object related through a one-valued end-point as of the
    /// last load or commit.
    ///
    /// # Errors
    ///
    /// Same as [`get_related_object`](Self::get_related_object) without
    /// the deleted check.
    pub fn get_original_related_object(
        &self,
        object: &DomainObject,
        property: &str,
    ) -> CoreResult<Option<DomainObject>> {
        self.read_single(object, property, ValueAccess::Original)
    }

    /// Returns the objects of a collection end-point, in order.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] for one-valued end-points and
    /// the other errors of [`get_related_object`](Self::get_related_object).
    pub fn get_related_objects(
        &self,
        object: &DomainObject,
        property: &str,
    ) -> CoreResult<Vec<DomainObject>> {
        self.read_collection(object, property, ValueAccess::Current)
    }

    /// Returns the objects of a collection end-point as of the last load or
    /// commit.
    ///
    /// # Errors
    ///
    /// Same as [`get_related_objects`](Self::get_related_objects) without
    /// the deleted check.
    pub fn get_original_related_objects(
        &self,
        object: &DomainObject,
        property: &str,
    ) -> CoreResult<Vec<DomainObject>> {
        self.read_collection(object, property, ValueAccess::Original)
    }

    fn read_single(
        &self,
        object: &DomainObject,
        property: &str,
        access: ValueAccess,
    ) -> CoreResult<Option<DomainObject>> {
        match self.read_relation(object, property, access, false)? {
            RelatedObjects::Single(related) => Ok(related),
            RelatedObjects::Collection(_) => Err(collection_mismatch(object, property, true)),
        }
    }

    fn read_collection(
        &self,
        object: &DomainObject,
        property: &str,
        access: ValueAccess,
    ) -> CoreResult<Vec<DomainObject>> {
        match self.read_relation(object, property, access, true)? {
            RelatedObjects::Collection(related) => Ok(related),
            RelatedObjects::Single(_) => Err(collection_mismatch(object, property, false)),
        }
    }

    fn read_relation(
        &self,
        object: &DomainObject,
        property: &str,
        access: ValueAccess,
        collection: bool,
    ) -> CoreResult<RelatedObjects> {
        self.ensure_active()?;
        self.ensure_valid(object)?;
        let definition = self.end_point_definition(object, property)?;
        if definition.is_collection() != collection {
            return Err(collection_mismatch(object, property, definition.is_collection()));
        }

        let broker = &self.inner.event_broker;
        broker.raise_relation_reading(self, object, property, access)?;
        if access == ValueAccess::Current {
            self.ensure_not_deleted(object)?;
        }
        let end_point = RelationEndPointId::new(object.id().clone(), property);
        let ids = self
            .inner
            .data_manager
            .related_ids(self, &end_point, definition, access)?;
        let related = if collection {
            self.inner.data_manager.ensure_loaded(self, &ids, false)?;
            RelatedObjects::Collection(
                ids.iter()
                    .map(|id| self.inner.lifetime.get_object_reference(id))
                    .collect::<CoreResult<_>>()?,
            )
        } else {
            RelatedObjects::Single(
                ids.first()
                    .map(|id| self.inner.lifetime.get_object_reference(id))
                    .transpose()?,
            )
        };
        broker.raise_relation_read(self, object, property, &related, access)?;
        Ok(related)
    }

    // ========================================================================
    // Writing
    // ========================================================================

    /// Sets a one-valued end-point. The opposite end-points of the old and
    /// the new related object are updated as well.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ObjectTypeMismatch`] if `related` does not fit
    /// the relation, [`CoreError::InvalidOperation`] for read-only
    /// relations, [`CoreError::ObjectDeleted`] if either object is deleted,
    /// [`CoreError::TransactionReadOnly`] while a sub-transaction exists,
    /// and errors raised by `relation_changing` handlers.
    pub fn set_related_object(
        &self,
        object: &DomainObject,
        property: &str,
        related: Option<&DomainObject>,
    ) -> CoreResult<()> {
        let definition = self.writable_end_point(object, property, "set_related_object")?;
        if let Some(related) = related {
            self.check_related(definition, related)?;
        }
        self.execute_relation_command(&RelationEndPointCommand::Set {
            end_point: RelationEndPointId::new(object.id().clone(), property),
            related: related.map(|r| r.id().clone()),
        })
    }

    /// Appends an object to a collection end-point.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] if the object is already part
    /// of the collection, and the errors of
    /// [`set_related_object`](Self::set_related_object).
    pub fn add_related_object(
        &self,
        object: &DomainObject,
        property: &str,
        related: &DomainObject,
    ) -> CoreResult<()> {
        self.insert_into_collection(object, property, None, related, "add_related_object")
    }

    /// Inserts an object into a collection end-point at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] if `index` is out of range,
    /// and the errors of [`add_related_object`](Self::add_related_object).
    pub fn insert_related_object(
        &self,
        object: &DomainObject,
        property: &str,
        index: usize,
        related: &DomainObject,
    ) -> CoreResult<()> {
        self.insert_into_collection(object, property, Some(index), related, "insert_related_object")
    }

    /// Removes an object from a collection end-point; its foreign key is
    /// cleared.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] if the object is not part of
    /// the collection, and the errors of
    /// [`set_related_object`](Self::set_related_object).
    pub fn remove_related_object(
        &self,
        object: &DomainObject,
        property: &str,
        related: &DomainObject,
    ) -> CoreResult<()> {
        let definition = self.writable_end_point(object, property, "remove_related_object")?;
        self.check_related(definition, related)?;
        self.execute_relation_command(&RelationEndPointCommand::Remove {
            end_point: RelationEndPointId::new(object.id().clone(), property),
            object: related.id().clone(),
        })
    }

    /// Replaces the items of a collection end-point. Removed items lose
    /// their foreign key; added items are taken from their previous owner.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] for duplicate items, and the
    /// errors of [`set_related_object`](Self::set_related_object).
    pub fn set_related_objects(
        &self,
        object: &DomainObject,
        property: &str,
        related: &[DomainObject],
    ) -> CoreResult<()> {
        let definition = self.writable_end_point(object, property, "set_related_objects")?;
        for item in related {
            self.check_related(definition, item)?;
        }
        self.execute_relation_command(&RelationEndPointCommand::Replace {
            end_point: RelationEndPointId::new(object.id().clone(), property),
            objects: related.iter().map(|r| r.id().clone()).collect(),
        })
    }

    fn insert_into_collection(
        &self,
        object: &DomainObject,
        property: &str,
        index: Option<usize>,
        related: &DomainObject,
        operation: &str,
    ) -> CoreResult<()> {
        let definition = self.writable_end_point(object, property, operation)?;
        self.check_related(definition, related)?;
        self.execute_relation_command(&RelationEndPointCommand::Insert {
            end_point: RelationEndPointId::new(object.id().clone(), property),
            object: related.id().clone(),
            index,
        })
    }

    /// Expands and applies a relation command.
    ///
    /// Changing events are raised for every affected end-point before
    /// anything is modified; changed events follow in reverse order.
    pub(crate) fn execute_relation_command(
        &self,
        command: &RelationEndPointCommand,
    ) -> CoreResult<()> {
        let data_manager = &self.inner.data_manager;
        let expanded = data_manager.prepare(self, command)?;
        if expanded.is_empty() {
            return Ok(());
        }
        let changes = data_manager.relation_changes(&expanded);
        let broker = &self.inner.event_broker;
        for change in &changes {
            change.raise_changing(broker, self)?;
        }
        data_manager.perform(&expanded)?;
        for change in changes.iter().rev() {
            change.raise_changed(broker, self)?;
        }
        Ok(())
    }

    // ========================================================================
    // Checks
    // ========================================================================

    fn end_point_definition(
        &self,
        object: &DomainObject,
        property: &str,
    ) -> CoreResult<&RelationEndPointDefinition> {
        self.inner.mapping.end_point(object.class_id(), property)
    }

    fn writable_end_point(
        &self,
        object: &DomainObject,
        property: &str,
        operation: &str,
    ) -> CoreResult<&RelationEndPointDefinition> {
        self.ensure_active()?;
        self.ensure_writeable(operation)?;
        self.ensure_valid(object)?;
        let definition = self.end_point_definition(object, property)?;
        if definition.is_read_only {
            return Err(CoreError::invalid_operation(format!(
                "relation '{property}' of class '{}' is read-only",
                object.class_id()
            )));
        }
        self.ensure_not_deleted(object)?;
        Ok(definition)
    }

    fn check_related(
        &self,
        definition: &RelationEndPointDefinition,
        related: &DomainObject,
    ) -> CoreResult<()> {
        self.ensure_valid(related)?;
        if !self
            .inner
            .mapping
            .is_same_or_base_of(&definition.opposite_class_id, related.class_id())
        {
            return Err(CoreError::ObjectTypeMismatch {
                id: related.id().clone(),
                requested: definition.opposite_class_id.clone(),
            });
        }
        self.ensure_not_deleted(related)
    }

    fn ensure_not_deleted(&self, object: &DomainObject) -> CoreResult<()> {
        let deleted = self
            .inner
            .data_manager
            .with_data_container(self, object.id(), |c| c.is_deleted())?;
        if deleted {
            Err(CoreError::ObjectDeleted {
                id: object.id().clone(),
            })
        } else {
            Ok(())
        }
    }
}

fn collection_mismatch(object: &DomainObject, property: &str, is_collection: bool) -> CoreError {
    let kind = if is_collection { "a collection" } else { "not a collection" };
    CoreError::invalid_argument(format!(
        "relation '{property}' of class '{}' is {kind}",
        object.class_id()
    ))
}

#[cfg(test)]
mod tests {
    use crate::error::CoreError;
    use crate::mapping::test_support::order_mapping;
    use crate::transaction::ClientTransaction;
    use domobj_storage::InMemoryStorage;
    use std::sync::Arc;

    fn transaction() -> ClientTransaction {
        ClientTransaction::create_root_transaction(order_mapping(), Arc::new(InMemoryStorage::new()))
            .unwrap()
    }

    #[test]
    fn setting_the_foreign_key_updates_the_collection() {
        let tx = transaction();
        let customer = tx.new_object("Customer").unwrap();
        let order = tx.new_object("Order").unwrap();

        tx.set_related_object(&order, "Customer", Some(&customer)).unwrap();

        assert_eq!(tx.get_related_object(&order, "Customer").unwrap(), Some(customer.clone()));
        assert_eq!(tx.get_related_objects(&customer, "Orders").unwrap(), vec![order]);
    }

    #[test]
    fn moving_an_item_between_collections() {
        let tx = transaction();
        let first = tx.new_object("Customer").unwrap();
        let second = tx.new_object("Customer").unwrap();
        let order = tx.new_object("Order").unwrap();

        tx.add_related_object(&first, "Orders", &order).unwrap();
        tx.add_related_object(&second, "Orders", &order).unwrap();

        assert!(tx.get_related_objects(&first, "Orders").unwrap().is_empty());
        assert_eq!(tx.get_related_objects(&second, "Orders").unwrap(), vec![order.clone()]);
        assert_eq!(tx.get_related_object(&order, "Customer").unwrap(), Some(second));
    }

    #[test]
    fn one_to_one_replaces_the_previous_partner() {
        let tx = transaction();
        let order = tx.new_object("Order").unwrap();
        let old_ticket = tx.new_object("OrderTicket").unwrap();
        let new_ticket = tx.new_object("OrderTicket").unwrap();

        tx.set_related_object(&order, "OrderTicket", Some(&old_ticket)).unwrap();
        tx.set_related_object(&order, "OrderTicket", Some(&new_ticket)).unwrap();

        assert_eq!(tx.get_related_object(&old_ticket, "Order").unwrap(), None);
        assert_eq!(tx.get_related_object(&new_ticket, "Order").unwrap(), Some(order));
    }

    #[test]
    fn insert_and_remove_keep_order() {
        let tx = transaction();
        let customer = tx.new_object("Customer").unwrap();
        let a = tx.new_object("Order").unwrap();
        let b = tx.new_object("Order").unwrap();
        let c = tx.new_object("Order").unwrap();

        tx.add_related_object(&customer, "Orders", &a).unwrap();
        tx.add_related_object(&customer, "Orders", &c).unwrap();
        tx.insert_related_object(&customer, "Orders", 1, &b).unwrap();
        assert_eq!(
            tx.get_related_objects(&customer, "Orders").unwrap(),
            vec![a.clone(), b.clone(), c.clone()]
        );

        tx.remove_related_object(&customer, "Orders", &b).unwrap();
        assert_eq!(tx.get_related_objects(&customer, "Orders").unwrap(), vec![a, c]);
        assert_eq!(tx.get_related_object(&b, "Customer").unwrap(), None);
    }

    #[test]
    fn replacing_items_clears_removed_foreign_keys() {
        let tx = transaction();
        let customer = tx.new_object("Customer").unwrap();
        let a = tx.new_object("Order").unwrap();
        let b = tx.new_object("Order").unwrap();

        tx.set_related_objects(&customer, "Orders", &[a.clone()]).unwrap();
        tx.set_related_objects(&customer, "Orders", &[b.clone()]).unwrap();

        assert_eq!(tx.get_related_object(&a, "Customer").unwrap(), None);
        assert_eq!(tx.get_related_object(&b, "Customer").unwrap(), Some(customer));
    }

    #[test]
    fn wrong_class_is_a_type_mismatch() {
        let tx = transaction();
        let order = tx.new_object("Order").unwrap();
        let ticket = tx.new_object("OrderTicket").unwrap();
        assert!(matches!(
            tx.set_related_object(&order, "Customer", Some(&ticket)),
            Err(CoreError::ObjectTypeMismatch { .. })
        ));
    }

    #[test]
    fn collection_accessors_reject_one_valued_end_points() {
        let tx = transaction();
        let order = tx.new_object("Order").unwrap();
        assert!(matches!(
            tx.get_related_objects(&order, "Customer"),
            Err(CoreError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn original_relation_is_empty_for_new_objects() {
        let tx = transaction();
        let customer = tx.new_object("Customer").unwrap();
        let order = tx.new_object("Order").unwrap();
        tx.set_related_object(&order, "Customer", Some(&customer)).unwrap();
        assert_eq!(tx.get_original_related_object(&order, "Customer").unwrap(), None);
        assert!(tx.get_original_related_objects(&customer, "Orders").unwrap().is_empty());
    }
}
