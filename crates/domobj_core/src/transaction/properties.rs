//! Property access with reading and changing events.

use super::ClientTransaction;
use crate::domain_object::DomainObject;
use crate::error::{CoreError, CoreResult};
use crate::mapping::PropertyDefinition;
use crate::types::ValueAccess;
use domobj_codec::Value;

impl ClientTransaction {
    /// Returns the current value of a property.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Mapping`] for unknown properties,
    /// [`CoreError::InvalidArgument`] for foreign keys (use the relation
    /// methods), [`CoreError::ObjectDeleted`] for deleted objects and
    /// [`CoreError::ObjectInvalid`] for invalid ones.
    pub fn get_property(&self, object: &DomainObject, name: &str) -> CoreResult<Value> {
        self.read_property(object, name, ValueAccess::Current)
    }

    /// Returns the value of a property as of the last load or commit.
    /// Deleted objects may be read this way.
    ///
    /// # Errors
    ///
    /// Same as [`get_property`](Self::get_property) without the deleted
    /// check.
    pub fn get_original_property(&self, object: &DomainObject, name: &str) -> CoreResult<Value> {
        self.read_property(object, name, ValueAccess::Original)
    }

    /// Sets a property.
    ///
    /// Nothing happens, and no event is raised, if the value does not
    /// change.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] if the value does not fit the
    /// property, [`CoreError::TransactionReadOnly`] while a sub-transaction
    /// exists, errors raised by `property_value_changing` handlers, and the
    /// errors of [`get_property`](Self::get_property).
    pub fn set_property(
        &self,
        object: &DomainObject,
        name: &str,
        value: impl Into<Value>,
    ) -> CoreResult<()> {
        let value = value.into();
        self.ensure_active()?;
        self.ensure_writeable("set_property")?;
        self.ensure_valid(object)?;
        let definition = self.value_property(object, name)?;
        if !definition.accepts(&value) {
            return Err(CoreError::invalid_argument(format!(
                "value {value} does not fit property '{name}' of type {:?}{}",
                definition.value_type,
                if definition.nullable { "" } else { " (not nullable)" },
            )));
        }

        let id = object.id();
        let (is_deleted, old) = self.inner.data_manager.with_data_container(self, id, |c| {
            (c.is_deleted(), c.value(name, ValueAccess::Current).cloned())
        })?;
        if is_deleted {
            return Err(CoreError::ObjectDeleted { id: id.clone() });
        }
        let old = old?;
        if old == value {
            return Ok(());
        }

        let broker = &self.inner.event_broker;
        broker.raise_property_value_changing(self, object, name, &old, &value)?;
        self.inner
            .data_manager
            .set_property_value(id, name, value.clone())?;
        broker.raise_property_value_changed(self, object, name, &old, &value)
    }

    fn read_property(
        &self,
        object: &DomainObject,
        name: &str,
        access: ValueAccess,
    ) -> CoreResult<Value> {
        self.ensure_active()?;
        self.ensure_valid(object)?;
        self.value_property(object, name)?;

        let broker = &self.inner.event_broker;
        broker.raise_property_value_reading(self, object, name, access)?;
        let id = object.id();
        let (is_deleted, value) = self.inner.data_manager.with_data_container(self, id, |c| {
            (c.is_deleted(), c.value(name, access).cloned())
        })?;
        if is_deleted && access == ValueAccess::Current {
            return Err(CoreError::ObjectDeleted { id: id.clone() });
        }
        let value = value?;
        broker.raise_property_value_read(self, object, name, &value, access)?;
        Ok(value)
    }

    /// Looks up a property that is not a foreign key.
    fn value_property(&self, object: &DomainObject, name: &str) -> CoreResult<&PropertyDefinition> {
        let definition = self.inner.mapping.property(object.class_id(), name)?;
        if definition.is_foreign_key {
            return Err(CoreError::invalid_argument(format!(
                "'{name}' of class '{}' is a relation; use the relation methods",
                object.class_id()
            )));
        }
        Ok(definition)
    }
}

#[cfg(test)]
mod tests {
    use crate::error::CoreError;
    use crate::mapping::test_support::order_mapping;
    use crate::transaction::ClientTransaction;
    use domobj_codec::Value;
    use domobj_storage::InMemoryStorage;
    use std::sync::Arc;

    fn transaction() -> ClientTransaction {
        ClientTransaction::create_root_transaction(order_mapping(), Arc::new(InMemoryStorage::new()))
            .unwrap()
    }

    #[test]
    fn new_objects_start_with_defaults() {
        let tx = transaction();
        let customer = tx.new_object("Customer").unwrap();
        assert_eq!(tx.get_property(&customer, "Name").unwrap(), Value::Text(String::new()));
        assert_eq!(tx.get_property(&customer, "Visits").unwrap(), Value::Integer(0));
    }

    #[test]
    fn set_then_get_current_and_original() {
        let tx = transaction();
        let customer = tx.new_object("Customer").unwrap();
        tx.set_property(&customer, "Name", "Ada").unwrap();
        assert_eq!(tx.get_property(&customer, "Name").unwrap(), Value::from("Ada"));
        assert_eq!(
            tx.get_original_property(&customer, "Name").unwrap(),
            Value::Text(String::new())
        );
    }

    #[test]
    fn wrong_type_is_rejected() {
        let tx = transaction();
        let order = tx.new_object("Order").unwrap();
        let error = tx.set_property(&order, "OrderNumber", "one").unwrap_err();
        assert!(matches!(error, CoreError::InvalidArgument { .. }));
        assert!(matches!(
            tx.set_property(&order, "OrderNumber", Value::Null),
            Err(CoreError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn nullable_property_accepts_null() {
        let tx = transaction();
        let ticket = tx.new_object("OrderTicket").unwrap();
        tx.set_property(&ticket, "FileName", "a.pdf").unwrap();
        tx.set_property(&ticket, "FileName", Value::Null).unwrap();
        assert!(tx.get_property(&ticket, "FileName").unwrap().is_null());
    }

    #[test]
    fn foreign_keys_are_not_properties() {
        let tx = transaction();
        let order = tx.new_object("Order").unwrap();
        assert!(matches!(
            tx.get_property(&order, "Customer"),
            Err(CoreError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn unknown_property_is_a_mapping_error() {
        let tx = transaction();
        let order = tx.new_object("Order").unwrap();
        assert!(matches!(
            tx.get_property(&order, "Missing"),
            Err(CoreError::Mapping { .. })
        ));
    }

    #[test]
    fn read_only_parent_rejects_writes() {
        let tx = transaction();
        let order = tx.new_object("Order").unwrap();
        let _sub = tx.create_sub_transaction().unwrap();
        assert!(matches!(
            tx.set_property(&order, "OrderNumber", 5_i64),
            Err(CoreError::TransactionReadOnly { .. }) | Err(CoreError::TransactionInactive { .. })
        ));
    }
}
