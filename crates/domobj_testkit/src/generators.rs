//! Property-based test generators using proptest.
//!
//! Provides strategies for values, ids, object states and edit scripts
//! over the sales fixture.

use domobj_codec::{ObjectId, StorageKey, Value, ValueType};
use domobj_core::DomainObjectState;
use proptest::prelude::*;

/// Strategy for generating class names.
pub fn class_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Z][a-zA-Z0-9]{0,15}").expect("Invalid regex")
}

/// Strategy for generating storage keys of every kind.
pub fn storage_key_strategy() -> impl Strategy<Value = StorageKey> {
    prop_oneof![
        prop::array::uniform16(any::<u8>())
            .prop_map(|bytes| StorageKey::Guid(uuid::Uuid::from_bytes(bytes))),
        any::<i64>().prop_map(StorageKey::Integer),
        prop::string::string_regex("[a-z0-9]{1,12}")
            .expect("Invalid regex")
            .prop_map(StorageKey::Text),
    ]
}

/// Strategy for generating object ids.
pub fn object_id_strategy() -> impl Strategy<Value = ObjectId> {
    (class_name_strategy(), storage_key_strategy())
        .prop_map(|(class, key)| ObjectId::new(class, key))
}

/// Strategy for generating a non-null value of `value_type`.
pub fn value_strategy(value_type: ValueType) -> BoxedStrategy<Value> {
    match value_type {
        ValueType::Bool => any::<bool>().prop_map(Value::Bool).boxed(),
        ValueType::Integer => any::<i64>().prop_map(Value::Integer).boxed(),
        ValueType::Text => ".{0,24}".prop_map(Value::Text).boxed(),
        ValueType::Bytes => prop::collection::vec(any::<u8>(), 0..64)
            .prop_map(Value::Bytes)
            .boxed(),
        ValueType::Uuid => prop::array::uniform16(any::<u8>())
            .prop_map(|bytes| Value::Uuid(uuid::Uuid::from_bytes(bytes)))
            .boxed(),
        ValueType::ObjectId => object_id_strategy().prop_map(Value::ObjectId).boxed(),
    }
}

/// Strategy for generating any value, null included.
pub fn any_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        value_strategy(ValueType::Bool),
        value_strategy(ValueType::Integer),
        value_strategy(ValueType::Text),
        value_strategy(ValueType::Bytes),
        value_strategy(ValueType::Uuid),
        value_strategy(ValueType::ObjectId),
    ]
}

/// Independent state facets, used to build a [`DomainObjectState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct StateFlags {
    pub new: bool,
    pub changed: bool,
    pub deleted: bool,
    pub invalid: bool,
    pub not_loaded_yet: bool,
    pub new_in_hierarchy: bool,
    pub persistent_data_changed: bool,
    pub non_persistent_data_changed: bool,
    pub relation_changed: bool,
}

impl StateFlags {
    /// Builds the state with exactly these facets.
    pub fn build(self) -> DomainObjectState {
        let mut builder = DomainObjectState::builder();
        if self.new {
            builder = builder.set_new();
        }
        if self.changed {
            builder = builder.set_changed();
        }
        if self.deleted {
            builder = builder.set_deleted();
        }
        if self.invalid {
            builder = builder.set_invalid();
        }
        if self.not_loaded_yet {
            builder = builder.set_not_loaded_yet();
        }
        if self.new_in_hierarchy {
            builder = builder.set_new_in_hierarchy();
        }
        if self.persistent_data_changed {
            builder = builder.set_persistent_data_changed();
        }
        if self.non_persistent_data_changed {
            builder = builder.set_non_persistent_data_changed();
        }
        if self.relation_changed {
            builder = builder.set_relation_changed();
        }
        builder.build()
    }
}

/// Strategy for generating arbitrary facet combinations.
pub fn state_flags_strategy() -> impl Strategy<Value = StateFlags> {
    prop::array::uniform9(any::<bool>()).prop_map(|f| StateFlags {
        new: f[0],
        changed: f[1],
        deleted: f[2],
        invalid: f[3],
        not_loaded_yet: f[4],
        new_in_hierarchy: f[5],
        persistent_data_changed: f[6],
        non_persistent_data_changed: f[7],
        relation_changed: f[8],
    })
}

/// One edit applied to the sales fixture by property tests.
///
/// Indexes are taken modulo the number of candidates, so every generated
/// edit applies to some object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SalesEdit {
    /// Renames customer `customer`.
    RenameCustomer {
        /// Customer index.
        customer: usize,
        /// New name.
        name: String,
    },
    /// Changes the rating of customer `customer`.
    Rate {
        /// Customer index.
        customer: usize,
        /// New rating.
        rating: i64,
    },
    /// Moves order `order` to customer `customer`.
    MoveOrder {
        /// Order index.
        order: usize,
        /// Customer index.
        customer: usize,
    },
    /// Creates a new order for customer `customer`.
    NewOrder {
        /// Customer index.
        customer: usize,
        /// Order number of the new order.
        number: i64,
    },
    /// Sets the note of order `order`.
    Annotate {
        /// Order index.
        order: usize,
        /// New note, `None` for null.
        note: Option<String>,
    },
}

/// Strategy for generating a single sales edit.
pub fn sales_edit_strategy() -> impl Strategy<Value = SalesEdit> {
    prop_oneof![
        (0..8usize, "[A-Za-z ]{0,16}")
            .prop_map(|(customer, name)| SalesEdit::RenameCustomer { customer, name }),
        (0..8usize, -5i64..=5).prop_map(|(customer, rating)| SalesEdit::Rate { customer, rating }),
        (0..8usize, 0..8usize).prop_map(|(order, customer)| SalesEdit::MoveOrder { order, customer }),
        (0..8usize, 100i64..1000).prop_map(|(customer, number)| SalesEdit::NewOrder { customer, number }),
        (0..8usize, prop::option::of("[a-z ]{0,16}"))
            .prop_map(|(order, note)| SalesEdit::Annotate { order, note }),
    ]
}

/// Strategy for generating a sequence of sales edits.
pub fn sales_edits_strategy(max_len: usize) -> impl Strategy<Value = Vec<SalesEdit>> {
    prop::collection::vec(sales_edit_strategy(), 0..=max_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn values_fit_their_type(value in value_strategy(ValueType::Integer)) {
            prop_assert_eq!(value.value_type(), Some(ValueType::Integer));
        }

        #[test]
        fn state_flags_round_trip(flags in state_flags_strategy()) {
            let state = flags.build();
            prop_assert_eq!(state.is_new(), flags.new);
            prop_assert_eq!(state.is_deleted(), flags.deleted);
            prop_assert_eq!(state.is_relation_changed(), flags.relation_changed);
        }
    }
}
