//! Relation commands and their bidirectional expansion.

use super::{RelationEndPointId, VirtualEndPoint};
use crate::data_manager::DataStore;
use crate::error::{CoreError, CoreResult};
use crate::mapping::{MappingConfiguration, RelationEndPointDefinition};
use crate::types::ValueAccess;
use domobj_codec::{ObjectId, Value};
use std::collections::HashSet;

/// A relation change requested on one end-point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationEndPointCommand {
    /// Set a one-valued end-point (real or virtual).
    Set {
        /// The end-point to change.
        end_point: RelationEndPointId,
        /// The new related object.
        related: Option<ObjectId>,
    },
    /// Insert an object into a collection end-point.
    Insert {
        /// The collection end-point.
        end_point: RelationEndPointId,
        /// The object to add.
        object: ObjectId,
        /// Insertion index; `None` appends.
        index: Option<usize>,
    },
    /// Remove an object from a collection end-point.
    Remove {
        /// The collection end-point.
        end_point: RelationEndPointId,
        /// The object to remove.
        object: ObjectId,
    },
    /// Replace the items of a collection end-point.
    Replace {
        /// The collection end-point.
        end_point: RelationEndPointId,
        /// The new items, in order.
        objects: Vec<ObjectId>,
    },
    /// Remove a deleted object from every relation it takes part in.
    Delete {
        /// The object being deleted.
        object: ObjectId,
    },
}

/// A single end-point mutation produced by expanding a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationModification {
    /// Change a foreign-key property.
    SetForeignKey {
        /// The real end-point.
        end_point: RelationEndPointId,
        /// Expected current value.
        old: Option<ObjectId>,
        /// New value.
        new: Option<ObjectId>,
    },
    /// Change a virtual object end-point.
    SetVirtualObject {
        /// The virtual end-point.
        end_point: RelationEndPointId,
        /// Expected current value.
        old: Option<ObjectId>,
        /// New value.
        new: Option<ObjectId>,
    },
    /// Insert into a collection.
    CollectionInsert {
        /// The collection end-point.
        end_point: RelationEndPointId,
        /// The inserted object.
        object: ObjectId,
        /// Insertion index; `None` appends.
        index: Option<usize>,
    },
    /// Remove from a collection.
    CollectionRemove {
        /// The collection end-point.
        end_point: RelationEndPointId,
        /// The removed object.
        object: ObjectId,
    },
    /// Replace all items of a collection.
    CollectionReplace {
        /// The collection end-point.
        end_point: RelationEndPointId,
        /// Expected current items.
        old: Vec<ObjectId>,
        /// New items.
        new: Vec<ObjectId>,
    },
}

impl RelationModification {
    /// Returns the end-point this modification applies to.
    #[must_use]
    pub fn end_point(&self) -> &RelationEndPointId {
        match self {
            Self::SetForeignKey { end_point, .. }
            | Self::SetVirtualObject { end_point, .. }
            | Self::CollectionInsert { end_point, .. }
            | Self::CollectionRemove { end_point, .. }
            | Self::CollectionReplace { end_point, .. } => end_point,
        }
    }

    /// Returns the `(old, new)` related-object pairs reported to relation
    /// events for this modification.
    #[must_use]
    pub fn changes(&self) -> Vec<(Option<ObjectId>, Option<ObjectId>)> {
        match self {
            Self::SetForeignKey { old, new, .. } | Self::SetVirtualObject { old, new, .. } => {
                vec![(old.clone(), new.clone())]
            }
            Self::CollectionInsert { object, .. } => vec![(None, Some(object.clone()))],
            Self::CollectionRemove { object, .. } => vec![(Some(object.clone()), None)],
            Self::CollectionReplace { old, new, .. } => {
                let removed = old
                    .iter()
                    .filter(|id| !new.contains(id))
                    .map(|id| (Some(id.clone()), None));
                let added = new
                    .iter()
                    .filter(|id| !old.contains(id))
                    .map(|id| (None, Some(id.clone())));
                removed.chain(added).collect()
            }
        }
    }

    fn set(
        definition: &RelationEndPointDefinition,
        end_point: RelationEndPointId,
        old: Option<ObjectId>,
        new: Option<ObjectId>,
    ) -> Self {
        if definition.is_virtual {
            Self::SetVirtualObject { end_point, old, new }
        } else {
            Self::SetForeignKey { end_point, old, new }
        }
    }

    fn validate(&self, store: &DataStore) -> CoreResult<()> {
        let stale = || {
            CoreError::invalid_operation(format!(
                "relation data of '{}' changed while the command was prepared",
                self.end_point()
            ))
        };
        match self {
            Self::SetForeignKey { end_point, old, .. } => {
                let container = store
                    .containers
                    .get(end_point.object_id())
                    .ok_or_else(stale)?;
                let current = container.foreign_key(end_point.property_name(), ValueAccess::Current);
                if &current != old {
                    return Err(stale());
                }
            }
            Self::SetVirtualObject { end_point, old, .. } => match store.end_points.get(end_point) {
                Some(VirtualEndPoint::Object(ep)) if ep.current() == old.as_ref() => {}
                _ => return Err(stale()),
            },
            Self::CollectionInsert {
                end_point,
                object,
                index,
            } => match store.end_points.get(end_point) {
                Some(VirtualEndPoint::Collection(ep)) => {
                    if ep.contains(object) {
                        return Err(CoreError::invalid_argument(format!(
                            "object '{object}' is already part of the collection '{end_point}'"
                        )));
                    }
                    if index.is_some_and(|i| i > ep.len()) {
                        return Err(CoreError::invalid_argument(format!(
                            "index is out of range for the collection '{end_point}'"
                        )));
                    }
                }
                _ => return Err(stale()),
            },
            Self::CollectionRemove { end_point, object } => match store.end_points.get(end_point) {
                Some(VirtualEndPoint::Collection(ep)) if ep.contains(object) => {}
                Some(VirtualEndPoint::Collection(_)) => {
                    return Err(CoreError::invalid_argument(format!(
                        "object '{object}' is not part of the collection '{end_point}'"
                    )));
                }
                _ => return Err(stale()),
            },
            Self::CollectionReplace { end_point, old, .. } => match store.end_points.get(end_point) {
                Some(VirtualEndPoint::Collection(ep)) if ep.current() == old.as_slice() => {}
                _ => return Err(stale()),
            },
        }
        Ok(())
    }

    fn apply(&self, store: &mut DataStore) -> CoreResult<()> {
        match self {
            Self::SetForeignKey { end_point, new, .. } => {
                let container = store
                    .containers
                    .get_mut(end_point.object_id())
                    .ok_or_else(|| missing(end_point))?;
                container.set_value(end_point.property_name(), Value::from_optional_id(new.clone()))?;
            }
            Self::SetVirtualObject { end_point, new, .. } => {
                if let Some(VirtualEndPoint::Object(ep)) = store.end_points.get_mut(end_point) {
                    ep.set(new.clone());
                }
            }
            Self::CollectionInsert {
                end_point,
                object,
                index,
            } => {
                if let Some(VirtualEndPoint::Collection(ep)) = store.end_points.get_mut(end_point) {
                    ep.insert(*index, object.clone())?;
                }
            }
            Self::CollectionRemove { end_point, object } => {
                if let Some(VirtualEndPoint::Collection(ep)) = store.end_points.get_mut(end_point) {
                    ep.remove(object)?;
                }
            }
            Self::CollectionReplace { end_point, new, .. } => {
                if let Some(VirtualEndPoint::Collection(ep)) = store.end_points.get_mut(end_point) {
                    ep.replace(new.clone());
                }
            }
        }
        Ok(())
    }
}

fn missing(end_point: &RelationEndPointId) -> CoreError {
    CoreError::invalid_operation(format!("end-point '{end_point}' is not loaded"))
}

/// Data that must be loaded before a command can be expanded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MissingData {
    Container(ObjectId),
    EndPoint(RelationEndPointId),
}

/// Why an expansion did not produce a command.
#[derive(Debug)]
pub(crate) enum ExpandError {
    /// Retry after loading the named data.
    Missing(MissingData),
    /// The command is not acceptable.
    Failed(CoreError),
}

impl From<CoreError> for ExpandError {
    fn from(error: CoreError) -> Self {
        Self::Failed(error)
    }
}

/// The complete set of end-point mutations of one relation change.
///
/// Both sides of every affected relation are part of the set; `perform`
/// validates all of them before applying any, so a command either changes
/// every end-point or none.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpandedCommand {
    modifications: Vec<RelationModification>,
}

impl ExpandedCommand {
    /// Returns the modifications in execution order.
    #[must_use]
    pub fn modifications(&self) -> &[RelationModification] {
        &self.modifications
    }

    /// Returns `true` if the command changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modifications.is_empty()
    }

    /// Validates and applies every modification.
    pub(crate) fn perform(&self, store: &mut DataStore) -> CoreResult<()> {
        for modification in &self.modifications {
            modification.validate(store)?;
        }
        for modification in &self.modifications {
            modification.apply(store)?;
        }
        Ok(())
    }
}

impl RelationEndPointCommand {
    /// Expands the command into the mutations of every affected end-point.
    pub(crate) fn expand_to_all_related_objects(
        &self,
        store: &DataStore,
        mapping: &MappingConfiguration,
    ) -> Result<ExpandedCommand, ExpandError> {
        let modifications = match self {
            Self::Set { end_point, related } => {
                let definition = one_valued(mapping, end_point)?;
                expand_set(store, mapping, end_point, definition, related.clone())?
            }
            Self::Insert {
                end_point,
                object,
                index,
            } => {
                let definition = collection_valued(mapping, end_point)?;
                let collection = store.collection(end_point)?;
                if collection.contains(object) {
                    return Err(CoreError::invalid_argument(format!(
                        "object '{object}' is already part of the collection '{end_point}'"
                    ))
                    .into());
                }
                if index.is_some_and(|i| i > collection.len()) {
                    return Err(CoreError::invalid_argument(format!(
                        "index is out of range for the collection '{end_point}'"
                    ))
                    .into());
                }
                let mut modifications = vec![RelationModification::CollectionInsert {
                    end_point: end_point.clone(),
                    object: object.clone(),
                    index: *index,
                }];
                adopt(store, mapping, end_point, definition, object, &mut modifications)?;
                modifications
            }
            Self::Remove { end_point, object } => {
                let definition = collection_valued(mapping, end_point)?;
                if !store.collection(end_point)?.contains(object) {
                    return Err(CoreError::invalid_argument(format!(
                        "object '{object}' is not part of the collection '{end_point}'"
                    ))
                    .into());
                }
                let opposite = mapping.opposite_end_point(definition)?;
                store.container(object)?;
                vec![
                    RelationModification::CollectionRemove {
                        end_point: end_point.clone(),
                        object: object.clone(),
                    },
                    RelationModification::SetForeignKey {
                        end_point: RelationEndPointId::new(
                            object.clone(),
                            &opposite.property_name,
                        ),
                        old: Some(end_point.object_id().clone()),
                        new: None,
                    },
                ]
            }
            Self::Replace { end_point, objects } => {
                let definition = collection_valued(mapping, end_point)?;
                let mut seen = HashSet::new();
                if let Some(duplicate) = objects.iter().find(|id| !seen.insert(*id)) {
                    return Err(CoreError::invalid_argument(format!(
                        "object '{duplicate}' appears more than once in the new items of '{end_point}'"
                    ))
                    .into());
                }
                let old = store.collection(end_point)?.current().to_vec();
                if &old == objects {
                    return Ok(ExpandedCommand::default());
                }
                let opposite = mapping.opposite_end_point(definition)?;
                let mut modifications = vec![RelationModification::CollectionReplace {
                    end_point: end_point.clone(),
                    old: old.clone(),
                    new: objects.clone(),
                }];
                for removed in old.iter().filter(|id| !objects.contains(id)) {
                    store.container(removed)?;
                    modifications.push(RelationModification::SetForeignKey {
                        end_point: RelationEndPointId::new(
                            removed.clone(),
                            &opposite.property_name,
                        ),
                        old: Some(end_point.object_id().clone()),
                        new: None,
                    });
                }
                for added in objects.iter().filter(|id| !old.contains(id)) {
                    adopt(store, mapping, end_point, definition, added, &mut modifications)?;
                }
                modifications
            }
            Self::Delete { object } => expand_delete(store, mapping, object)?,
        };
        Ok(ExpandedCommand { modifications })
    }
}

fn definition_of<'m>(
    mapping: &'m MappingConfiguration,
    end_point: &RelationEndPointId,
) -> CoreResult<&'m RelationEndPointDefinition> {
    mapping.end_point(end_point.object_id().class_id(), end_point.property_name())
}

fn one_valued<'m>(
    mapping: &'m MappingConfiguration,
    end_point: &RelationEndPointId,
) -> CoreResult<&'m RelationEndPointDefinition> {
    let definition = definition_of(mapping, end_point)?;
    if definition.is_collection() {
        return Err(CoreError::invalid_argument(format!(
            "'{end_point}' is a collection end-point"
        )));
    }
    Ok(definition)
}

fn collection_valued<'m>(
    mapping: &'m MappingConfiguration,
    end_point: &RelationEndPointId,
) -> CoreResult<&'m RelationEndPointDefinition> {
    let definition = definition_of(mapping, end_point)?;
    if !definition.is_collection() {
        return Err(CoreError::invalid_argument(format!(
            "'{end_point}' is not a collection end-point"
        )));
    }
    Ok(definition)
}

/// Sets a one-valued end-point and keeps up to three other end-points
/// consistent: the old related object's, the new related object's and
/// the end-point previously related to the new object.
fn expand_set(
    store: &DataStore,
    mapping: &MappingConfiguration,
    end_point: &RelationEndPointId,
    definition: &RelationEndPointDefinition,
    related: Option<ObjectId>,
) -> Result<Vec<RelationModification>, ExpandError> {
    let owner = end_point.object_id();
    let old = store.current_one(end_point, definition)?;
    if old == related {
        return Ok(Vec::new());
    }
    let opposite = mapping.opposite_end_point(definition)?;
    let mut modifications = vec![RelationModification::set(
        definition,
        end_point.clone(),
        old.clone(),
        related.clone(),
    )];

    if let Some(old) = old {
        let old_end_point = RelationEndPointId::new(old, &opposite.property_name);
        if opposite.is_collection() {
            store.collection(&old_end_point)?;
            modifications.push(RelationModification::CollectionRemove {
                end_point: old_end_point,
                object: owner.clone(),
            });
        } else {
            store.current_one(&old_end_point, opposite)?;
            modifications.push(RelationModification::set(
                opposite,
                old_end_point,
                Some(owner.clone()),
                None,
            ));
        }
    }

    if let Some(new) = related {
        let new_end_point = RelationEndPointId::new(new.clone(), &opposite.property_name);
        if opposite.is_collection() {
            store.collection(&new_end_point)?;
            modifications.push(RelationModification::CollectionInsert {
                end_point: new_end_point,
                object: owner.clone(),
                index: None,
            });
        } else {
            let previous = store.current_one(&new_end_point, opposite)?;
            modifications.push(RelationModification::set(
                opposite,
                new_end_point,
                previous.clone(),
                Some(owner.clone()),
            ));
            if let Some(previous) = previous {
                let previous_end_point =
                    RelationEndPointId::new(previous, &definition.property_name);
                store.current_one(&previous_end_point, definition)?;
                modifications.push(RelationModification::set(
                    definition,
                    previous_end_point,
                    Some(new),
                    None,
                ));
            }
        }
    }
    Ok(modifications)
}

/// Points `item`'s foreign key at the owner of `collection` and removes the
/// item from the collection of its previous owner.
fn adopt(
    store: &DataStore,
    mapping: &MappingConfiguration,
    collection: &RelationEndPointId,
    definition: &RelationEndPointDefinition,
    item: &ObjectId,
    modifications: &mut Vec<RelationModification>,
) -> Result<(), ExpandError> {
    let opposite = mapping.opposite_end_point(definition)?;
    let item_end_point = RelationEndPointId::new(item.clone(), &opposite.property_name);
    let previous = store.current_one(&item_end_point, opposite)?;
    let owner = collection.object_id();
    modifications.push(RelationModification::SetForeignKey {
        end_point: item_end_point,
        old: previous.clone(),
        new: Some(owner.clone()),
    });
    if let Some(previous) = previous.filter(|previous| previous != owner) {
        let previous_collection = RelationEndPointId::new(previous, &definition.property_name);
        store.collection(&previous_collection)?;
        modifications.push(RelationModification::CollectionRemove {
            end_point: previous_collection,
            object: item.clone(),
        });
    }
    Ok(())
}

fn expand_delete(
    store: &DataStore,
    mapping: &MappingConfiguration,
    object: &ObjectId,
) -> Result<Vec<RelationModification>, ExpandError> {
    let class = std::sync::Arc::clone(store.container(object)?.class());
    let mut modifications = Vec::new();
    for definition in class.end_points() {
        let end_point = RelationEndPointId::new(object.clone(), &definition.property_name);
        let opposite = mapping.opposite_end_point(definition)?;
        if definition.is_collection() {
            let items = store.collection(&end_point)?.current().to_vec();
            if items.is_empty() {
                continue;
            }
            modifications.push(RelationModification::CollectionReplace {
                end_point,
                old: items.clone(),
                new: Vec::new(),
            });
            for item in items {
                store.container(&item)?;
                modifications.push(RelationModification::SetForeignKey {
                    end_point: RelationEndPointId::new(item, &opposite.property_name),
                    old: Some(object.clone()),
                    new: None,
                });
            }
        } else if let Some(related) = store.current_one(&end_point, definition)? {
            if &related == object {
                continue;
            }
            let related_end_point = RelationEndPointId::new(related.clone(), &opposite.property_name);
            modifications.push(RelationModification::set(
                definition,
                end_point,
                Some(related),
                None,
            ));
            if opposite.is_collection() {
                store.collection(&related_end_point)?;
                modifications.push(RelationModification::CollectionRemove {
                    end_point: related_end_point,
                    object: object.clone(),
                });
            } else {
                store.current_one(&related_end_point, opposite)?;
                modifications.push(RelationModification::set(
                    opposite,
                    related_end_point,
                    Some(object.clone()),
                    None,
                ));
            }
        }
    }
    Ok(modifications)
}
