//! Mapping construction.

use super::{
    Cardinality, ClassDefinition, MappingConfiguration, PropertyDefinition,
    RelationEndPointDefinition,
};
use crate::error::{CoreError, CoreResult};
use domobj_codec::ClassId;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Declares one class of a mapping.
#[derive(Debug, Clone)]
pub struct ClassBuilder {
    id: ClassId,
    base_class: Option<ClassId>,
    is_abstract: bool,
    properties: Vec<PropertyDefinition>,
}

impl ClassBuilder {
    /// Starts a class declaration.
    #[must_use]
    pub fn new(id: impl Into<ClassId>) -> Self {
        Self {
            id: id.into(),
            base_class: None,
            is_abstract: false,
            properties: Vec::new(),
        }
    }

    /// Sets the base class.
    #[must_use]
    pub fn base(mut self, base: impl Into<ClassId>) -> Self {
        self.base_class = Some(base.into());
        self
    }

    /// Marks the class abstract.
    #[must_use]
    pub fn abstract_class(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Adds a property.
    #[must_use]
    pub fn property(mut self, property: PropertyDefinition) -> Self {
        self.properties.push(property);
        self
    }
}

/// A bidirectional relation between two classes.
///
/// The virtual side holds no data; the real side owns a foreign-key
/// property named after its end-point.
#[derive(Debug, Clone)]
pub struct Relation {
    virtual_class: ClassId,
    virtual_property: String,
    virtual_cardinality: Cardinality,
    real_class: ClassId,
    real_property: String,
    mandatory: bool,
    read_only: bool,
}

impl Relation {
    /// A parent with a collection of children, each child holding a
    /// foreign key to its parent.
    #[must_use]
    pub fn one_to_many(
        parent: impl Into<ClassId>,
        collection_property: impl Into<String>,
        child: impl Into<ClassId>,
        foreign_key_property: impl Into<String>,
    ) -> Self {
        Self {
            virtual_class: parent.into(),
            virtual_property: collection_property.into(),
            virtual_cardinality: Cardinality::Many,
            real_class: child.into(),
            real_property: foreign_key_property.into(),
            mandatory: false,
            read_only: false,
        }
    }

    /// A one-to-one relation whose foreign key lives in `other`.
    #[must_use]
    pub fn one_to_one(
        owner: impl Into<ClassId>,
        virtual_property: impl Into<String>,
        other: impl Into<ClassId>,
        foreign_key_property: impl Into<String>,
    ) -> Self {
        Self {
            virtual_cardinality: Cardinality::One,
            ..Self::one_to_many(owner, virtual_property, other, foreign_key_property)
        }
    }

    /// Requires the foreign key to be set at commit time.
    #[must_use]
    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    /// Forbids changes through the virtual side.
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    fn end_points(&self) -> (RelationEndPointDefinition, RelationEndPointDefinition) {
        let virtual_end = RelationEndPointDefinition {
            class_id: self.virtual_class.clone(),
            property_name: self.virtual_property.clone(),
            cardinality: self.virtual_cardinality,
            is_virtual: true,
            is_mandatory: false,
            is_read_only: self.read_only,
            opposite_class_id: self.real_class.clone(),
            opposite_property_name: self.real_property.clone(),
        };
        let real_end = RelationEndPointDefinition {
            class_id: self.real_class.clone(),
            property_name: self.real_property.clone(),
            cardinality: Cardinality::One,
            is_virtual: false,
            is_mandatory: self.mandatory,
            is_read_only: false,
            opposite_class_id: self.virtual_class.clone(),
            opposite_property_name: self.virtual_property.clone(),
        };
        (virtual_end, real_end)
    }
}

/// Builds a [`MappingConfiguration`].
///
/// # Example
///
/// ```
/// use domobj_codec::ValueType;
/// use domobj_core::{ClassBuilder, MappingBuilder, PropertyDefinition};
///
/// let mapping = MappingBuilder::new()
///     .class(ClassBuilder::new("Customer")
///         .property(PropertyDefinition::new("Name", ValueType::Text)))
///     .class(ClassBuilder::new("Order"))
///     .one_to_many("Customer", "Orders", "Order", "Customer")
///     .build()
///     .unwrap();
/// assert!(mapping.property(&"Order".into(), "Customer").unwrap().is_foreign_key);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MappingBuilder {
    classes: Vec<ClassBuilder>,
    relations: Vec<Relation>,
}

impl MappingBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a class.
    #[must_use]
    pub fn class(mut self, class: ClassBuilder) -> Self {
        self.classes.push(class);
        self
    }

    /// Adds a relation.
    #[must_use]
    pub fn relation(mut self, relation: Relation) -> Self {
        self.relations.push(relation);
        self
    }

    /// Shorthand for [`Relation::one_to_many`].
    #[must_use]
    pub fn one_to_many(
        self,
        parent: impl Into<ClassId>,
        collection_property: impl Into<String>,
        child: impl Into<ClassId>,
        foreign_key_property: impl Into<String>,
    ) -> Self {
        self.relation(Relation::one_to_many(
            parent,
            collection_property,
            child,
            foreign_key_property,
        ))
    }

    /// Shorthand for [`Relation::one_to_one`].
    #[must_use]
    pub fn one_to_one(
        self,
        owner: impl Into<ClassId>,
        virtual_property: impl Into<String>,
        other: impl Into<ClassId>,
        foreign_key_property: impl Into<String>,
    ) -> Self {
        self.relation(Relation::one_to_one(
            owner,
            virtual_property,
            other,
            foreign_key_property,
        ))
    }

    /// Resolves inheritance and relations.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Mapping`] for duplicate classes or member names,
    /// unknown base or relation classes, and inheritance cycles.
    pub fn build(self) -> CoreResult<MappingConfiguration> {
        let mut declared: HashMap<ClassId, ClassBuilder> = HashMap::new();
        let mut own_end_points: HashMap<ClassId, Vec<RelationEndPointDefinition>> =
            HashMap::new();

        for class in self.classes {
            if declared.contains_key(&class.id) {
                return Err(CoreError::mapping(format!(
                    "class '{}' is declared twice",
                    class.id
                )));
            }
            declared.insert(class.id.clone(), class);
        }

        for relation in &self.relations {
            let (virtual_end, real_end) = relation.end_points();
            let real_class = declared.get_mut(&real_end.class_id).ok_or_else(|| {
                CoreError::mapping(format!(
                    "relation class '{}' is not declared",
                    real_end.class_id
                ))
            })?;
            real_class
                .properties
                .push(PropertyDefinition::foreign_key(&real_end.property_name));
            if !declared.contains_key(&virtual_end.class_id) {
                return Err(CoreError::mapping(format!(
                    "relation class '{}' is not declared",
                    virtual_end.class_id
                )));
            }
            own_end_points
                .entry(virtual_end.class_id.clone())
                .or_default()
                .push(virtual_end);
            own_end_points
                .entry(real_end.class_id.clone())
                .or_default()
                .push(real_end);
        }

        let mut chains: HashMap<ClassId, Vec<ClassId>> = HashMap::new();
        for id in declared.keys() {
            chains.insert(id.clone(), base_chain(&declared, id)?);
        }

        let mut classes = HashMap::new();
        for (id, class) in &declared {
            let chain = &chains[id];
            let mut properties = Vec::new();
            let mut end_points = Vec::new();
            let mut names = HashSet::new();
            for ancestor in chain {
                for property in &declared[ancestor].properties {
                    if !names.insert(property.name.clone()) {
                        return Err(CoreError::mapping(format!(
                            "class '{id}' declares member '{}' more than once",
                            property.name
                        )));
                    }
                    properties.push(property.clone());
                }
                for end_point in own_end_points.get(ancestor).into_iter().flatten() {
                    if end_point.is_virtual && !names.insert(end_point.property_name.clone()) {
                        return Err(CoreError::mapping(format!(
                            "class '{id}' declares member '{}' more than once",
                            end_point.property_name
                        )));
                    }
                    end_points.push(end_point.clone());
                }
            }

            let mut self_and_derived: Vec<ClassId> = chains
                .iter()
                .filter(|(_, chain)| chain.contains(id))
                .map(|(derived, _)| derived.clone())
                .collect();
            self_and_derived.sort();

            classes.insert(
                id.clone(),
                Arc::new(ClassDefinition {
                    id: id.clone(),
                    base_class: class.base_class.clone(),
                    is_abstract: class.is_abstract,
                    properties,
                    end_points,
                    self_and_derived,
                }),
            );
        }

        tracing::debug!(classes = classes.len(), "built mapping configuration");
        Ok(MappingConfiguration { classes })
    }
}

/// Returns the inheritance chain of a class, root base first.
fn base_chain(declared: &HashMap<ClassId, ClassBuilder>, id: &ClassId) -> CoreResult<Vec<ClassId>> {
    let mut chain = vec![id.clone()];
    let mut current = &declared[id];
    while let Some(base) = &current.base_class {
        if chain.contains(base) {
            return Err(CoreError::mapping(format!(
                "class '{id}' has a cyclic inheritance chain"
            )));
        }
        current = declared.get(base).ok_or_else(|| {
            CoreError::mapping(format!("base class '{base}' of '{id}' is not declared"))
        })?;
        chain.push(base.clone());
    }
    chain.reverse();
    Ok(chain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use domobj_codec::ValueType;

    fn company_mapping() -> MappingConfiguration {
        MappingBuilder::new()
            .class(
                ClassBuilder::new("Company")
                    .abstract_class()
                    .property(PropertyDefinition::new("Name", ValueType::Text)),
            )
            .class(
                ClassBuilder::new("Customer")
                    .base("Company")
                    .property(PropertyDefinition::new("Since", ValueType::Integer)),
            )
            .class(ClassBuilder::new("Ceo"))
            .relation(Relation::one_to_one("Company", "Ceo", "Ceo", "Company").mandatory())
            .build()
            .unwrap()
    }

    #[test]
    fn derived_classes_inherit_members() {
        let mapping = company_mapping();
        let customer = mapping.class(&"Customer".into()).unwrap();
        let names: Vec<_> = customer.properties().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Name", "Since"]);
        assert!(customer.end_point("Ceo").is_some());
        assert!(!customer.is_abstract());
    }

    #[test]
    fn family_and_base_checks() {
        let mapping = company_mapping();
        assert!(mapping.is_same_or_base_of(&"Company".into(), &"Customer".into()));
        assert!(mapping.is_same_or_base_of(&"Customer".into(), &"Customer".into()));
        assert!(!mapping.is_same_or_base_of(&"Customer".into(), &"Company".into()));
        assert_eq!(
            mapping.class(&"Company".into()).unwrap().self_and_derived(),
            &[ClassId::new("Company"), ClassId::new("Customer")]
        );
    }

    #[test]
    fn mandatory_flag_lands_on_real_side() {
        let mapping = company_mapping();
        let real = mapping.end_point(&"Ceo".into(), "Company").unwrap();
        assert!(real.is_mandatory);
        assert!(!mapping.opposite_end_point(real).unwrap().is_mandatory);
    }

    #[test]
    fn rejects_unknown_base_and_cycles() {
        let unknown = MappingBuilder::new()
            .class(ClassBuilder::new("A").base("Missing"))
            .build();
        assert!(matches!(unknown, Err(CoreError::Mapping { .. })));

        let cyclic = MappingBuilder::new()
            .class(ClassBuilder::new("A").base("B"))
            .class(ClassBuilder::new("B").base("A"))
            .build();
        assert!(matches!(cyclic, Err(CoreError::Mapping { .. })));
    }

    #[test]
    fn rejects_duplicate_members() {
        let result = MappingBuilder::new()
            .class(
                ClassBuilder::new("A")
                    .property(PropertyDefinition::new("X", ValueType::Text))
                    .property(PropertyDefinition::new("X", ValueType::Text)),
            )
            .build();
        assert!(matches!(result, Err(CoreError::Mapping { .. })));
    }
}
