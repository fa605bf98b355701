//! Entity type descriptors and the process-wide descriptor registry.
//!
//! Each entity type is described once by an [`EntityDescriptor`]: its registry
//! key, collection name, declared attributes and declared relations. The
//! descriptor is immutable metadata, never per-query state. Registered
//! descriptors are shared process-wide through a read-mostly map so relation
//! targets can be resolved by key.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use bson::Bson;
use once_cell::sync::Lazy;

/// Declared type of an entity attribute.
///
/// `Bson::Null` is accepted by every type; it is the explicit "absent" value
/// a materialized record carries for fields missing from the stored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeType {
    /// Any value.
    Any,
    /// UTF-8 string.
    String,
    /// 32- or 64-bit integer.
    Int,
    /// Floating point; integers are accepted and widen.
    Double,
    /// Boolean.
    Bool,
    /// Store timestamp.
    DateTime,
    /// Store object identity.
    ObjectId,
    /// Array of values.
    Array,
    /// Embedded document.
    Document,
}

impl AttributeType {
    /// Returns true when `value` is storable under this declared type.
    pub fn accepts(&self, value: &Bson) -> bool {
        if matches!(value, Bson::Null) {
            return true;
        }
        match self {
            AttributeType::Any => true,
            AttributeType::String => matches!(value, Bson::String(_)),
            AttributeType::Int => matches!(value, Bson::Int32(_) | Bson::Int64(_)),
            AttributeType::Double => {
                matches!(value, Bson::Double(_) | Bson::Int32(_) | Bson::Int64(_))
            }
            AttributeType::Bool => matches!(value, Bson::Boolean(_)),
            AttributeType::DateTime => matches!(value, Bson::DateTime(_)),
            AttributeType::ObjectId => matches!(value, Bson::ObjectId(_)),
            AttributeType::Array => matches!(value, Bson::Array(_)),
            AttributeType::Document => matches!(value, Bson::Document(_)),
        }
    }
}

/// Kind of a declared relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// This record's foreign field points at the target's identity.
    BelongsTo,
    /// One target record's foreign field points at this record's identity.
    HasOne,
    /// Many target records' foreign fields point at this record's identity.
    HasMany,
    /// Existence probe: does any target record point at this record.
    HasRelationWith,
}

/// A declared, lazily-resolved association between two entity types.
#[derive(Debug, Clone)]
pub struct RelationDef {
    /// Relation name, a namespace disjoint from attribute names.
    pub name: String,
    /// Resolution algorithm.
    pub kind: RelationKind,
    /// Registry key of the target entity type.
    pub target: String,
    /// Foreign field name; on this record for `BelongsTo`, on the target
    /// otherwise.
    pub foreign_field: String,
}

/// Immutable metadata describing one entity type.
///
/// Built via [`EntityDescriptor::builder`], registered once with
/// [`register`], shared behind an `Arc` by every record instance of the
/// type.
#[derive(Debug)]
pub struct EntityDescriptor {
    key: String,
    collection: String,
    attributes: Vec<(String, AttributeType)>,
    relations: Vec<RelationDef>,
}

impl EntityDescriptor {
    /// Starts a descriptor for the entity type `key`, stored in `collection`.
    pub fn builder(key: impl Into<String>, collection: impl Into<String>) -> EntityDescriptorBuilder {
        EntityDescriptorBuilder {
            descriptor: EntityDescriptor {
                key: key.into(),
                collection: collection.into(),
                attributes: Vec::new(),
                relations: Vec::new(),
            },
        }
    }

    /// The registry key of this entity type.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The collection this entity type is stored in.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Declared attribute names, in declaration order.
    pub fn attribute_names(&self) -> Vec<String> {
        self.attributes.iter().map(|(name, _)| name.clone()).collect()
    }

    /// Declared attributes with their types, in declaration order.
    pub fn attributes(&self) -> &[(String, AttributeType)] {
        &self.attributes
    }

    /// Returns the declared type of `name`, if declared.
    pub fn attribute_type(&self, name: &str) -> Option<AttributeType> {
        self.attributes
            .iter()
            .find(|(declared, _)| declared == name)
            .map(|(_, kind)| *kind)
    }

    /// Returns true when `name` is a declared attribute.
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute_type(name).is_some()
    }

    /// Returns the declared relation `name`, if declared.
    pub fn relation(&self, name: &str) -> Option<&RelationDef> {
        self.relations.iter().find(|relation| relation.name == name)
    }

    /// Declared relations, in declaration order.
    pub fn relations(&self) -> &[RelationDef] {
        &self.relations
    }
}

/// Fluent builder for [`EntityDescriptor`].
#[derive(Debug)]
pub struct EntityDescriptorBuilder {
    descriptor: EntityDescriptor,
}

impl EntityDescriptorBuilder {
    /// Declares an attribute. Redeclaring a name overwrites its type.
    pub fn attribute(mut self, name: impl Into<String>, kind: AttributeType) -> Self {
        let name = name.into();
        if let Some(entry) = self
            .descriptor
            .attributes
            .iter_mut()
            .find(|(declared, _)| *declared == name)
        {
            entry.1 = kind;
        } else {
            self.descriptor.attributes.push((name, kind));
        }
        self
    }

    /// Declares a relation to the entity type registered under `target`.
    pub fn relation(
        mut self,
        name: impl Into<String>,
        kind: RelationKind,
        target: impl Into<String>,
        foreign_field: impl Into<String>,
    ) -> Self {
        self.descriptor.relations.push(RelationDef {
            name: name.into(),
            kind,
            target: target.into(),
            foreign_field: foreign_field.into(),
        });
        self
    }

    /// Finalizes the descriptor.
    pub fn build(self) -> Arc<EntityDescriptor> {
        Arc::new(self.descriptor)
    }
}

static REGISTRY: Lazy<RwLock<HashMap<String, Arc<EntityDescriptor>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Registers a descriptor under its key, replacing any previous registration.
pub fn register(descriptor: Arc<EntityDescriptor>) {
    let mut registry = REGISTRY
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    registry.insert(descriptor.key().to_string(), descriptor);
}

/// Looks up the descriptor registered under `key`.
pub fn lookup(key: &str) -> Option<Arc<EntityDescriptor>> {
    let registry = REGISTRY
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    registry.get(key).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::oid::ObjectId;

    #[test]
    fn attribute_types_accept_matching_values() {
        assert!(AttributeType::String.accepts(&Bson::String("x".to_string())));
        assert!(!AttributeType::String.accepts(&Bson::Int32(1)));
        assert!(AttributeType::Int.accepts(&Bson::Int64(1)));
        assert!(AttributeType::Double.accepts(&Bson::Int32(1)));
        assert!(!AttributeType::Int.accepts(&Bson::Double(1.0)));
        assert!(AttributeType::ObjectId.accepts(&Bson::ObjectId(ObjectId::new())));
        assert!(AttributeType::Any.accepts(&Bson::Boolean(true)));
    }

    #[test]
    fn null_is_accepted_by_every_type() {
        for kind in [
            AttributeType::Any,
            AttributeType::String,
            AttributeType::Int,
            AttributeType::DateTime,
            AttributeType::Document,
        ] {
            assert!(kind.accepts(&Bson::Null));
        }
    }

    #[test]
    fn builder_keeps_declaration_order_and_overwrites_redeclared_types() {
        let descriptor = EntityDescriptor::builder("call", "calls")
            .attribute("call_id", AttributeType::String)
            .attribute("duration", AttributeType::Int)
            .attribute("call_id", AttributeType::Int)
            .build();
        assert_eq!(descriptor.attribute_names(), ["call_id", "duration"]);
        assert_eq!(descriptor.attribute_type("call_id"), Some(AttributeType::Int));
        assert!(!descriptor.has_attribute("ghost"));
    }

    #[test]
    fn registry_round_trip() {
        let descriptor = EntityDescriptor::builder("schema-test-place", "places")
            .attribute("name", AttributeType::String)
            .relation("calls", RelationKind::HasMany, "schema-test-call", "place_id")
            .build();
        register(descriptor.clone());

        let found = lookup("schema-test-place").expect("descriptor registered");
        assert_eq!(found.collection(), "places");
        let relation = found.relation("calls").expect("relation declared");
        assert_eq!(relation.kind, RelationKind::HasMany);
        assert_eq!(relation.foreign_field, "place_id");
        assert!(lookup("schema-test-missing").is_none());
    }
}
