//! Record lifecycle engine.
//!
//! A [`Record`] maps one entity instance onto a stored document. It owns an
//! explicit `New`/`Persisted`/`Deleted` lifecycle, a typed attribute bag
//! checked against the entity's [`EntityDescriptor`], an optional
//! instance-scoped [`Criteria`], a lazily-populated relation cache, and a
//! subscriber list of [`RecordHooks`] fired at lifecycle transitions.
//!
//! Only this layer performs I/O; criteria and aggregation construction are
//! pure. Each operation issues at most one or two sequential round-trips
//! through the bound [`CollectionHandle`].

use std::collections::HashMap;
use std::sync::Arc;

use bson::oid::ObjectId;
use bson::{Bson, Document};

use crate::{
    aggregation::Aggregation,
    criteria::{Criteria, CriteriaSpec, FieldList, OrderField},
    driver::{CollectionHandle, RemoveOptions, WriteAck, WriteOptions},
    error::{RecordStoreError, RecordStoreResult},
    schema::{EntityDescriptor, RelationKind},
};

/// Lifecycle state of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// Constructed in memory, never written; the identity is unset.
    New,
    /// Backed by a stored document with a stable identity.
    Persisted,
    /// Logically destroyed; further save/update/delete calls are errors.
    Deleted,
}

/// Result of resolving a declared relation.
#[derive(Debug, Clone)]
pub enum Related {
    /// `BelongsTo` / `HasOne`: at most one target record.
    One(Option<Box<Record>>),
    /// `HasMany`: every matching target record.
    Many(Vec<Record>),
    /// `HasRelationWith`: whether at least one target document points back.
    Exists(bool),
}

/// An ad-hoc query argument accepted by the find/count/delete family.
///
/// Operations resolve their filter three ways: a full criteria, a non-empty
/// partial specification, or nothing at all.
#[derive(Debug, Clone)]
pub enum QueryArg {
    /// A complete criteria used as-is (or merged, where merging is requested).
    Criteria(Criteria),
    /// A partial specification; an empty one counts as "no query".
    Spec(CriteriaSpec),
}

impl From<Criteria> for QueryArg {
    fn from(criteria: Criteria) -> Self {
        QueryArg::Criteria(criteria)
    }
}

impl From<CriteriaSpec> for QueryArg {
    fn from(spec: CriteriaSpec) -> Self {
        QueryArg::Spec(spec)
    }
}

/// Lifecycle transition subscribers.
///
/// Subscribers are walked in registration order. The `before_save` and
/// `before_delete` hooks may veto the operation by returning `false`; the
/// vetoed operation returns `Ok(false)` without side effects. The remaining
/// hooks are fire-and-forget notifications.
pub trait RecordHooks: Send + Sync + std::fmt::Debug {
    /// Runs before an insert or update writes. `false` vetoes the write.
    fn before_save(&self, _record: &Record) -> bool {
        true
    }

    /// Runs after a successful insert or update.
    fn after_save(&self, _record: &Record) {}

    /// Runs before a delete removes documents. `false` vetoes the removal.
    fn before_delete(&self, _record: &Record) -> bool {
        true
    }

    /// Runs after a successful delete.
    fn after_delete(&self, _record: &Record) {}

    /// Runs before a finder executes.
    fn before_find(&self, _record: &Record) {}

    /// Runs on each record materialized by a finder.
    fn after_find(&self, _record: &Record) {}

    /// Runs once when a record instance is constructed in memory.
    fn after_construct(&self, _record: &Record) {}
}

/// Coerces a raw value into a store identity.
///
/// Object identities pass through; strings must parse as an identity in hex
/// form and fail with `InvalidArgument` otherwise; any other scalar passes
/// through untouched.
pub fn identity_from(value: Bson) -> RecordStoreResult<Bson> {
    match value {
        Bson::ObjectId(_) => Ok(value),
        Bson::String(text) => ObjectId::parse_str(&text).map(Bson::ObjectId).map_err(|err| {
            RecordStoreError::InvalidArgument(format!(
                "'{text}' cannot be coerced into an identity: {err}"
            ))
        }),
        other => Ok(other),
    }
}

/// The string form of an identity, as used by string-keyed relation joins.
fn identity_string(value: &Bson) -> String {
    match value {
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// One entity instance bound to a named collection.
#[derive(Debug, Clone)]
pub struct Record {
    descriptor: Arc<EntityDescriptor>,
    collection: CollectionHandle,
    state: RecordState,
    id: Option<Bson>,
    attributes: Document,
    criteria: Option<Criteria>,
    relation_cache: HashMap<String, Related>,
    hooks: Vec<Arc<dyn RecordHooks>>,
    safe: bool,
    fsync: bool,
}

impl Record {
    /// Default format for [`string_date`](Record::string_date).
    pub const DATE_FORMAT: &'static str = "%d/%m/%Y %H:%M:%S";

    /// Constructs a fresh, unsaved record of the described entity type.
    pub fn new(descriptor: Arc<EntityDescriptor>, collection: CollectionHandle) -> Self {
        Self {
            descriptor,
            collection,
            state: RecordState::New,
            id: None,
            attributes: Document::new(),
            criteria: None,
            relation_cache: HashMap::new(),
            hooks: Vec::new(),
            safe: true,
            fsync: true,
        }
    }

    /// Installs the hook subscribers and fires their `after_construct`.
    pub fn with_hooks(mut self, hooks: Vec<Arc<dyn RecordHooks>>) -> Self {
        self.hooks = hooks;
        for hook in &self.hooks {
            hook.after_construct(&self);
        }
        self
    }

    /// The entity descriptor this record is typed by.
    pub fn descriptor(&self) -> &Arc<EntityDescriptor> {
        &self.descriptor
    }

    /// The collection handle this record executes against.
    pub fn collection(&self) -> &CollectionHandle {
        &self.collection
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RecordState {
        self.state
    }

    /// Whether the record has never been written.
    pub fn is_new(&self) -> bool {
        self.state == RecordState::New
    }

    /// The store-assigned identity, unset until the first successful insert.
    pub fn id(&self) -> Option<&Bson> {
        self.id.as_ref()
    }

    /// The identity in string form, empty while unset.
    pub fn primary_key(&self) -> String {
        self.id.as_ref().map(identity_string).unwrap_or_default()
    }

    /// Whether writes wait for store acknowledgement. Defaults to on.
    pub fn set_safe(&mut self, safe: bool) -> &mut Self {
        self.safe = safe;
        self
    }

    /// Whether writes force a flush to disk. Defaults to on.
    pub fn set_fsync(&mut self, fsync: bool) -> &mut Self {
        self.fsync = fsync;
        self
    }

    /// Reads a declared attribute; unset attributes read as `Bson::Null`.
    ///
    /// Fails with `InvalidArgument` for undeclared names. Relation names are
    /// a disjoint namespace and are resolved through
    /// [`get_related`](Record::get_related) instead.
    pub fn get(&self, name: &str) -> RecordStoreResult<Bson> {
        if !self.descriptor.has_attribute(name) {
            return Err(RecordStoreError::InvalidArgument(format!(
                "'{name}' is not a declared attribute of entity '{}'",
                self.descriptor.key()
            )));
        }
        Ok(self.attributes.get(name).cloned().unwrap_or(Bson::Null))
    }

    /// Writes a declared attribute, checking the value against its declared
    /// type.
    pub fn set(&mut self, name: &str, value: impl Into<Bson>) -> RecordStoreResult<&mut Self> {
        let value = value.into();
        let Some(kind) = self.descriptor.attribute_type(name) else {
            return Err(RecordStoreError::InvalidArgument(format!(
                "'{name}' is not a declared attribute of entity '{}'",
                self.descriptor.key()
            )));
        };
        if !kind.accepts(&value) {
            return Err(RecordStoreError::InvalidArgument(format!(
                "attribute '{name}' of entity '{}' does not accept {value:?}",
                self.descriptor.key()
            )));
        }
        self.attributes.insert(name.to_string(), value);
        Ok(self)
    }

    /// Bulk attribute setter; every entry goes through the typed
    /// [`set`](Record::set).
    pub fn set_attributes(&mut self, values: Document) -> RecordStoreResult<&mut Self> {
        for (name, value) in values {
            self.set(&name, value)?;
        }
        Ok(self)
    }

    /// Serializes the declared attributes into a storable document.
    ///
    /// With `names` only that subset is serialized. The identity field is
    /// always excluded; declared attributes with no value serialize as
    /// `Bson::Null`.
    pub fn attributes(&self, names: Option<&[&str]>) -> Document {
        let mut document = Document::new();
        match names {
            Some(names) => {
                for name in names {
                    if self.descriptor.has_attribute(name) {
                        document.insert(
                            name.to_string(),
                            self.attributes.get(*name).cloned().unwrap_or(Bson::Null),
                        );
                    }
                }
            }
            None => {
                for (name, _) in self.descriptor.attributes() {
                    document.insert(
                        name.clone(),
                        self.attributes.get(name).cloned().unwrap_or(Bson::Null),
                    );
                }
            }
        }
        document
    }

    /// The attributes plus the identity in string form, as JSON.
    pub fn to_json(&self) -> RecordStoreResult<serde_json::Value> {
        let mut document = self.attributes(None);
        document.insert("id", self.primary_key());
        Ok(serde_json::to_value(&document)?)
    }

    /// The instance criteria, created empty and bound to this record's
    /// collection on first access.
    pub fn criteria_mut(&mut self) -> &mut Criteria {
        self.criteria.get_or_insert_with(|| {
            let mut criteria = Criteria::new();
            criteria.set_collection(self.collection.clone());
            criteria
        })
    }

    /// The instance criteria, if one is active.
    pub fn active_criteria(&self) -> Option<&Criteria> {
        self.criteria.as_ref()
    }

    /// Replaces or clears the instance criteria.
    pub fn set_criteria(&mut self, criteria: Option<Criteria>) -> &mut Self {
        self.criteria = criteria.map(|mut criteria| {
            criteria.set_collection(self.collection.clone());
            criteria
        });
        self
    }

    /// Fluent sort over the instance criteria; existing sort fields keep
    /// their entry.
    pub fn sort<F>(&mut self, fields: impl IntoIterator<Item = F>) -> &mut Self
    where
        F: Into<OrderField>,
    {
        self.criteria_mut().merge_order_fields(fields);
        self
    }

    /// Fluent projection over the instance criteria.
    pub fn select(&mut self, fields: impl Into<FieldList>) -> &mut Self {
        self.criteria_mut().select(fields);
        self
    }

    /// Fluent result cap over the instance criteria.
    pub fn limit(&mut self, limit: i64) -> &mut Self {
        self.criteria_mut().set_limit(limit);
        self
    }

    /// An aggregation builder over this record's collection, seeded with the
    /// instance criteria's current conditions.
    pub fn aggregation(&self) -> Aggregation {
        let conditions = self
            .criteria
            .as_ref()
            .map(|criteria| criteria.conditions().clone())
            .unwrap_or_default();
        Aggregation::new(self.collection.clone(), conditions)
    }

    /// Resolves at most one record.
    ///
    /// With `merge_with_instance` the query is merged into the instance
    /// criteria before execution; otherwise the query is used standalone: a
    /// criteria as-is, a non-empty partial spec as a fresh criteria, or no
    /// filter at all.
    pub async fn find(
        &mut self,
        query: Option<QueryArg>,
        merge_with_instance: bool,
    ) -> RecordStoreResult<Option<Record>> {
        for hook in &self.hooks {
            hook.before_find(self);
        }
        let criteria = self.resolve_query(query, merge_with_instance);
        tracing::trace!(
            collection = self.collection.name(),
            filter = %criteria.conditions(),
            "find"
        );
        let document = self
            .collection
            .find_one(criteria.conditions().clone(), criteria.selected_fields())
            .await?;
        Ok(document.map(|document| self.materialize(document)))
    }

    /// Resolves every matching record.
    ///
    /// The query is used standalone, never merged with the instance
    /// criteria; a criteria's select, sort and paging are honored.
    pub async fn find_all(&mut self, query: Option<QueryArg>) -> RecordStoreResult<Vec<Record>> {
        for hook in &self.hooks {
            hook.before_find(self);
        }
        let mut criteria = self.resolve_query(query, false);
        criteria.set_collection(self.collection.clone());
        tracing::trace!(
            collection = self.collection.name(),
            filter = %criteria.conditions(),
            "find_all"
        );
        let documents = criteria.build_cursor()?.to_vec().await?;
        Ok(documents
            .into_iter()
            .map(|document| self.materialize(document))
            .collect())
    }

    /// Shorthand for [`find`](Record::find) with an identity-equality filter.
    ///
    /// Accepts a native identity or a raw value coercible into one.
    pub async fn find_by_id(&mut self, id: impl Into<Bson>) -> RecordStoreResult<Option<Record>> {
        let id = identity_from(id.into())?;
        let spec = CriteriaSpec::new().condition(bson::doc! { "_id": { "$eq": id } });
        self.find(Some(spec.into()), false).await
    }

    /// Re-reads this record's document from the store and replaces the
    /// attribute values. Returns false for unsaved records and when the
    /// document no longer exists.
    pub async fn refresh(&mut self) -> RecordStoreResult<bool> {
        if self.is_new() {
            return Ok(false);
        }
        let Some(id) = self.id.clone() else {
            return Ok(false);
        };
        match self.find_by_id(id).await? {
            Some(fresh) => {
                self.attributes = fresh.attributes;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Limit-1 existence probe for `field == value`.
    pub async fn exists(&self, field: &str, value: impl Into<Bson>) -> RecordStoreResult<bool> {
        let mut filter = Document::new();
        filter.insert(field.to_string(), value.into());
        let rows = self
            .collection
            .find(filter, &[field.to_string()])
            .limit(1)
            .to_vec()
            .await?;
        Ok(!rows.is_empty())
    }

    /// Writes this record as a new document.
    ///
    /// Serializes the declared attributes (or exactly `attribute_names`),
    /// excluding the identity, captures the store-assigned identity and
    /// transitions to `Persisted`. Returns false when a `before_save` hook
    /// vetoes; driver-level failures surface as `WriteConflict`.
    pub async fn insert(&mut self, attribute_names: Option<&[&str]>) -> RecordStoreResult<bool> {
        match self.state {
            RecordState::New => {}
            RecordState::Persisted => {
                return Err(RecordStoreError::InvalidState(
                    "the record is already persisted; use update".to_string(),
                ));
            }
            RecordState::Deleted => {
                return Err(RecordStoreError::InvalidState(
                    "the record has been deleted".to_string(),
                ));
            }
        }
        if !self.notify_before_save() {
            return Ok(false);
        }
        let document = self.attributes(attribute_names);
        let options = self.write_options(false);
        let assigned = self
            .collection
            .insert(document, &options)
            .await
            .map_err(as_write_conflict)?;
        tracing::debug!(
            collection = self.collection.name(),
            id = %identity_string(&assigned),
            "record inserted"
        );
        self.id = Some(assigned);
        self.state = RecordState::Persisted;
        for hook in &self.hooks {
            hook.after_save(self);
        }
        Ok(true)
    }

    /// Pushes this record's attribute values into its stored document.
    ///
    /// Issues a single-document `$set` keyed by identity. Fails with
    /// `InvalidState` while `New` or `Deleted`; returns false when a hook
    /// vetoes or the store reports no effective change.
    pub async fn update(&mut self, attribute_names: Option<&[&str]>) -> RecordStoreResult<bool> {
        self.require_persisted("updated")?;
        if !self.notify_before_save() {
            return Ok(false);
        }
        let id = self.identity()?;
        let document = self.attributes(attribute_names);
        let options = self.write_options(false);
        let report = self
            .collection
            .update(
                bson::doc! { "_id": id },
                bson::doc! { "$set": document },
                &options,
            )
            .await
            .map_err(as_write_conflict)?;
        if report.modified == 0 {
            return Ok(false);
        }
        for hook in &self.hooks {
            hook.after_save(self);
        }
        Ok(true)
    }

    /// Inserts when the record is new, updates otherwise.
    pub async fn save(&mut self, attribute_names: Option<&[&str]>) -> RecordStoreResult<bool> {
        if self.is_new() {
            self.insert(attribute_names).await
        } else {
            self.update(attribute_names).await
        }
    }

    /// Pushes a subset of attribute values without full-record semantics.
    ///
    /// An empty `attribute_names` means all declared attributes. The filter
    /// is the instance criteria when one is active, the identity otherwise.
    /// Pass `multiple` only with a criteria that deliberately scopes several
    /// documents.
    pub async fn save_attributes(
        &mut self,
        attribute_names: &[&str],
        multiple: bool,
    ) -> RecordStoreResult<bool> {
        if self.state == RecordState::Deleted {
            return Err(RecordStoreError::InvalidState(
                "the record has been deleted".to_string(),
            ));
        }
        let document = if attribute_names.is_empty() {
            self.attributes(None)
        } else {
            self.attributes(Some(attribute_names))
        };
        let filter = match &self.criteria {
            Some(criteria) => criteria.conditions().clone(),
            None => bson::doc! { "_id": self.identity()? },
        };
        let options = self.write_options(multiple);
        let report = self
            .collection
            .update(filter, bson::doc! { "$set": document }, &options)
            .await
            .map_err(as_write_conflict)?;
        Ok(report.modified > 0)
    }

    /// Applies a `$set` of `document` to every document matching the query,
    /// merged with the instance criteria when one is active.
    pub async fn update_all(
        &mut self,
        query: Option<QueryArg>,
        document: Document,
    ) -> RecordStoreResult<bool> {
        if !self.notify_before_save() {
            return Ok(false);
        }
        let criteria = self.scoped_query(query);
        let options = self.write_options(true);
        let report = self
            .collection
            .update(
                criteria.conditions().clone(),
                bson::doc! { "$set": document },
                &options,
            )
            .await
            .map_err(as_write_conflict)?;
        if report.modified == 0 {
            return Ok(false);
        }
        for hook in &self.hooks {
            hook.after_save(self);
        }
        Ok(true)
    }

    /// Applies a `$set` of `values` to the single document with identity
    /// `id`. Any identity key inside `values` is dropped.
    pub async fn update_by_id(
        &mut self,
        id: impl Into<Bson>,
        mut values: Document,
    ) -> RecordStoreResult<bool> {
        values.remove("id");
        values.remove("_id");
        let id = identity_from(id.into())?;
        let options = self.write_options(false);
        let report = self
            .collection
            .update(
                bson::doc! { "_id": id },
                bson::doc! { "$set": values },
                &options,
            )
            .await
            .map_err(as_write_conflict)?;
        Ok(report.modified > 0)
    }

    /// Removes this record from the store and transitions to `Deleted`.
    ///
    /// With no active instance criteria the removal is keyed by identity and
    /// removes a single document. With an active criteria every matching
    /// document is removed, with no identity scoping: once a caller has
    /// scoped a record set via criteria, delete operates set-wise.
    pub async fn delete(&mut self) -> RecordStoreResult<bool> {
        self.require_persisted("deleted")?;
        if !self.notify_before_delete() {
            return Ok(false);
        }
        let removed = match &self.criteria {
            None => {
                let id = self.identity()?;
                let options = self.remove_options(true);
                self.collection
                    .remove(bson::doc! { "_id": id }, &options)
                    .await
                    .map_err(as_write_conflict)?
            }
            Some(criteria) => {
                let filter = criteria.conditions().clone();
                let options = self.remove_options(false);
                self.collection
                    .remove(filter, &options)
                    .await
                    .map_err(as_write_conflict)?
            }
        };
        if removed == 0 {
            return Ok(false);
        }
        tracing::debug!(
            collection = self.collection.name(),
            removed,
            "record deleted"
        );
        self.state = RecordState::Deleted;
        for hook in &self.hooks {
            hook.after_delete(self);
        }
        Ok(true)
    }

    /// Removes the single document with identity `id`.
    pub async fn delete_by_id(&self, id: impl Into<Bson>) -> RecordStoreResult<bool> {
        let id = identity_from(id.into())?;
        let options = self.remove_options(true);
        let removed = self
            .collection
            .remove(bson::doc! { "_id": id }, &options)
            .await
            .map_err(as_write_conflict)?;
        Ok(removed > 0)
    }

    /// Removes every document matching the query, merged with the instance
    /// criteria when one is active. Returns the number removed.
    pub async fn delete_all(&mut self, query: Option<QueryArg>) -> RecordStoreResult<u64> {
        let criteria = self.scoped_query(query);
        let options = self.remove_options(false);
        self.collection
            .remove(criteria.conditions().clone(), &options)
            .await
            .map_err(as_write_conflict)
    }

    /// Counts documents matching the query; no query counts the whole
    /// collection.
    pub async fn count(&self, query: Option<QueryArg>) -> RecordStoreResult<u64> {
        let filter = match query {
            Some(QueryArg::Criteria(criteria)) => criteria.conditions().clone(),
            Some(QueryArg::Spec(spec)) if !spec.is_empty() => {
                Criteria::from(spec).conditions().clone()
            }
            _ => Document::new(),
        };
        self.collection.count(filter).await
    }

    /// The distinct values of `field` across matching documents.
    ///
    /// No query falls back to the instance criteria's conditions. A filter
    /// matching nothing yields an empty sequence.
    pub async fn distinct(
        &self,
        field: &str,
        query: Option<QueryArg>,
    ) -> RecordStoreResult<Vec<Bson>> {
        let filter = match query {
            Some(QueryArg::Criteria(criteria)) => criteria.conditions().clone(),
            Some(QueryArg::Spec(spec)) if !spec.is_empty() => {
                Criteria::from(spec).conditions().clone()
            }
            _ => self
                .criteria
                .as_ref()
                .map(|criteria| criteria.conditions().clone())
                .unwrap_or_default(),
        };
        self.collection.distinct(field, filter).await
    }

    /// Resolves a declared relation, once per name per instance.
    ///
    /// The result is cached for the instance's lifetime and never
    /// invalidated; a second call returns the cached value even if the store
    /// has changed since.
    pub async fn get_related(&mut self, name: &str) -> RecordStoreResult<Related> {
        if let Some(found) = self.relation_cache.get(name) {
            return Ok(found.clone());
        }
        let Some(relation) = self.descriptor.relation(name).cloned() else {
            return Err(RecordStoreError::InvalidArgument(format!(
                "'{name}' is not a declared relation of entity '{}'",
                self.descriptor.key()
            )));
        };
        let Some(target_descriptor) = crate::schema::lookup(&relation.target) else {
            return Err(RecordStoreError::BrokenRelation(format!(
                "relation '{name}' targets unregistered entity '{}'",
                relation.target
            )));
        };
        let target_handle = self.collection.with_collection(target_descriptor.collection());
        let mut target = Record::new(target_descriptor.clone(), target_handle.clone())
            .with_hooks(self.hooks.clone());

        let resolved = match relation.kind {
            RelationKind::BelongsTo => {
                let foreign = self.attributes.get(&relation.foreign_field).cloned();
                let foreign = match foreign {
                    Some(Bson::Null) | None => {
                        return Err(RecordStoreError::BrokenRelation(format!(
                            "relation '{name}' needs foreign field '{}' on this record",
                            relation.foreign_field
                        )));
                    }
                    Some(value) => value,
                };
                let target_id = identity_from(foreign)?;
                let mut criteria = Criteria::new();
                criteria
                    .add_condition("_id", "=", target_id, Default::default())
                    .set_limit(1);
                Related::One(target.find(Some(criteria.into()), false).await?.map(Box::new))
            }
            RelationKind::HasOne => {
                self.require_target_field(name, &relation.foreign_field, &target_descriptor)?;
                let mut criteria = Criteria::new();
                criteria
                    .add_condition(
                        &relation.foreign_field,
                        "=",
                        self.identity_as_string()?,
                        Default::default(),
                    )
                    .set_limit(1);
                Related::One(target.find(Some(criteria.into()), false).await?.map(Box::new))
            }
            RelationKind::HasMany => {
                self.require_target_field(name, &relation.foreign_field, &target_descriptor)?;
                let mut criteria = Criteria::new();
                criteria.add_condition(
                    &relation.foreign_field,
                    "=",
                    self.identity()?,
                    Default::default(),
                );
                Related::Many(target.find_all(Some(criteria.into())).await?)
            }
            RelationKind::HasRelationWith => {
                let mut filter = Document::new();
                filter.insert(relation.foreign_field.clone(), self.identity_as_string()?);
                let rows = target_handle
                    .find(filter, &[relation.foreign_field.clone()])
                    .limit(1)
                    .to_vec()
                    .await?;
                Related::Exists(!rows.is_empty())
            }
        };
        self.relation_cache.insert(name.to_string(), resolved.clone());
        Ok(resolved)
    }

    /// The attribute value as a datetime, `None` when unset.
    ///
    /// Fails with `InvalidArgument` when the stored value is not a
    /// timestamp.
    pub fn formatted_date(
        &self,
        field: &str,
    ) -> RecordStoreResult<Option<chrono::DateTime<chrono::Utc>>> {
        match self.get(field)? {
            Bson::Null => Ok(None),
            Bson::DateTime(at) => Ok(Some(at.to_chrono())),
            other => Err(RecordStoreError::InvalidArgument(format!(
                "attribute '{field}' holds {other:?}, not a timestamp"
            ))),
        }
    }

    /// The attribute value formatted with a `strftime`-style format string;
    /// empty when unset.
    pub fn string_date(&self, field: &str, format: &str) -> RecordStoreResult<String> {
        Ok(self
            .formatted_date(field)?
            .map(|at| at.format(format).to_string())
            .unwrap_or_default())
    }

    fn materialize(&self, document: Document) -> Record {
        let mut attributes = Document::new();
        for (name, _) in self.descriptor.attributes() {
            attributes.insert(
                name.clone(),
                document.get(name).cloned().unwrap_or(Bson::Null),
            );
        }
        let record = Record {
            descriptor: self.descriptor.clone(),
            collection: self.collection.clone(),
            state: RecordState::Persisted,
            id: document.get("_id").cloned(),
            attributes,
            criteria: None,
            relation_cache: HashMap::new(),
            hooks: self.hooks.clone(),
            safe: self.safe,
            fsync: self.fsync,
        };
        for hook in &record.hooks {
            hook.after_find(&record);
        }
        record
    }

    fn resolve_query(&mut self, query: Option<QueryArg>, merge: bool) -> Criteria {
        if merge {
            match query {
                Some(QueryArg::Criteria(criteria)) => {
                    self.criteria_mut().merge_with(&criteria);
                }
                Some(QueryArg::Spec(spec)) if !spec.is_empty() => {
                    self.criteria_mut().merge_with_spec(spec);
                }
                _ => {}
            }
            self.criteria_mut().clone()
        } else {
            match query {
                Some(QueryArg::Criteria(criteria)) => criteria,
                Some(QueryArg::Spec(spec)) if !spec.is_empty() => Criteria::from(spec),
                _ => Criteria::new(),
            }
        }
    }

    /// Filter for the bulk write family: the query merged into a copy of the
    /// instance criteria when one is active.
    fn scoped_query(&self, query: Option<QueryArg>) -> Criteria {
        let mut criteria = self.criteria.clone().unwrap_or_default();
        match query {
            Some(QueryArg::Criteria(other)) => {
                criteria.merge_with(&other);
            }
            Some(QueryArg::Spec(spec)) if !spec.is_empty() => {
                criteria.merge_with_spec(spec);
            }
            _ => {}
        }
        criteria
    }

    fn require_persisted(&self, action: &str) -> RecordStoreResult<()> {
        match self.state {
            RecordState::Persisted => Ok(()),
            RecordState::New => Err(RecordStoreError::InvalidState(format!(
                "the record cannot be {action} because it is new"
            ))),
            RecordState::Deleted => Err(RecordStoreError::InvalidState(format!(
                "the record cannot be {action} because it has been deleted"
            ))),
        }
    }

    fn require_target_field(
        &self,
        relation_name: &str,
        foreign_field: &str,
        target: &EntityDescriptor,
    ) -> RecordStoreResult<()> {
        if target.has_attribute(foreign_field) {
            Ok(())
        } else {
            Err(RecordStoreError::BrokenRelation(format!(
                "relation '{relation_name}' needs foreign field '{foreign_field}' on entity '{}'",
                target.key()
            )))
        }
    }

    fn identity(&self) -> RecordStoreResult<Bson> {
        self.id.clone().ok_or_else(|| {
            RecordStoreError::InvalidState("the record has no identity".to_string())
        })
    }

    fn identity_as_string(&self) -> RecordStoreResult<String> {
        Ok(identity_string(&self.identity()?))
    }

    fn notify_before_save(&self) -> bool {
        for hook in &self.hooks {
            if !hook.before_save(self) {
                return false;
            }
        }
        true
    }

    fn notify_before_delete(&self) -> bool {
        for hook in &self.hooks {
            if !hook.before_delete(self) {
                return false;
            }
        }
        true
    }

    fn write_options(&self, multiple: bool) -> WriteOptions {
        WriteOptions {
            fsync: self.fsync,
            multiple,
            w: self.acknowledgement(),
        }
    }

    fn remove_options(&self, just_one: bool) -> RemoveOptions {
        RemoveOptions { just_one, w: self.acknowledgement() }
    }

    fn acknowledgement(&self) -> WriteAck {
        if self.safe { WriteAck::Acknowledged } else { WriteAck::Unacknowledged }
    }
}

/// Wraps a driver-level write failure, keeping connection failures distinct.
fn as_write_conflict(err: RecordStoreError) -> RecordStoreError {
    match err {
        RecordStoreError::Connection(_) => err,
        other => RecordStoreError::WriteConflict(other.to_string()),
    }
}
