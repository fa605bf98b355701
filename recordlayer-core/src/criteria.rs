//! Query criteria construction for record lookups.
//!
//! A [`Criteria`] accumulates the four query dimensions (projection, condition
//! tree, sort spec, paging) across any number of fluent builder calls and is
//! read once at execution time. Conditions are kept in the store's native
//! operator syntax: connective keys `$and`/`$or` map to arrays of
//! sub-documents, leaves map a field name to a `{operator: value}` document.
//!
//! # Condition Building
//!
//! ```ignore
//! use recordlayer::criteria::{Connective, Criteria, SortDirection};
//!
//! let mut criteria = Criteria::new();
//! criteria
//!     .add_condition("status", "=", "active", Connective::And)
//!     .add_condition("age", ">=", 18, Connective::And)
//!     .order_by("created_at", SortDirection::Desc, true)
//!     .set_limit(10);
//! ```
//!
//! # Top-Level Shape
//!
//! The condition tree keeps at most one top-level shape: plain leaves only,
//! or connective keys only. As soon as a `$and`/`$or` key appears, every bare
//! field key is migrated into the `$and` array as a singleton document. The
//! normalization pass runs after every mutation and is idempotent.

use bson::{Bson, Document, doc};

use crate::{
    cursor::Cursor,
    driver::CollectionHandle,
    error::{RecordStoreError, RecordStoreResult},
};

/// Boolean connective for condition placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connective {
    /// Conjunction; the default for every condition builder.
    #[default]
    And,
    /// Disjunction; the leaf becomes a new branch of the `$or` array.
    Or,
}

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

impl SortDirection {
    /// The store-native direction value, `1` or `-1`.
    pub fn value(&self) -> i32 {
        match self {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        }
    }
}

/// Translates a symbolic comparison operator into the store's native form.
///
/// `=`, `!=`/`<>` and the ordering symbols map to `$eq`/`$ne`/`$lt`/`$lte`/
/// `$gt`/`$gte`; any other symbol is lowercased and gains a `$` prefix, so
/// `exists` becomes `$exists`, `regex` becomes `$regex`, `in` becomes `$in`.
pub fn mongo_operator(operator: &str) -> String {
    match operator {
        "=" => "$eq".to_string(),
        "!=" | "<>" => "$ne".to_string(),
        "<" => "$lt".to_string(),
        "<=" => "$lte".to_string(),
        ">" => "$gt".to_string(),
        ">=" => "$gte".to_string(),
        other => format!("${}", other.to_ascii_lowercase()),
    }
}

/// A geographic point with optional proximity bounds.
///
/// Input value for [`Criteria::add_near_condition`]; bounds that are unset
/// are omitted from the emitted query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Minimum distance bound in meters.
    pub min_distance: Option<f64>,
    /// Maximum distance bound in meters.
    pub max_distance: Option<f64>,
}

impl GeoPoint {
    /// Creates a point with no distance bounds.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude, min_distance: None, max_distance: None }
    }

    /// Sets the minimum distance bound in meters.
    pub fn min_distance(mut self, meters: f64) -> Self {
        self.min_distance = Some(meters);
        self
    }

    /// Sets the maximum distance bound in meters.
    pub fn max_distance(mut self, meters: f64) -> Self {
        self.max_distance = Some(meters);
        self
    }
}

/// A date argument for [`Criteria::compare_date`].
#[derive(Debug, Clone, Copy)]
pub enum DateValue {
    /// A concrete store timestamp.
    Timestamp(bson::DateTime),
    /// Seconds since the Unix epoch.
    EpochSeconds(i64),
}

impl From<bson::DateTime> for DateValue {
    fn from(value: bson::DateTime) -> Self {
        DateValue::Timestamp(value)
    }
}

impl From<chrono::DateTime<chrono::Utc>> for DateValue {
    fn from(value: chrono::DateTime<chrono::Utc>) -> Self {
        DateValue::Timestamp(bson::DateTime::from_chrono(value))
    }
}

impl From<i64> for DateValue {
    fn from(value: i64) -> Self {
        DateValue::EpochSeconds(value)
    }
}

/// Field list argument accepted by [`Criteria::select`].
#[derive(Debug, Clone)]
pub enum FieldList {
    /// A comma-joined field string, or `"*"` for all fields.
    Joined(String),
    /// An explicit field name sequence.
    Names(Vec<String>),
}

impl From<&str> for FieldList {
    fn from(value: &str) -> Self {
        FieldList::Joined(value.to_string())
    }
}

impl From<String> for FieldList {
    fn from(value: String) -> Self {
        FieldList::Joined(value)
    }
}

impl From<Vec<String>> for FieldList {
    fn from(value: Vec<String>) -> Self {
        FieldList::Names(value)
    }
}

impl From<Vec<&str>> for FieldList {
    fn from(value: Vec<&str>) -> Self {
        FieldList::Names(value.into_iter().map(str::to_string).collect())
    }
}

/// Sort field argument accepted by [`Criteria::merge_order_fields`].
#[derive(Debug, Clone)]
pub enum OrderField {
    /// A bare field name, sorted ascending.
    Named(String),
    /// A field name with an explicit direction.
    Directed(String, SortDirection),
}

impl From<&str> for OrderField {
    fn from(value: &str) -> Self {
        OrderField::Named(value.to_string())
    }
}

impl From<(&str, SortDirection)> for OrderField {
    fn from((field, direction): (&str, SortDirection)) -> Self {
        OrderField::Directed(field.to_string(), direction)
    }
}

/// A partial query specification.
///
/// Every dimension is optional; unset dimensions leave the target criteria
/// untouched when merged. This is the value record operations accept as an
/// ad-hoc query argument.
#[derive(Debug, Clone, Default)]
pub struct CriteriaSpec {
    /// Fields to project, concatenated onto the target's select list.
    pub select: Option<Vec<String>>,
    /// Condition tree fragment, deep-unioned into the target's tree.
    pub condition: Option<Document>,
    /// Sort entries, overriding the target's per field.
    pub sort: Option<Document>,
    /// Result cap; wins over the target's when 0 or greater.
    pub limit: Option<i64>,
    /// Skip count; wins over the target's when 0 or greater.
    pub offset: Option<i64>,
}

impl CriteriaSpec {
    /// Creates an empty specification.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the condition fragment.
    pub fn condition(mut self, condition: Document) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Sets the projected fields.
    pub fn select(mut self, fields: Vec<String>) -> Self {
        self.select = Some(fields);
        self
    }

    /// Sets the sort entries.
    pub fn sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Sets the result cap.
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the skip count.
    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Returns true when no dimension carries anything.
    pub fn is_empty(&self) -> bool {
        self.select.as_ref().is_none_or(|s| s.is_empty())
            && self.condition.as_ref().is_none_or(|c| c.is_empty())
            && self.sort.as_ref().is_none_or(|s| s.is_empty())
            && self.limit.is_none()
            && self.offset.is_none()
    }
}

/// An accumulating, mutable query specification.
///
/// Created empty or from a [`CriteriaSpec`], mutated in place by every
/// builder call, merged non-destructively with other criteria, and read at
/// execution time. Never persisted.
#[derive(Debug, Clone)]
pub struct Criteria {
    select: Vec<String>,
    condition: Document,
    sort: Document,
    limit: i64,
    offset: i64,
    collection: Option<CollectionHandle>,
}

impl Criteria {
    /// Creates an empty criteria: all fields, no filter, no sort, unbounded.
    pub fn new() -> Self {
        Self {
            select: Vec::new(),
            condition: Document::new(),
            sort: Document::new(),
            limit: -1,
            offset: -1,
            collection: None,
        }
    }

    /// Binds the collection handle [`build_cursor`](Criteria::build_cursor)
    /// executes against.
    pub fn set_collection(&mut self, collection: CollectionHandle) -> &mut Self {
        self.collection = Some(collection);
        self
    }

    /// Returns the bound collection handle, if any.
    pub fn collection(&self) -> Option<&CollectionHandle> {
        self.collection.as_ref()
    }

    /// Adds a comparison leaf for `field`.
    ///
    /// The symbolic `operator` is translated via [`mongo_operator`]. With
    /// [`Connective::Or`] the leaf becomes a new `$or` branch; with
    /// [`Connective::And`] it joins the `$and` array when a connective is
    /// already active, and sets the field directly at top level otherwise.
    pub fn add_condition(
        &mut self,
        field: &str,
        operator: &str,
        value: impl Into<Bson>,
        connective: Connective,
    ) -> &mut Self {
        let mut leaf = Document::new();
        leaf.insert(mongo_operator(operator), value.into());
        self.place_leaf(field, leaf, connective)
    }

    /// Adds a `$in` membership leaf over `values`.
    pub fn add_in_condition<V>(
        &mut self,
        field: &str,
        values: impl IntoIterator<Item = V>,
        connective: Connective,
    ) -> &mut Self
    where
        V: Into<Bson>,
    {
        let values: Vec<Bson> = values.into_iter().map(Into::into).collect();
        let mut leaf = Document::new();
        leaf.insert("$in", Bson::Array(values));
        self.place_leaf(field, leaf, connective)
    }

    /// Adds a `$nin` exclusion leaf over `values`.
    pub fn add_not_in_condition<V>(
        &mut self,
        field: &str,
        values: impl IntoIterator<Item = V>,
        connective: Connective,
    ) -> &mut Self
    where
        V: Into<Bson>,
    {
        let values: Vec<Bson> = values.into_iter().map(Into::into).collect();
        let mut leaf = Document::new();
        leaf.insert("$nin", Bson::Array(values));
        self.place_leaf(field, leaf, connective)
    }

    /// Adds a case-insensitive, unanchored substring match for `field`.
    ///
    /// No-op when `value` is empty.
    pub fn add_like_condition(
        &mut self,
        field: &str,
        value: &str,
        connective: Connective,
    ) -> &mut Self {
        if value.is_empty() {
            return self;
        }
        let leaf = doc! { "$regex": format!(".*{value}.*"), "$options": "i" };
        self.place_leaf(field, leaf, connective)
    }

    /// Adds a `$regex` leaf with the given pattern and options string.
    pub fn add_regex_condition(
        &mut self,
        field: &str,
        pattern: &str,
        options: &str,
        connective: Connective,
    ) -> &mut Self {
        let mut leaf = doc! { "$regex": pattern };
        if !options.is_empty() {
            leaf.insert("$options", options);
        }
        self.place_leaf(field, leaf, connective)
    }

    /// Adds a `$exists` presence check for `field`.
    pub fn add_exists_condition(
        &mut self,
        field: &str,
        should_exist: bool,
        connective: Connective,
    ) -> &mut Self {
        let leaf = doc! { "$exists": should_exist };
        self.place_leaf(field, leaf, connective)
    }

    /// Equality filter that only applies when a value is present.
    ///
    /// No-op on `Bson::Null` and on an empty string; the "only filter if
    /// provided" convenience used by search forms.
    pub fn compare(
        &mut self,
        field: &str,
        value: impl Into<Bson>,
        connective: Connective,
    ) -> &mut Self {
        let value = value.into();
        let absent = match &value {
            Bson::Null => true,
            Bson::String(text) => text.is_empty(),
            _ => false,
        };
        if absent {
            return self;
        }
        self.add_condition(field, "=", value, connective)
    }

    /// Substring filter that only applies when `value` is non-empty.
    pub fn compare_like(
        &mut self,
        field: &str,
        value: &str,
        connective: Connective,
    ) -> &mut Self {
        if value.is_empty() {
            return self;
        }
        self.add_like_condition(field, value, connective)
    }

    /// Datetime equality filter that only applies when a value is present.
    ///
    /// Epoch seconds are widened into a store timestamp.
    pub fn compare_date(
        &mut self,
        field: &str,
        value: Option<DateValue>,
        connective: Connective,
    ) -> &mut Self {
        let Some(value) = value else {
            return self;
        };
        let timestamp = match value {
            DateValue::Timestamp(at) => at,
            DateValue::EpochSeconds(seconds) => bson::DateTime::from_millis(seconds * 1000),
        };
        self.add_condition(field, "=", Bson::DateTime(timestamp), connective)
    }

    /// Adds a condition on a sub-document field.
    ///
    /// `operators` and `values` pair up positionally into one comparison
    /// document under `field.sub_field`; a single pair expresses the plain
    /// one-operator case. Mismatched lengths fail with `InvalidArgument`.
    pub fn add_sub_document_condition<V>(
        &mut self,
        field: &str,
        sub_field: &str,
        operators: &[&str],
        values: Vec<V>,
        connective: Connective,
    ) -> RecordStoreResult<&mut Self>
    where
        V: Into<Bson>,
    {
        if operators.is_empty() || operators.len() != values.len() {
            return Err(RecordStoreError::InvalidArgument(format!(
                "sub-document condition on '{field}.{sub_field}' needs one value per operator, \
                 got {} operators and {} values",
                operators.len(),
                values.len()
            )));
        }
        let mut comparisons = Document::new();
        for (operator, value) in operators.iter().zip(values) {
            comparisons.insert(mongo_operator(operator), value.into());
        }
        let mut expression = Document::new();
        expression.insert(sub_field.to_string(), comparisons);
        Ok(self.add_raw_condition(field, expression, connective))
    }

    /// Adds a pre-built expression document for `field`, bypassing operator
    /// translation.
    pub fn add_raw_condition(
        &mut self,
        field: &str,
        expression: Document,
        connective: Connective,
    ) -> &mut Self {
        self.place_leaf(field, expression, connective)
    }

    /// Adds a geo-proximity leaf for `field`.
    ///
    /// The distance bound keys are included only when the point declares
    /// them.
    pub fn add_near_condition(
        &mut self,
        field: &str,
        point: &GeoPoint,
        connective: Connective,
    ) -> &mut Self {
        let mut expression = doc! {
            "$near": {
                "$geometry": {
                    "type": "Point",
                    "coordinates": [point.latitude, point.longitude],
                },
            },
        };
        if let Some(meters) = point.min_distance {
            expression.insert("$minDistance", meters);
        }
        if let Some(meters) = point.max_distance {
            expression.insert("$maxDistance", meters);
        }
        self.place_leaf(field, expression, connective)
    }

    /// Replaces the whole condition tree with a raw expression.
    pub fn set_condition(&mut self, expression: Document) -> &mut Self {
        self.condition = expression;
        self.normalize_top_level();
        self
    }

    /// Deletes the top-level leaf for `field`, and scans one level into the
    /// connective arrays removing matching keys. Does not recurse further.
    pub fn remove_condition(&mut self, field: &str) -> &mut Self {
        self.condition.remove(field);
        for connective_key in ["$and", "$or"] {
            let emptied = match self.condition.get_mut(connective_key) {
                Some(Bson::Array(branches)) => {
                    for branch in branches.iter_mut() {
                        if let Bson::Document(leaf) = branch {
                            leaf.remove(field);
                        }
                    }
                    branches.retain(|branch| {
                        !matches!(branch, Bson::Document(leaf) if leaf.is_empty())
                    });
                    branches.is_empty()
                }
                _ => false,
            };
            if emptied {
                self.condition.remove(connective_key);
            }
        }
        self
    }

    /// Returns the condition tree.
    pub fn conditions(&self) -> &Document {
        &self.condition
    }

    /// Returns the condition tree, or `None` when it is empty.
    ///
    /// For callers that must distinguish "no filter" from "empty filter
    /// document" when talking to the store.
    pub fn non_empty_conditions(&self) -> Option<&Document> {
        if self.condition.is_empty() { None } else { Some(&self.condition) }
    }

    /// Sets the projected fields.
    ///
    /// A comma-joined string is split and trimmed; `"*"` or a single
    /// unqualified name means "all fields" and is a no-op.
    pub fn select(&mut self, fields: impl Into<FieldList>) -> &mut Self {
        match fields.into() {
            FieldList::Joined(joined) => {
                if joined == "*" || !joined.contains(',') {
                    return self;
                }
                self.select = joined
                    .split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            FieldList::Names(names) => {
                self.select = names;
            }
        }
        self
    }

    /// Returns the projected fields; empty means all fields.
    pub fn selected_fields(&self) -> &[String] {
        &self.select
    }

    /// Adds or overwrites one sort entry.
    ///
    /// With `multisort` the entry joins the existing spec, preserving prior
    /// entries' order; without it the entry replaces the whole spec.
    pub fn order_by(
        &mut self,
        field: &str,
        direction: SortDirection,
        multisort: bool,
    ) -> &mut Self {
        if !multisort {
            self.sort = Document::new();
        }
        self.sort.insert(field.to_string(), direction.value());
        self
    }

    /// Bulk [`order_by`](Criteria::order_by) helper.
    ///
    /// Accepts bare names (ascending) or `(name, direction)` pairs; fields
    /// already present in the sort spec keep their existing entry.
    pub fn merge_order_fields<F>(&mut self, fields: impl IntoIterator<Item = F>) -> &mut Self
    where
        F: Into<OrderField>,
    {
        for field in fields {
            let (name, direction) = match field.into() {
                OrderField::Named(name) => (name, SortDirection::Asc),
                OrderField::Directed(name, direction) => (name, direction),
            };
            if self.sort.contains_key(&name) {
                continue;
            }
            self.sort.insert(name, direction.value());
        }
        self
    }

    /// Returns the sort spec, field name to `1`/`-1`, in insertion order.
    pub fn sort_spec(&self) -> &Document {
        &self.sort
    }

    /// Sets the result cap; `-1` means unbounded.
    pub fn set_limit(&mut self, limit: i64) -> &mut Self {
        self.limit = limit;
        self
    }

    /// Returns the result cap; `-1` means unbounded.
    pub fn limit(&self) -> i64 {
        self.limit
    }

    /// Sets the skip count; `-1` means none.
    pub fn set_offset(&mut self, offset: i64) -> &mut Self {
        self.offset = offset;
        self
    }

    /// Returns the skip count; `-1` means none.
    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// Merges another criteria into this one.
    ///
    /// Select lists concatenate; condition trees deep-union (arrays
    /// concatenate, documents recurse, scalar conflicts take the incoming
    /// side); sort entries override per field preserving order; limit and
    /// offset take the incoming side only when it is explicitly set (0 or
    /// greater). Finishes with normalization.
    pub fn merge_with(&mut self, other: &Criteria) -> &mut Self {
        self.select.extend(other.select.iter().cloned());
        deep_union(&mut self.condition, &other.condition);
        for (field, direction) in other.sort.iter() {
            self.sort.insert(field.to_string(), direction.clone());
        }
        if other.limit > -1 {
            self.limit = other.limit;
        }
        if other.offset > -1 {
            self.offset = other.offset;
        }
        self.normalize_top_level();
        self
    }

    /// Merges a partial specification into this criteria.
    ///
    /// Same per-field rules as [`merge_with`](Criteria::merge_with); unset
    /// dimensions leave this criteria untouched.
    pub fn merge_with_spec(&mut self, spec: CriteriaSpec) -> &mut Self {
        if let Some(fields) = spec.select {
            self.select.extend(fields);
        }
        if let Some(condition) = spec.condition {
            deep_union(&mut self.condition, &condition);
        }
        if let Some(sort) = spec.sort {
            for (field, direction) in sort.iter() {
                self.sort.insert(field.to_string(), direction.clone());
            }
        }
        if let Some(limit) = spec.limit
            && limit > -1
        {
            self.limit = limit;
        }
        if let Some(offset) = spec.offset
            && offset > -1
        {
            self.offset = offset;
        }
        self.normalize_top_level();
        self
    }

    /// Fails with `SchemaMismatch` when any sort or select field is not a
    /// declared attribute of the target entity type.
    ///
    /// Must run before execution wherever field names come from the caller.
    pub fn validate(&self, declared_fields: &[String]) -> RecordStoreResult<()> {
        for (field, _) in self.sort.iter() {
            if !declared_fields.iter().any(|name| name == field) {
                return Err(RecordStoreError::SchemaMismatch(format!(
                    "sort field '{field}' is not a declared attribute"
                )));
            }
        }
        for field in &self.select {
            if !declared_fields.iter().any(|name| name == field) {
                return Err(RecordStoreError::SchemaMismatch(format!(
                    "selected field '{field}' is not a declared attribute"
                )));
            }
        }
        Ok(())
    }

    /// Issues the find against the bound collection and returns the cursor,
    /// configured with offset, limit and sort in that order.
    ///
    /// Fails with `NotConfigured` when no collection handle is bound.
    pub fn build_cursor(&self) -> RecordStoreResult<Cursor> {
        let collection = self.collection.as_ref().ok_or_else(|| {
            RecordStoreError::NotConfigured(
                "criteria has no collection handle bound".to_string(),
            )
        })?;
        tracing::trace!(
            collection = collection.name(),
            filter = %self.condition,
            "building cursor"
        );
        let mut cursor = collection.find(self.condition.clone(), &self.select);
        if self.offset > -1 {
            cursor = cursor.skip(self.offset as u64);
        }
        if self.limit > -1 {
            cursor = cursor.limit(self.limit);
        }
        if !self.sort.is_empty() {
            cursor = cursor.sort(self.sort.clone());
        }
        Ok(cursor)
    }

    /// Restores the top-level invariant after a mutation.
    ///
    /// When a connective key is present, every remaining bare field key is
    /// migrated into the `$and` array as a singleton document. Idempotent.
    pub fn normalize_top_level(&mut self) {
        if !(self.condition.contains_key("$and") || self.condition.contains_key("$or")) {
            return;
        }
        let stray: Vec<String> = self
            .condition
            .iter()
            .map(|(key, _)| key.to_string())
            .filter(|key| key != "$and" && key != "$or")
            .collect();
        for field in stray {
            if let Some(expression) = self.condition.remove(&field) {
                let mut branch = Document::new();
                branch.insert(field, expression);
                match self.condition.get_mut("$and") {
                    Some(Bson::Array(branches)) => branches.push(Bson::Document(branch)),
                    _ => {
                        self.condition
                            .insert("$and", Bson::Array(vec![Bson::Document(branch)]));
                    }
                }
            }
        }
    }

    fn place_leaf(&mut self, field: &str, expression: Document, connective: Connective) -> &mut Self {
        match connective {
            Connective::Or => self.push_branch("$or", field, expression),
            Connective::And => {
                if self.condition.contains_key("$or") || self.condition.contains_key("$and") {
                    self.push_branch("$and", field, expression);
                } else {
                    self.condition.insert(field.to_string(), expression);
                }
            }
        }
        self.normalize_top_level();
        self
    }

    fn push_branch(&mut self, connective_key: &str, field: &str, expression: Document) {
        let mut branch = Document::new();
        branch.insert(field.to_string(), expression);
        match self.condition.get_mut(connective_key) {
            Some(Bson::Array(branches)) => branches.push(Bson::Document(branch)),
            _ => {
                self.condition
                    .insert(connective_key, Bson::Array(vec![Bson::Document(branch)]));
            }
        }
    }
}

impl Default for Criteria {
    fn default() -> Self {
        Self::new()
    }
}

impl From<CriteriaSpec> for Criteria {
    fn from(spec: CriteriaSpec) -> Self {
        let mut criteria = Criteria::new();
        criteria.merge_with_spec(spec);
        criteria
    }
}

/// Deep-unions `incoming` into `target`.
///
/// Arrays concatenate, documents recurse, anything else takes the incoming
/// value.
fn deep_union(target: &mut Document, incoming: &Document) {
    for (key, value) in incoming.iter() {
        let merged = match (target.get_mut(key), value) {
            (Some(Bson::Document(existing)), Bson::Document(new)) => {
                deep_union(existing, new);
                true
            }
            (Some(Bson::Array(existing)), Bson::Array(new)) => {
                existing.extend(new.iter().cloned());
                true
            }
            _ => false,
        };
        if !merged {
            target.insert(key.to_string(), value.clone());
        }
    }
}
