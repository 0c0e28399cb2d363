//! Record handles: typed access to one object inside a context.

use crate::coerce::{coerce, decode_blob, encode_blob, to_json};
use crate::context::Context;
use crate::error::{CoreError, CoreResult};
use chrono::{DateTime, Utc};
use objsync_store::{AttributeType, AttributeValue, EntitySchema, ObjectId, Relationship, Row};
use serde_json::{Map, Value};
use tracing::warn;

/// One object as seen through a context.
///
/// Reads and writes go through the owning context's cache and are confined
/// the same way the context is. Writes become durable on the next save.
#[derive(Clone, Debug)]
pub struct Record {
    id: ObjectId,
    context: Context,
}

impl Record {
    pub(crate) fn new(id: ObjectId, context: Context) -> Self {
        Self { id, context }
    }

    /// Returns the object id.
    #[must_use]
    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    /// Returns the entity name.
    #[must_use]
    pub fn entity(&self) -> &str {
        self.id.entity()
    }

    /// Returns the durable reference, resolvable with
    /// [`DataStack::record_from_uri`](crate::DataStack::record_from_uri).
    #[must_use]
    pub fn object_uri(&self) -> String {
        self.id.uri()
    }

    /// Returns the owning context.
    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Saves the owning context.
    ///
    /// # Errors
    ///
    /// Fails like [`Context::save`].
    pub fn save(&self) -> CoreResult<()> {
        self.context.save()
    }

    /// Marks the record for deletion in its context.
    ///
    /// # Errors
    ///
    /// Fails like [`Context::delete`].
    pub fn delete(&self) -> CoreResult<()> {
        self.context.delete(self)
    }

    /// Returns true while the record's values have not been loaded.
    #[must_use]
    pub fn is_fault(&self) -> bool {
        self.context.is_fault(&self.id)
    }

    /// Returns true if the record was created in its context and not saved yet.
    #[must_use]
    pub fn is_inserted(&self) -> bool {
        self.context.is_inserted(&self.id)
    }

    /// Returns true if the record is marked for deletion.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.context.is_deleted(&self.id)
    }

    /// Returns true if the record has unsaved changes.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.context.is_dirty(&self.id)
    }

    /// Returns a copy of every set property.
    pub fn snapshot(&self) -> CoreResult<Row> {
        self.context.with_values(&self.id, Row::clone)
    }

    fn schema(&self) -> CoreResult<&EntitySchema> {
        Ok(self.context.store().model().entity(self.id.entity())?)
    }

    /// Reads one property.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownProperty`] if the entity declares no such
    /// attribute or relationship.
    pub fn value(&self, property: &str) -> CoreResult<Option<AttributeValue>> {
        if !self.schema()?.has_property(property) {
            return Err(CoreError::unknown_property(self.entity(), property));
        }
        self.context
            .with_values(&self.id, |row| row.get(property).cloned())
    }

    /// Writes one attribute. `None` clears it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownProperty`] if the entity declares no such
    /// attribute. Relationships are set through
    /// [`set_relationship`](Self::set_relationship) and
    /// [`add_related`](Self::add_related).
    pub fn set_value(&self, property: &str, value: Option<AttributeValue>) -> CoreResult<()> {
        if self.schema()?.attribute_type(property).is_none() {
            return Err(CoreError::unknown_property(self.entity(), property));
        }
        self.context.set_property(&self.id, property, value)
    }

    /// Coerces a raw JSON value to the attribute's declared type and writes it.
    ///
    /// Structured values of transformable attributes are encoded through
    /// their transformer. A value the transformer rejects is not written and
    /// the attribute keeps its current value.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownProperty`] if the entity declares no such
    /// attribute.
    pub fn set_json(&self, property: &str, raw: &Value) -> CoreResult<()> {
        let ty = self
            .schema()?
            .attribute_type(property)
            .cloned()
            .ok_or_else(|| CoreError::unknown_property(self.entity(), property))?;
        let value = match (&ty, coerce(&ty, raw)) {
            (AttributeType::Transformable { transformer }, Some(AttributeValue::Json(structured))) => {
                let Some(encoded) =
                    encode_blob(transformer, &structured, self.context.transformers())
                else {
                    warn!(entity = self.entity(), property, "structured value not stored");
                    return Ok(());
                };
                Some(AttributeValue::Binary(encoded))
            }
            (_, coerced) => coerced,
        };
        self.set_value(property, value)
    }

    /// Reads a string attribute.
    ///
    /// # Errors
    ///
    /// Fails like [`value`](Self::value).
    pub fn string(&self, property: &str) -> CoreResult<Option<String>> {
        Ok(self
            .value(property)?
            .and_then(|v| v.as_str().map(str::to_string)))
    }

    /// Reads an integer attribute.
    ///
    /// # Errors
    ///
    /// Fails like [`value`](Self::value).
    pub fn integer(&self, property: &str) -> CoreResult<Option<i64>> {
        Ok(self.value(property)?.and_then(|v| v.as_i64()))
    }

    /// Reads a float attribute. Integers widen.
    ///
    /// # Errors
    ///
    /// Fails like [`value`](Self::value).
    pub fn float(&self, property: &str) -> CoreResult<Option<f64>> {
        Ok(self.value(property)?.and_then(|v| v.as_f64()))
    }

    /// Reads a boolean attribute.
    ///
    /// # Errors
    ///
    /// Fails like [`value`](Self::value).
    pub fn boolean(&self, property: &str) -> CoreResult<Option<bool>> {
        Ok(self.value(property)?.and_then(|v| v.as_bool()))
    }

    /// Reads a date attribute.
    ///
    /// # Errors
    ///
    /// Fails like [`value`](Self::value).
    pub fn date(&self, property: &str) -> CoreResult<Option<DateTime<Utc>>> {
        Ok(self.value(property)?.and_then(|v| v.as_date()))
    }

    /// Reads a transformable attribute as its structured value.
    ///
    /// Bytes the transformer cannot decode read as absent.
    ///
    /// # Errors
    ///
    /// Fails like [`value`](Self::value).
    pub fn structured(&self, property: &str) -> CoreResult<Option<Value>> {
        let ty = self.schema()?.attribute_type(property).cloned();
        Ok(match (ty, self.value(property)?) {
            (Some(AttributeType::Transformable { transformer }), Some(AttributeValue::Binary(bytes))) => {
                decode_blob(&transformer, &bytes, self.context.transformers())
            }
            (_, Some(AttributeValue::Json(value))) => Some(value),
            _ => None,
        })
    }

    fn relationship(&self, name: &str, to_many: bool) -> CoreResult<Relationship> {
        let relationship = self
            .schema()?
            .relationship_named(name)
            .cloned()
            .ok_or_else(|| CoreError::unknown_property(self.entity(), name))?;
        if relationship.to_many != to_many {
            let kind = if relationship.to_many { "to-many" } else { "to-one" };
            return Err(CoreError::invalid_operation(format!(
                "{}.{name} is a {kind} relationship",
                self.entity()
            )));
        }
        Ok(relationship)
    }

    fn check_target(&self, relationship: &Relationship, other: &Record) -> CoreResult<()> {
        if other.entity() != relationship.target {
            return Err(CoreError::invalid_operation(format!(
                "expected a {} record, got {}",
                relationship.target,
                other.entity()
            )));
        }
        if !self.context.same_context(other.context()) {
            return Err(CoreError::invalid_operation(
                "related records must share a context",
            ));
        }
        Ok(())
    }

    /// Sets or clears a to-one relationship.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownProperty`] for an undeclared relationship
    /// and [`CoreError::InvalidOperation`] for the wrong cardinality or a
    /// target of another entity or context.
    pub fn set_relationship(&self, name: &str, other: Option<&Record>) -> CoreResult<()> {
        let relationship = self.relationship(name, false)?;
        let value = match other {
            Some(other) => {
                self.check_target(&relationship, other)?;
                Some(AttributeValue::Reference(other.id.clone()))
            }
            None => None,
        };
        self.context.set_property(&self.id, name, value)
    }

    /// Adds a record to a to-many relationship. Adding twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownProperty`] for an undeclared relationship
    /// and [`CoreError::InvalidOperation`] for the wrong cardinality or a
    /// target of another entity or context.
    pub fn add_related(&self, name: &str, other: &Record) -> CoreResult<()> {
        let relationship = self.relationship(name, true)?;
        self.check_target(&relationship, other)?;
        let mut ids = self
            .context
            .with_values(&self.id, |row| {
                row.get(name)
                    .and_then(|v| v.as_references().map(<[ObjectId]>::to_vec))
            })?
            .unwrap_or_default();
        if ids.contains(&other.id) {
            return Ok(());
        }
        ids.push(other.id.clone());
        self.context
            .set_property(&self.id, name, Some(AttributeValue::References(ids)))
    }

    /// Removes a record from a to-many relationship.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownProperty`] for an undeclared relationship
    /// and [`CoreError::InvalidOperation`] for the wrong cardinality or a
    /// target of another entity or context.
    pub fn remove_related(&self, name: &str, other: &Record) -> CoreResult<()> {
        self.relationship(name, true)?;
        let ids = self.context.with_values(&self.id, |row| {
            row.get(name)
                .and_then(|v| v.as_references().map(<[ObjectId]>::to_vec))
        })?;
        let Some(mut ids) = ids else {
            return Ok(());
        };
        ids.retain(|id| id != &other.id);
        let value = (!ids.is_empty()).then_some(AttributeValue::References(ids));
        self.context.set_property(&self.id, name, value)
    }

    /// Returns the record a to-one relationship points at.
    ///
    /// A reference to a deleted object reads as `None`.
    pub fn related_one(&self, name: &str) -> CoreResult<Option<Record>> {
        self.relationship(name, false)?;
        let target = self.context.with_values(&self.id, |row| {
            row.get(name).and_then(|v| v.as_reference().cloned())
        })?;
        Ok(target.and_then(|id| self.context.object(&id).ok()))
    }

    /// Returns the records of a to-many relationship, skipping deleted ones.
    pub fn related(&self, name: &str) -> CoreResult<Vec<Record>> {
        self.relationship(name, true)?;
        let ids = self.context.with_values(&self.id, |row| {
            row.get(name)
                .and_then(|v| v.as_references().map(<[ObjectId]>::to_vec))
                .unwrap_or_default()
        })?;
        Ok(ids
            .iter()
            .filter_map(|id| self.context.object(id).ok())
            .collect())
    }

    /// Renders the record back into a JSON element using (element, property)
    /// pairs.
    ///
    /// Unset properties and values that cannot be rendered are left out.
    pub fn to_response_element<E, P>(&self, mapping: &[(E, P)]) -> CoreResult<Map<String, Value>>
    where
        E: AsRef<str>,
        P: AsRef<str>,
    {
        let schema = self.schema()?;
        let row = self.snapshot()?;
        let transformers = self.context.transformers();
        let mut element = Map::new();
        for (key, property) in mapping {
            let property = property.as_ref();
            let Some(value) = row.get(property) else {
                continue;
            };
            if let Some(json) = to_json(schema.attribute_type(property), value, transformers) {
                element.insert(key.as_ref().to_string(), json);
            }
        }
        Ok(element)
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.context.same_context(&other.context)
    }
}

impl Eq for Record {}
