//! Per-type realtime metadata and serde-based field access.

use std::any::{type_name, TypeId};
use std::sync::Arc;

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::realtime::error::RealtimeError;

/// How a response type binds to the push hub.
///
/// Field names are the serialized (wire) names of the type's fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealtimeDescriptor {
    pub group_prefix: String,
    pub subscribe_method: String,
    pub unsubscribe_method: String,
    pub id_field: String,
    pub fields: Vec<String>,
}

impl RealtimeDescriptor {
    pub fn new(
        group_prefix: impl Into<String>,
        subscribe_method: impl Into<String>,
        unsubscribe_method: impl Into<String>,
    ) -> Self {
        Self {
            group_prefix: group_prefix.into(),
            subscribe_method: subscribe_method.into(),
            unsubscribe_method: unsubscribe_method.into(),
            id_field: "id".to_string(),
            fields: Vec::new(),
        }
    }

    pub fn with_id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = field.into();
        self
    }

    /// Mark `field` as updatable by pushes.
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        let field = field.into();
        if !self.fields.contains(&field) {
            self.fields.push(field);
        }
        self
    }

    /// Hub group for one entity: `<prefix>_<id>`.
    pub fn group_name(&self, id: &str) -> String {
        format!("{}_{}", self.group_prefix, id)
    }

    /// Push event carrying updates to `field`: `<prefix>_<field>`.
    pub fn event_name(&self, field: &str) -> String {
        format!("{}_{}", self.group_prefix, field)
    }

    pub fn validate(&self) -> Result<(), RealtimeError> {
        let required = [
            ("group prefix", &self.group_prefix),
            ("subscribe method", &self.subscribe_method),
            ("unsubscribe method", &self.unsubscribe_method),
            ("identifier field", &self.id_field),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(RealtimeError::Configuration(format!("{name} must not be empty")));
            }
        }
        if self.fields.is_empty() {
            return Err(RealtimeError::Configuration(
                "descriptor declares no updatable fields".to_string(),
            ));
        }
        if self.fields.contains(&self.id_field) {
            return Err(RealtimeError::Configuration(format!(
                "identifier field '{}' cannot be updatable",
                self.id_field
            )));
        }
        Ok(())
    }
}

/// Descriptors by response type, filled once at startup.
#[derive(Default)]
pub struct RealtimeRegistry {
    descriptors: DashMap<TypeId, Arc<RealtimeDescriptor>>,
}

impl RealtimeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the descriptor for `T`, replacing any earlier one.
    pub fn register<T: 'static>(&self, descriptor: RealtimeDescriptor) -> Result<(), RealtimeError> {
        descriptor.validate()?;
        let previous = self
            .descriptors
            .insert(TypeId::of::<T>(), Arc::new(descriptor));
        if previous.is_some() {
            tracing::warn!(ty = type_name::<T>(), "Replaced realtime descriptor");
        }
        Ok(())
    }

    pub fn get<T: 'static>(&self) -> Option<Arc<RealtimeDescriptor>> {
        self.descriptors
            .get(&TypeId::of::<T>())
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Read one serialized field of `entity`.
pub(crate) fn read_field<T: Serialize>(entity: &T, field: &str) -> Result<Option<Value>, RealtimeError> {
    match serde_json::to_value(entity)? {
        Value::Object(mut map) => Ok(map.remove(field)),
        _ => Err(RealtimeError::Protocol(format!(
            "{} does not serialize as an object",
            type_name::<T>()
        ))),
    }
}

/// Replace one serialized field of `entity` with `value`.
///
/// `entity` is left untouched if the result does not deserialize.
pub(crate) fn write_field<T>(entity: &mut T, field: &str, value: Value) -> Result<(), RealtimeError>
where
    T: Serialize + DeserializeOwned,
{
    let mut map = match serde_json::to_value(&*entity)? {
        Value::Object(map) => map,
        _ => {
            return Err(RealtimeError::Protocol(format!(
                "{} does not serialize as an object",
                type_name::<T>()
            )))
        }
    };
    map.insert(field.to_string(), value);
    *entity = serde_json::from_value(Value::Object(map)).map_err(|e| {
        RealtimeError::Protocol(format!("value for field '{field}' rejected: {e}"))
    })?;
    Ok(())
}

/// Identifier as compared between an entity and a push.
pub(crate) fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
