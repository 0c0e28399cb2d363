//! Shared fixtures: a user directory model and its descriptors.

#![allow(dead_code)]

use objsync_codec::{LIST_TRANSFORMER, MAP_TRANSFORMER};
use objsync_core::{
    CoreResult, DataStack, DataStackBuilder, EntityDescriptor, Record, Registry, StackConfig,
    SyncEngine, SyncScope,
};
use objsync_store::{AttributeType, AttributeValue, EntitySchema, Model, StoreConfig};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Installs a test subscriber once. `RUST_LOG=objsync_core=debug` shows
/// engine diagnostics.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn model() -> Model {
    Model::builder()
        .entity(
            EntitySchema::new("User")
                .attribute("userId", AttributeType::String)
                .attribute("firstName", AttributeType::String)
                .attribute("lastName", AttributeType::String)
                .attribute("gender", AttributeType::String)
                .attribute("dateOfBirth", AttributeType::Date)
                .attribute("email", AttributeType::String)
                .attribute("phone", AttributeType::String)
                .attribute("website", AttributeType::String)
                .attribute("address", AttributeType::transformable(MAP_TRANSFORMER))
                .attribute("status", AttributeType::String)
                .to_one("link", "UserLink"),
        )
        .entity(
            EntitySchema::new("UserLink")
                .attribute("primaryKey", AttributeType::String)
                .attribute("selfLink", AttributeType::String)
                .attribute("editLink", AttributeType::String)
                .attribute("avatarLink", AttributeType::String),
        )
        .entity(
            EntitySchema::new("Reading")
                .attribute("readingId", AttributeType::Integer)
                .attribute("value", AttributeType::Float)
                .attribute("active", AttributeType::Boolean)
                .attribute("label", AttributeType::String)
                .attribute("takenAt", AttributeType::Date)
                .attribute("tags", AttributeType::transformable(LIST_TRANSFORMER)),
        )
        .entity(
            EntitySchema::new("Membership")
                .attribute("orgId", AttributeType::String)
                .attribute("memberId", AttributeType::String)
                .attribute("role", AttributeType::String),
        )
        .entity(
            EntitySchema::new("Tag")
                .attribute("code", AttributeType::String)
                .attribute("title", AttributeType::String),
        )
        .build()
        .unwrap()
}

pub struct UserDescriptor;

impl EntityDescriptor for UserDescriptor {
    fn entity_name(&self) -> &str {
        "User"
    }

    fn default_sort_key(&self) -> &str {
        "firstName"
    }

    fn use_ascending_sort(&self) -> bool {
        true
    }

    fn element_to_property_mapping(&self) -> &[(&str, &str)] {
        &[
            ("id", "userId"),
            ("first_name", "firstName"),
            ("last_name", "lastName"),
            ("gender", "gender"),
            ("dob", "dateOfBirth"),
            ("email", "email"),
            ("phone", "phone"),
            ("website", "website"),
            ("address", "address"),
            ("status", "status"),
        ]
    }

    fn primary_key_property(&self) -> &str {
        "userId"
    }

    fn primary_key_element(&self) -> &str {
        "id"
    }

    fn mapped_to_element(&self) -> Option<&str> {
        Some("result")
    }

    fn insert_related_entities(
        &self,
        record: &Record,
        element: &Map<String, Value>,
        scope: &SyncScope,
    ) -> CoreResult<()> {
        let Some(Value::Object(links)) = element.get("_links") else {
            return Ok(());
        };
        let link = scope.insert("UserLink", links)?;
        link.set_value("primaryKey", record.value("userId")?)?;
        record.set_relationship("link", Some(&link))
    }
}

pub struct UserLinkDescriptor;

impl EntityDescriptor for UserLinkDescriptor {
    fn entity_name(&self) -> &str {
        "UserLink"
    }

    fn default_sort_key(&self) -> &str {
        "selfLink"
    }

    fn use_ascending_sort(&self) -> bool {
        false
    }

    fn element_to_property_mapping(&self) -> &[(&str, &str)] {
        &[
            ("self", "selfLink"),
            ("edit", "editLink"),
            ("avatar", "avatarLink"),
        ]
    }

    fn primary_key_property(&self) -> &str {
        "primaryKey"
    }

    fn primary_key_element(&self) -> &str {
        ""
    }

    fn mapped_to_element(&self) -> Option<&str> {
        Some("_links")
    }
}

pub struct ReadingDescriptor;

impl EntityDescriptor for ReadingDescriptor {
    fn entity_name(&self) -> &str {
        "Reading"
    }

    fn default_sort_key(&self) -> &str {
        "takenAt"
    }

    fn use_ascending_sort(&self) -> bool {
        true
    }

    fn element_to_property_mapping(&self) -> &[(&str, &str)] {
        &[
            ("id", "readingId"),
            ("value", "value"),
            ("active", "active"),
            ("label", "label"),
            ("taken_at", "takenAt"),
            ("tags", "tags"),
        ]
    }

    fn primary_key_property(&self) -> &str {
        "readingId"
    }

    fn primary_key_element(&self) -> &str {
        "id"
    }
}

pub struct MembershipDescriptor;

impl EntityDescriptor for MembershipDescriptor {
    fn entity_name(&self) -> &str {
        "Membership"
    }

    fn default_sort_key(&self) -> &str {
        "memberId"
    }

    fn use_ascending_sort(&self) -> bool {
        true
    }

    fn element_to_property_mapping(&self) -> &[(&str, &str)] {
        &[("org", "orgId"), ("member", "memberId"), ("role", "role")]
    }

    fn primary_key_property(&self) -> &str {
        "orgId,memberId"
    }

    fn primary_key_element(&self) -> &str {
        "org,member"
    }

    fn has_composite_primary_key(&self) -> bool {
        true
    }

    fn mapped_to_element(&self) -> Option<&str> {
        Some("members")
    }
}

pub struct TagDescriptor;

impl EntityDescriptor for TagDescriptor {
    fn entity_name(&self) -> &str {
        "Tag"
    }

    fn default_sort_key(&self) -> &str {
        "code"
    }

    fn use_ascending_sort(&self) -> bool {
        true
    }

    fn element_to_property_mapping(&self) -> &[(&str, &str)] {
        &[("code", "code"), ("title", "title")]
    }

    fn primary_key_property(&self) -> &str {
        "code"
    }

    fn primary_key_element(&self) -> &str {
        "code"
    }

    fn is_case_insensitive_search(&self) -> bool {
        true
    }
}

pub fn registry(model: &Model) -> Registry {
    Registry::builder()
        .register(UserDescriptor)
        .register(UserLinkDescriptor)
        .register(ReadingDescriptor)
        .register(MembershipDescriptor)
        .register(TagDescriptor)
        .build(model)
        .unwrap()
}

pub fn open_stack_with(config: StackConfig) -> Arc<DataStack> {
    init_tracing();
    Arc::new(
        DataStackBuilder::new(model())
            .config(config)
            .open()
            .unwrap(),
    )
}

pub fn open_stack() -> Arc<DataStack> {
    open_stack_with(StackConfig::default().store(StoreConfig::in_memory()))
}

pub fn engine_for(stack: Arc<DataStack>) -> SyncEngine {
    let registry = registry(stack.model());
    SyncEngine::new(stack, Arc::new(registry))
}

pub fn engine() -> SyncEngine {
    engine_for(open_stack())
}

pub fn text(record: &Record, property: &str) -> Option<String> {
    record.string(property).unwrap()
}

pub fn string_value(value: &str) -> AttributeValue {
    AttributeValue::from(value)
}
