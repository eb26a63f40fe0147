use pano::entity::EntityType;
use pano::graph::InvestigationGraph;
use pano::registry::PluginRegistry;
use pano::schema::{FieldSpec, Properties, PropertyKind, PropertyValue};
use pano::EntityId;
use std::sync::Arc;

fn props(pairs: &[(&str, PropertyValue)]) -> Properties {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn builtin_graph() -> InvestigationGraph {
    InvestigationGraph::new(Arc::new(PluginRegistry::with_builtins().unwrap()))
}

/// Registry holding only a minimal Email and Location.
fn minimal_registry() -> Arc<PluginRegistry> {
    let mut registry = PluginRegistry::new();
    let email = EntityType::builder("Email")
        .field(FieldSpec::new("address", PropertyKind::string()))
        .field(FieldSpec::new("verified", PropertyKind::Boolean))
        .label(&["address"])
        .key(&["address"])
        .build()
        .unwrap();
    let location = EntityType::builder("Location")
        .field(FieldSpec::new("address", PropertyKind::string()))
        .label(&["address"])
        .key(&["address"])
        .build()
        .unwrap();
    registry.register_entity_type(email).unwrap();
    registry.register_entity_type(location).unwrap();
    Arc::new(registry)
}

#[test]
fn email_location_scenario() {
    let mut graph = InvestigationGraph::new(minimal_registry());

    let first = graph
        .add_entity("Email", props(&[("address", "a@b.com".into())]))
        .unwrap();
    let second = graph
        .add_entity("Email", props(&[("address", "a@b.com".into())]))
        .unwrap();
    assert_eq!(first.id(), second.id());
    assert_eq!(graph.all_entities(Some("Email")).len(), 1);
    assert_eq!(
        graph.entity(first.id()).unwrap().property("address"),
        Some(&PropertyValue::from("a@b.com"))
    );

    let place = graph
        .add_entity("Location", props(&[("address", "Main St 1".into())]))
        .unwrap();
    graph
        .add_relationship(first.id(), place.id(), "associated_with")
        .unwrap();
    graph
        .add_relationship(first.id(), place.id(), "associated_with")
        .unwrap();
    assert_eq!(graph.relationship_count(), 1);

    graph.remove_entity(first.id());
    assert_eq!(graph.relationship_count(), 0);
    assert!(graph.neighbors(place.id(), None).is_empty());
}

#[test]
fn dedup_unions_non_null_properties() {
    let mut graph = builtin_graph();
    let a = graph
        .add_entity("Username", props(&[("username", "jdoe".into())]))
        .unwrap();
    let b = graph
        .add_entity(
            "Username",
            props(&[("username", "JDoe ".into()), ("link", "https://example.org/jdoe".into())]),
        )
        .unwrap();
    let c = graph
        .add_entity(
            "Username",
            props(&[("username", "jdoe".into()), ("link", PropertyValue::Null)]),
        )
        .unwrap();

    assert_eq!(a.id(), b.id());
    assert_eq!(b.id(), c.id());
    assert_eq!(graph.entity_count(), 1);
    let merged = graph.entity(a.id()).unwrap();
    assert_eq!(merged.property_str("username"), "jdoe");
    assert_eq!(merged.property_str("link"), "https://example.org/jdoe");
}

#[test]
fn conflicting_values_keep_existing_and_record_note() {
    let mut graph = builtin_graph();
    let person = graph
        .add_entity_with_source(
            "Person",
            props(&[("full_name", "Jane Doe".into()), ("occupation", "Analyst".into())]),
            "manual",
        )
        .unwrap();
    graph
        .add_entity_with_source(
            "Person",
            props(&[("full_name", "Jane Doe".into()), ("occupation", "Engineer".into())]),
            "Profile Lookup",
        )
        .unwrap();

    let entity = graph.entity(person.id()).unwrap();
    assert_eq!(entity.property_str("occupation"), "Analyst");
    let notes = graph.conflicts(person.id());
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].field, "occupation");
    assert_eq!(notes[0].source, "Profile Lookup");
}

#[test]
fn enrichment_never_takes_another_entitys_key() {
    let mut graph = builtin_graph();
    let coords = graph
        .add_entity(
            "Location",
            props(&[("latitude", "1".into()), ("longitude", "2".into())]),
        )
        .unwrap();
    let street = graph
        .add_entity("Location", props(&[("address", "Main St".into())]))
        .unwrap();
    graph
        .add_entity_with_source(
            "Location",
            props(&[("address", "Main St".into()), ("latitude", "1".into())]),
            "Geocoder",
        )
        .unwrap();
    let merged = graph
        .add_entity_with_source(
            "Location",
            props(&[("address", "Main St".into()), ("longitude", "2".into())]),
            "Geocoder",
        )
        .unwrap();

    assert_eq!(merged.id(), street.id());
    assert_eq!(graph.all_entities(Some("Location")).len(), 2);
    assert_eq!(merged.property_str("latitude"), "1");
    assert_eq!(merged.property("longitude"), None);
    assert_eq!(merged.equality_key(), Some("mainst"));
    assert_ne!(
        merged.equality_key(),
        graph.entity(coords.id()).unwrap().equality_key()
    );

    let notes = graph.conflicts(street.id());
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].field, "longitude");
    assert_eq!(notes[0].existing, serde_json::Value::Null);
    assert_eq!(notes[0].incoming, serde_json::json!("2"));
    assert_eq!(notes[0].source, "Geocoder");

    let json = graph.to_json().unwrap();
    let restored = InvestigationGraph::from_json(graph.registry().clone(), &json).unwrap();
    assert_eq!(restored.all_entities(Some("Location")).len(), 2);
    assert_eq!(restored.to_json().unwrap(), json);
}

#[test]
fn cascade_delete_is_idempotent() {
    let mut graph = builtin_graph();
    let hub = graph
        .add_entity("Person", props(&[("full_name", "Hub Person".into())]))
        .unwrap();
    let mut others = Vec::new();
    for i in 0..5 {
        let text = graph
            .add_entity("Text", props(&[("text", format!("note {i}").into())]))
            .unwrap();
        if i % 2 == 0 {
            graph.add_relationship(hub.id(), text.id(), "wrote").unwrap();
        } else {
            graph.add_relationship(text.id(), hub.id(), "mentions").unwrap();
        }
        others.push(text.id().clone());
    }
    graph.add_relationship(&others[0], &others[1], "precedes").unwrap();
    assert_eq!(graph.relationship_count(), 6);

    assert!(graph.remove_entity(hub.id()).is_some());
    assert!(graph.relationships().all(|r| !r.touches(hub.id())));
    assert_eq!(graph.relationship_count(), 1);

    assert!(graph.remove_entity(hub.id()).is_none());
    assert_eq!(graph.relationship_count(), 1);
    assert_eq!(graph.entity_count(), 5);
}

#[test]
fn json_round_trip_preserves_graph() {
    let mut graph = builtin_graph();
    let email = graph
        .add_entity("Email", props(&[("address", "jane@example.org".into())]))
        .unwrap();
    let user = graph
        .add_entity(
            "Username",
            props(&[("username", "jane".into()), ("platform", "github".into())]),
        )
        .unwrap();
    let phone = graph
        .add_entity(
            "Phone",
            props(&[("number", "5550100".into()), ("country_code", "1".into())]),
        )
        .unwrap();
    graph.add_relationship(email.id(), user.id(), "has_username").unwrap();
    graph
        .add_relationship_with(user.id(), phone.id(), "linked", false, Default::default())
        .unwrap();
    graph
        .set_metadata(email.id(), "tag", serde_json::json!("priority"))
        .unwrap();

    let json = graph.to_json().unwrap();
    let restored =
        InvestigationGraph::from_json(graph.registry().clone(), &json).unwrap();

    assert_eq!(restored.entity_count(), graph.entity_count());
    assert_eq!(restored.relationship_count(), graph.relationship_count());
    for entity in graph.all_entities(None) {
        let twin = restored.entity(entity.id()).expect("id preserved");
        assert_eq!(twin.entity_type(), entity.entity_type());
        assert_eq!(twin.properties(), entity.properties());
        assert_eq!(twin.label(), entity.label());
        assert_eq!(twin.metadata(), entity.metadata());
    }
    for rel in graph.relationships() {
        let twin = restored.relationship(&rel.id).expect("relationship preserved");
        assert_eq!(twin.source_id, rel.source_id);
        assert_eq!(twin.target_id, rel.target_id);
        assert_eq!(twin.kind, rel.kind);
        assert_eq!(twin.directed, rel.directed);
    }
    assert_eq!(restored.to_json().unwrap(), json);
}

#[test]
fn invalid_property_is_rejected_without_side_effects() {
    let mut graph = builtin_graph();
    let err = graph
        .add_entity("Person", props(&[("full_name", "J".into())]))
        .unwrap_err();
    assert!(err.is_schema_error());
    assert!(graph.is_empty());

    let err = graph
        .add_relationship(&EntityId::from("missing"), &EntityId::from("gone"), "knows")
        .unwrap_err();
    assert!(err.to_string().contains("missing"));
}
