use std::collections::HashMap;

use symcodec::container::render::RECURSION_SENTINEL;
use symcodec::container::FLAGS_MARKER;
use symcodec::diagnostics::RenderSettings;
use symcodec::{container, Container, ConstructError, EnumValue, ListContainer, SharedContainer, Value};

#[test]
fn test_equality_ignores_private_entries() {
    let parsed = container! { "a" => 1, "_io" => "stream handle" };
    let mut expected = HashMap::new();
    expected.insert("a".to_string(), Value::Int(1));
    assert_eq!(parsed, expected);
    assert!(parsed.equals(&expected));

    expected.insert("b".to_string(), Value::Int(2));
    assert!(!parsed.equals(&expected));
}

#[test]
fn test_numeric_arrays_compare_element_wise() {
    let a = container! { "samples" => vec![Value::from(1), Value::from(2.0)] };
    let b = container! { "samples" => vec![Value::from(1.0), Value::from(2)] };
    assert_eq!(a, b);
    let c = container! { "samples" => vec![Value::from(1)] };
    assert_ne!(a, c);
}

#[test]
fn test_get_and_remove_failures() {
    let mut c = Container::new();
    assert!(matches!(c.get("x"), Err(ConstructError::KeyNotFound(_))));
    assert!(matches!(c.remove_last(), Err(ConstructError::EmptyContainer)));
    c.set("x", 1);
    assert_eq!(c.get("x").unwrap(), &Value::Int(1));
    assert_eq!(c.remove("x").unwrap(), Value::Int(1));
    assert!(c.is_empty());
}

#[test]
fn test_compact_render_omits_private_entries() {
    let c = container! { "a" => 1, "_hidden" => 2, "name" => "xy" };
    assert_eq!(c.render_compact(), r#"Container(a=1, name="xy" (total 2))"#);
}

#[test]
fn test_expanded_render_nests_lists_and_records() {
    let c = container! {
        "header" => container! { "magic" => b"MZ" },
        "items" => vec![Value::from(1), Value::from(container! { "k" => EnumValue::Unknown(3) })],
    };
    let settings = RenderSettings::default();
    let text = c.render_expanded_with(&settings);
    let expected = [
        "Container: ",
        "    header = Container: ",
        "        magic = b\"MZ\" (total 2)",
        "    items = ListContainer: ",
        "        1",
        "        Container: ",
        "            k = (enum) (unknown) 3",
    ]
    .join("\n");
    assert_eq!(text, expected);
}

#[test]
fn test_flags_render_respects_settings() {
    let flags = container! { FLAGS_MARKER => true, "a" => true, "b" => false };
    let quiet = flags.render_expanded_with(&RenderSettings::default());
    assert!(!quiet.contains("b = "));
    let loud = flags.render_expanded_with(&RenderSettings { false_flags: true, ..Default::default() });
    assert!(loud.contains("b = false"));
}

#[test]
fn test_self_reference_renders_sentinel_then_recovers() {
    let shared = SharedContainer::new(container! { "name" => "loop" });
    shared.write().set("me", shared.clone());

    let text = shared.read().render_expanded_with(&RenderSettings::default());
    assert!(text.contains(&format!("me = {RECURSION_SENTINEL}")));
    assert_eq!(format!("{:?}", shared.read()).matches(RECURSION_SENTINEL).count(), 1);

    // a later, unrelated render is not blocked by the first one
    let again = shared.read().render_expanded_with(&RenderSettings::default());
    assert_eq!(text, again);

    // equality over the cycle terminates
    assert_eq!(Value::Shared(shared.clone()), Value::Shared(shared.clone()));
    shared.write().remove("me").unwrap();
}

#[test]
fn test_search_and_search_recursive() {
    let c = container! {
        "id" => 1,
        "children" => vec![
            Value::from(container! { "id" => 2, "tag" => "x" }),
            Value::from(container! { "id" => 3 }),
        ],
        "meta" => container! { "identity" => "root" },
    };
    assert_eq!(c.search("id").unwrap(), Some(Value::Int(1)));
    assert_eq!(c.search("tag").unwrap(), None);
    assert_eq!(
        c.search_recursive("id").unwrap(),
        vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::from("root")]
    );
    assert_eq!(c.search_recursive("id$").unwrap().len(), 3);

    let list = c["children"].as_list().unwrap();
    assert_eq!(list.search("t").unwrap(), Some(Value::from("x")));
    assert_eq!(list.search_recursive("id").unwrap().len(), 2);
}

#[test]
fn test_search_skips_locked_shared_container() {
    let shared = SharedContainer::new(container! { "id" => 9 });
    let c = container! { "id" => 1, "inner" => shared.clone() };
    let guard = shared.write();
    assert_eq!(c.search_recursive("id").unwrap(), vec![Value::Int(1)]);
    drop(guard);
    assert_eq!(c.search_recursive("id").unwrap(), vec![Value::Int(1), Value::Int(9)]);
}

#[test]
fn test_list_container_operations() {
    let mut list = ListContainer::new();
    list.push(1);
    list.push("two");
    assert_eq!(list.len(), 2);
    assert_eq!(list[1], Value::from("two"));
    assert_eq!(list.iter().count(), 2);
    assert_eq!(list.render_compact(), r#"ListContainer([1, "two" (total 3)])"#);
    assert_eq!(list.pop(), Some(Value::from("two")));
}

#[test]
fn test_json_persistence_round_trip() {
    let original = container! {
        "count" => 2,
        "ratio" => 0.5,
        "payload" => vec![Value::from(b"\x00\xff"), Value::from("abc")],
        "nested" => container! { "flag" => true, "none" => Value::None },
        "kind" => EnumValue::Known { name: "ok".into(), value: 0 },
    };
    let bytes = original.to_json_bytes().unwrap();
    let restored = Container::from_json_bytes(&bytes).unwrap();
    assert_eq!(restored, original);
    assert_eq!(restored.keys().collect::<Vec<_>>(), ["count", "ratio", "payload", "nested", "kind"]);
}
