//! JSON marshalling across contexts, privacy rules and typed models.

use std::sync::OnceLock;

use serde_json::{Value as JsonValue, json};

use docmodel::{memory::InMemoryStore, prelude::*};

fn contact() -> ModelClass {
    ModelClass::builder("ContextContact")
        .json("firstName", FieldOptions::named("fn"))
        .json("firstName", FieldOptions::named("fn1").context("ctx1"))
        .json("email", FieldOptions::new().wildcard())
        .json("password", FieldOptions::new())
        .privacy("password", Privacy::Private)
        .privacy_in("email", "public", Privacy::Private)
        .build()
        .unwrap()
}

#[test]
fn test_contexts_are_isolated() {
    let class = contact();

    let from_default = class
        .from_json(&json!({ "fn": "Ada", "fn1": "ignored" }), DEFAULT_CONTEXT)
        .unwrap()
        .unwrap();
    assert_eq!(from_default.get_str("firstName"), Some("Ada"));

    let from_ctx1 = class
        .from_json(&json!({ "fn": "ignored", "fn1": "Grace" }), "ctx1")
        .unwrap()
        .unwrap();
    assert_eq!(from_ctx1.get_str("firstName"), Some("Grace"));

    assert_eq!(from_default.to_json(DEFAULT_CONTEXT), json!({ "fn": "Ada" }));
    assert_eq!(from_default.to_json("ctx1"), json!({ "fn1": "Ada" }));
    // No mapping in an unknown context, and no wildcard for firstName
    assert_eq!(from_default.to_json("other"), json!({}));
}

#[test]
fn test_wildcard_mapping_and_privacy() {
    let class = contact();
    let ada = class
        .instantiate()
        .with("firstName", "Ada")
        .with("email", "ada@example.com")
        .with("password", "secret");

    assert_eq!(
        ada.to_json(DEFAULT_CONTEXT),
        json!({ "fn": "Ada", "email": "ada@example.com" })
    );
    assert_eq!(ada.to_json("other"), json!({ "email": "ada@example.com" }));
    assert_eq!(ada.to_json("public"), json!({}));
}

#[test]
fn test_parse_then_render_nested_arrays() {
    let line = ModelClass::builder("OrderLine")
        .json("sku", FieldOptions::named("s"))
        .json("quantity", FieldOptions::named("q"))
        .build()
        .unwrap();
    let order = ModelClass::builder("Order")
        .property(Property::models("lines", &line))
        .json("lines", FieldOptions::new())
        .property(Property::date("placedAt"))
        .json("placedAt", FieldOptions::named("placed"))
        .build()
        .unwrap();

    let input = json!({
        "lines": [{ "s": "A-1", "q": 2 }, "not an object", { "s": "B-2", "q": 1 }],
        "placed": "2024-03-01T10:00:00.000Z",
    });
    let parsed = order.from_json(&input, DEFAULT_CONTEXT).unwrap().unwrap();

    let lines = parsed.get_models("lines");
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[1].get_str("sku"), Some("B-2"));
    assert!(parsed.get("placedAt").and_then(Value::as_datetime).is_some());

    assert_eq!(
        parsed.to_json(DEFAULT_CONTEXT),
        json!({
            "lines": [{ "s": "A-1", "q": 2 }, { "s": "B-2", "q": 1 }],
            "placed": "2024-03-01T10:00:00.000Z",
        })
    );
}

#[test]
fn test_non_object_input() {
    let class = contact();

    assert!(class.from_json(&json!("Ada"), DEFAULT_CONTEXT).unwrap().is_none());
    assert!(class.from_json_array(&json!({ "fn": "Ada" }), DEFAULT_CONTEXT).unwrap().is_empty());
    assert_eq!(
        class
            .from_json_array(&json!([{ "fn": "Ada" }, 3, { "fn": "Grace" }]), DEFAULT_CONTEXT)
            .unwrap()
            .len(),
        2
    );
}

struct Author(ModelInstance);

impl Model for Author {
    fn class() -> ModelClass {
        static CLASS: OnceLock<ModelClass> = OnceLock::new();
        CLASS
            .get_or_init(|| {
                ModelClass::builder("TypedAuthor")
                    .db_config(DbConfig::new("authors"))
                    .field("name", FieldOptions::new())
                    .build()
                    .unwrap()
            })
            .clone()
    }

    fn from_instance(instance: ModelInstance) -> Self {
        Author(instance)
    }

    fn instance(&self) -> &ModelInstance {
        &self.0
    }

    fn instance_mut(&mut self) -> &mut ModelInstance {
        &mut self.0
    }

    fn to_json(&self, context: &str) -> JsonValue {
        json!({ "author": self.instance().to_json(context) })
    }
}

#[tokio::test]
async fn test_typed_model_persistence() {
    let odm = Odm::builder()
        .store("default", InMemoryStore::new())
        .build();
    odm.register(&Author::class());

    let mut ada = Author::from_json(&json!({ "name": "Ada" }), DEFAULT_CONTEXT)
        .unwrap()
        .unwrap();
    ada.create().await.unwrap();

    let found = Author::get(Query::filtered(Filter::eq("name", "Ada"))).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(
        found[0].to_json(DEFAULT_CONTEXT)["author"]["name"],
        json!("Ada")
    );

    let id = ada.instance().id().cloned();
    assert_eq!(Author::remove_by_id(id).await.unwrap().deleted_count, 1);
    assert_eq!(Author::count(None).await.unwrap(), 0);
}
