use anyhow::Result;
use kylie::{Discriminated, Field, KylieError, ModelType, Relation, Resolver, Value};
use serde_json::json;
use std::sync::Arc;

struct Pets {
    dog: Arc<ModelType>,
    cow: Arc<ModelType>,
    owner: Arc<ModelType>,
}

fn pets() -> Pets {
    let cow = ModelType::builder("Cow")
        .tag("cow")
        .tag_key("__type__")
        .build()
        .unwrap();
    let dog = ModelType::builder("Dog")
        .tag("dog")
        .tag_key("__type__")
        .field(Field::new("wagging").optional())
        .build()
        .unwrap();
    let owner = ModelType::builder("PetOwner")
        .field(Relation::new(
            "cow_or_dog",
            Discriminated::new().variant("cow", &cow).variant("dog", &dog),
        ))
        .build()
        .unwrap();
    Pets { dog, cow, owner }
}

#[test]
fn test_basic_type_switching() -> Result<()> {
    let pets = pets();
    let owner = pets.owner.deserialize(&json!({"cow_or_dog": {"__type__": "cow"}}))?;
    let pet = owner.get("cow_or_dog").and_then(Value::as_model).unwrap();
    assert!(pet.is(&pets.cow));
    Ok(())
}

#[test]
fn test_switch_loads_attributes_properly() -> Result<()> {
    let pets = pets();
    let owner = pets
        .owner
        .deserialize(&json!({"cow_or_dog": {"__type__": "dog", "wagging": true}}))?;
    let pet = owner.get("cow_or_dog").and_then(Value::as_model).unwrap();
    assert!(pet.is(&pets.dog));
    assert_eq!(pet.get("wagging").and_then(Value::as_bool), Some(true));
    Ok(())
}

#[test]
fn test_missing_type_fails() {
    let pets = pets();
    let result = pets.owner.deserialize(&json!({"cow_or_dog": {"missing_type": true}}));
    assert!(matches!(
        result,
        Err(KylieError::UnknownDiscriminator { value: None, .. })
    ));
}

#[test]
fn test_unregistered_type_fails() {
    let pets = pets();
    let result = pets.owner.deserialize(&json!({"cow_or_dog": {"__type__": "fish"}}));
    match result {
        Err(KylieError::UnknownDiscriminator { key, value }) => {
            assert_eq!(key, "__type__");
            assert_eq!(value.as_deref(), Some("fish"));
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_serialize_writes_discriminator_back() -> Result<()> {
    let pets = pets();
    let data = json!({"cow_or_dog": {"wagging": false, "__type__": "dog"}});
    let owner = pets.owner.deserialize(&data)?;
    assert_eq!(owner.serialize()?, data);

    let constructed = pets
        .owner
        .new_instance()
        .with("cow_or_dog", pets.cow.new_instance());
    assert_eq!(
        constructed.serialize()?,
        json!({"cow_or_dog": {"__type__": "cow"}})
    );
    Ok(())
}

#[test]
fn test_polymorphic_sequence() -> Result<()> {
    let pets = pets();
    let herd = ModelType::builder("Herd")
        .field(Relation::new("animals", Discriminated::from_tags([&pets.dog, &pets.cow])?).sequence())
        .build()?;
    let data = json!({
        "animals": [
            {"__type__": "cow"},
            {"__type__": "dog", "wagging": true},
            {"__type__": "cow"}
        ]
    });
    let instance = herd.deserialize(&data)?;
    let kinds: Vec<&str> = instance
        .get("animals")
        .and_then(Value::as_models)
        .unwrap()
        .iter()
        .map(|animal| animal.model_name())
        .collect();
    assert_eq!(kinds, vec!["Cow", "Dog", "Cow"]);
    assert_eq!(instance.serialize()?, data);
    Ok(())
}

#[test]
fn test_custom_discriminator_key() -> Result<()> {
    let pets = pets();
    let owner = ModelType::builder("Farmer")
        .field(
            Relation::new(
                "animal",
                Discriminated::new().key("kind").variant("dog", &pets.dog),
            )
            .optional(),
        )
        .build()?;

    let farmer = owner.deserialize(&json!({"animal": {"kind": "dog"}}))?;
    assert_eq!(
        farmer.get("animal").and_then(Value::as_model).map(|a| a.model_name()),
        Some("Dog")
    );

    let nobody = owner.deserialize(&json!({}))?;
    assert_eq!(nobody.get("animal"), Some(&Value::Null));
    assert_eq!(nobody.serialize()?, json!({"animal": null}));
    Ok(())
}

#[test]
fn test_custom_resolver_function() -> Result<()> {
    let pets = pets();
    let (dog, cow) = (pets.dog.clone(), pets.cow.clone());
    let guesser = Resolver::custom(move |data| {
        if data.contains_key("wagging") {
            Ok(dog.clone())
        } else if data.is_empty() {
            Ok(cow.clone())
        } else {
            Err(KylieError::UnknownDiscriminator {
                key: "wagging".to_string(),
                value: None,
            })
        }
    });
    let owner = ModelType::builder("Guesser")
        .field(Relation::new("pet", guesser))
        .build()?;

    let guessed = owner.deserialize(&json!({"pet": {"wagging": true}}))?;
    assert!(guessed
        .get("pet")
        .and_then(Value::as_model)
        .unwrap()
        .is(&pets.dog));
    assert!(owner.deserialize(&json!({"pet": {"moo": 1}})).is_err());
    Ok(())
}

#[test]
fn test_models_sharing_a_tag_are_rejected() {
    let pets = pets();
    let puppy = ModelType::builder("Puppy")
        .tag("dog")
        .tag_key("__type__")
        .build()
        .unwrap();

    assert!(matches!(
        Discriminated::from_tags([&pets.dog, &puppy]),
        Err(KylieError::DuplicateTag { .. })
    ));

    let owner = ModelType::builder("Breeder")
        .field(Relation::new(
            "pet",
            Discriminated::new().variant("dog", &pets.dog).variant("dog", &puppy),
        ))
        .build();
    match owner {
        Err(KylieError::DuplicateTag { tag, first, second }) => {
            assert_eq!(tag, "dog");
            assert_eq!(first, "Dog");
            assert_eq!(second, "Puppy");
        }
        other => panic!("unexpected result: {:?}", other),
    }
}
