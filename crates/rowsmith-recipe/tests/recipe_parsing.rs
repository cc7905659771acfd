use std::path::PathBuf;

use rowsmith_recipe::{
    CountExpr, FakeKind, FakerCall, Formula, LiteralValue, RecipeError, Selector, load_recipe,
    parse_recipe,
};

fn recipe_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../recipes")
        .join(name)
}

fn syntax_error(text: &str) -> rowsmith_recipe::RecipeSyntaxError {
    match parse_recipe(text, "inline.yml") {
        Err(RecipeError::Syntax(err)) => err,
        other => panic!("expected syntax error, got {other:?}"),
    }
}

#[test]
fn sample_recipes_parse() {
    let recipe = load_recipe(&recipe_path("character_gen.yml")).expect("parse character_gen");
    assert_eq!(recipe.params.len(), 2);
    let objects: Vec<&str> = recipe.templates.iter().map(|t| t.object.as_str()).collect();
    assert_eq!(objects, ["Equipment", "Druid", "Fighter"]);
    assert_eq!(recipe.templates[2].friends[0].object, "Paladin");
    assert!(recipe.source_name.ends_with("character_gen.yml"));

    let recipe = load_recipe(&recipe_path("accounts.yml")).expect("parse accounts");
    assert_eq!(recipe.templates[0].nickname.as_deref(), Some("owner"));
}

#[test]
fn counts_are_classified() {
    let recipe = load_recipe(&recipe_path("character_gen.yml")).expect("parse");
    assert_eq!(recipe.templates[0].count, CountExpr::Constant(2));
    assert_eq!(
        recipe.templates[1].count,
        CountExpr::Param("num_druids".to_string())
    );
    assert_eq!(
        recipe.templates[2].count,
        CountExpr::Param("num_fighters".to_string())
    );
    assert_eq!(recipe.templates[2].friends[0].count, CountExpr::Constant(1));
}

#[test]
fn formula_shapes_are_recognized() {
    let text = r#"
- object: Thing
  fields:
    plain: hello
    number: 7
    flag: true
    empty: null
    name: {fake: first_name}
    seq: {counter}
    other_seq: {counter: Thing}
    pick: {random_choice: [a, b]}
    parent: {reference: {object: Thing, id: 3, field: name}}
    any: {random_reference: Thing}
    label: "{name}-{seq}"
"#;
    let recipe = parse_recipe(text, "inline.yml").expect("parse");
    let fields = &recipe.templates[0].fields;
    let formula = |name: &str| {
        &fields
            .iter()
            .find(|field| field.name == name)
            .expect("field")
            .formula
    };

    assert_eq!(
        formula("plain"),
        &Formula::Literal(LiteralValue::Text("hello".to_string()))
    );
    assert_eq!(formula("number"), &Formula::Literal(LiteralValue::Int(7)));
    assert_eq!(formula("flag"), &Formula::Literal(LiteralValue::Bool(true)));
    assert_eq!(formula("empty"), &Formula::Literal(LiteralValue::Null));
    assert_eq!(
        formula("name"),
        &Formula::Faker(FakerCall::Fake(FakeKind::FirstName))
    );
    assert_eq!(formula("seq"), &Formula::Counter { object: None });
    assert_eq!(
        formula("other_seq"),
        &Formula::Counter {
            object: Some("Thing".to_string())
        }
    );
    match formula("pick") {
        Formula::Faker(FakerCall::RandomChoice(choices)) => assert_eq!(choices.len(), 2),
        other => panic!("unexpected {other:?}"),
    }
    match formula("parent") {
        Formula::Reference(spec) => {
            assert_eq!(spec.target, "Thing");
            assert_eq!(spec.selector, Selector::Id(3));
            assert_eq!(spec.field, "name");
        }
        other => panic!("unexpected {other:?}"),
    }
    match formula("any") {
        Formula::Reference(spec) => {
            assert_eq!(spec.selector, Selector::Random);
            assert_eq!(spec.field, "id");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(formula("label"), Formula::Template(_)));
}

#[test]
fn weighted_choices_accept_percentages() {
    let text = r#"
- object: Account
  fields:
    Tier:
      random_choice: {Gold: 20%, Silver: 80}
"#;
    let recipe = parse_recipe(text, "inline.yml").expect("parse");
    match &recipe.templates[0].fields[0].formula {
        Formula::Faker(FakerCall::RandomChoice(choices)) => {
            assert_eq!(choices[0].weight, 20.0);
            assert_eq!(choices[1].weight, 80.0);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn weights_overflowing_to_infinity_are_rejected() {
    let err = syntax_error(
        r#"
- object: Account
  fields:
    Tier:
      random_choice: {Gold: 1.0e308, Silver: 1.0e308}
"#,
    );
    assert!(err.message.contains("finite total"), "{}", err.message);
}

#[test]
fn conditional_else_defaults_to_null() {
    let text = r#"
- object: Account
  fields:
    Score: 3
    Rank:
      if: "Score > 5"
      then: High
"#;
    let recipe = parse_recipe(text, "inline.yml").expect("parse");
    match &recipe.templates[0].fields[1].formula {
        Formula::Conditional(conditional) => {
            assert_eq!(
                conditional.otherwise,
                Formula::Literal(LiteralValue::Null)
            );
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn malformed_yaml_reports_source_and_line() {
    let err = syntax_error("- object: Account\n  fields: [unclosed\n");
    assert_eq!(err.source_name, "inline.yml");
    assert!(err.line.is_some(), "line should be reported: {err}");
    assert!(err.to_string().starts_with("inline.yml:"));
}

#[test]
fn unknown_formula_key_is_a_syntax_error() {
    let err = syntax_error("- object: Account\n  fields:\n    Name: {faker: first_name}\n");
    assert!(err.message.contains("faker"), "message: {}", err.message);
    assert!(err.line.is_some(), "line should be reported: {err}");
}

#[test]
fn unknown_faker_provider_is_a_syntax_error() {
    let err = syntax_error("- object: Account\n  fields:\n    Name: {fake: spaceship}\n");
    assert!(err.message.contains("spaceship"), "message: {}", err.message);
}

#[test]
fn formula_with_two_kinds_is_rejected() {
    let err = syntax_error(
        "- object: Account\n  fields:\n    Name: {fake: first_name, counter: Account}\n",
    );
    assert!(err.message.contains("more than one"), "message: {}", err.message);
}

#[test]
fn unbalanced_placeholder_is_rejected() {
    let err = syntax_error("- object: Account\n  fields:\n    Name: \"{first\"\n");
    assert!(err.message.contains("unclosed"), "message: {}", err.message);
}

#[test]
fn statement_must_be_object_or_option() {
    let err = syntax_error("- nickname: lonely\n");
    assert!(err.message.contains("either 'object' or 'option'"));

    let err = syntax_error("- object: A\n  option: b\n");
    assert!(err.message.contains("both"));
}

#[test]
fn options_cannot_be_nested() {
    let err = syntax_error("- object: A\n  friends:\n    - option: inner\n");
    assert!(err.message.contains("top level"), "message: {}", err.message);
}

#[test]
fn unknown_statement_key_is_rejected() {
    let err = syntax_error("- object: A\n  colour: blue\n");
    assert!(err.message.contains("colour"), "message: {}", err.message);
}

#[test]
fn empty_recipe_is_rejected() {
    let err = syntax_error("   \n");
    assert_eq!(err.line, None);
}

#[test]
fn missing_file_is_an_io_error() {
    let err = load_recipe(&recipe_path("does_not_exist.yml")).expect_err("missing file");
    assert!(matches!(err, RecipeError::Io { .. }));
}
