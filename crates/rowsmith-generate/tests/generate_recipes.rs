use std::collections::BTreeSet;
use std::path::PathBuf;

use rowsmith_generate::{
    DebugOutputStream, Fields, GenerateOptions, GenerationContext, GenerationEngine,
    GenerationError, GenerationReport, LocaleKey, OutputError, OutputStream, Params,
    TemplateState, Value, evaluate, generate,
};
use rowsmith_recipe::{FakerCall, Formula, LiteralValue, RecipeError, WeightedChoice, load_recipe};

const SEED: u64 = 42;

fn params(pairs: &[(&str, Value)]) -> Params {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

fn run_with(
    text: &str,
    pairs: &[(&str, Value)],
) -> (Result<GenerationReport, GenerationError>, DebugOutputStream) {
    let mut out = DebugOutputStream::new();
    let result = generate(text, "inline.yml", 1, &params(pairs), &mut out, Some(SEED));
    (result, out)
}

fn run_ok(text: &str) -> (GenerationReport, DebugOutputStream) {
    let (result, out) = run_with(text, &[]);
    (result.expect("generation succeeds"), out)
}

fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

fn ids(out: &DebugOutputStream, entity_type: &str) -> Vec<i64> {
    out.rows_of(entity_type)
        .map(|row| row.get("id").and_then(Value::as_i64).expect("integer id"))
        .collect()
}

fn recipe_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../recipes")
        .join(name)
}

#[test]
fn counter_field_yields_sequential_ids() {
    let (_, out) = run_ok(
        r#"
- object: Widget
  count: 2
  fields:
    id: {counter}
"#,
    );
    let rows: Vec<&Fields> = out.rows().iter().map(|row| &row.fields).collect();
    assert_eq!(
        rows,
        [
            &Fields::from([("id".to_string(), Value::Int(1))]),
            &Fields::from([("id".to_string(), Value::Int(2))]),
        ]
    );
}

#[test]
fn every_row_gets_an_id_first() {
    let (_, out) = run_ok(
        r#"
- object: Widget
  count: 2
  fields:
    name: gear
"#,
    );
    let first = &out.rows()[0];
    assert_eq!(first.fields.get_index(0), Some((&"id".to_string(), &Value::Int(1))));
    assert_eq!(first.get("name"), Some(&text("gear")));
}

#[test]
fn children_follow_their_parent_and_reference_it() {
    let (_, out) = run_ok(
        r#"
- object: Parent
  fields:
    name: Mom
  friends:
    - object: Child
      count: 3
      fields:
        parent: {reference: Parent}
"#,
    );
    let types: Vec<&str> = out.rows().iter().map(|row| row.entity_type.as_str()).collect();
    assert_eq!(types, ["Parent", "Child", "Child", "Child"]);
    assert_eq!(ids(&out, "Child"), [1, 2, 3]);
    assert!(
        out.rows_of("Child")
            .all(|row| row.get("parent") == Some(&Value::Int(1)))
    );
}

#[test]
fn each_parent_row_gets_its_own_children() {
    let (_, out) = run_ok(
        r#"
- object: Parent
  count: 2
  friends:
    - object: Child
      count: 2
      fields:
        parent: {reference: Parent}
"#,
    );
    let types: Vec<&str> = out.rows().iter().map(|row| row.entity_type.as_str()).collect();
    assert_eq!(types, ["Parent", "Child", "Child", "Parent", "Child", "Child"]);
    let parents: Vec<Option<&Value>> = out.rows_of("Child").map(|row| row.get("parent")).collect();
    assert_eq!(
        parents,
        [
            Some(&Value::Int(1)),
            Some(&Value::Int(1)),
            Some(&Value::Int(2)),
            Some(&Value::Int(2)),
        ]
    );
    assert_eq!(ids(&out, "Child"), [1, 2, 3, 4]);
}

#[test]
fn missing_count_parameter_fails_after_earlier_rows() {
    let (result, out) = run_with(
        r#"
- object: Before
- object: Widget
  count: "{num_widgets}"
"#,
        &[],
    );
    match result {
        Err(GenerationError::MissingParameter { name }) => assert_eq!(name, "num_widgets"),
        other => panic!("expected missing parameter, got {other:?}"),
    }
    assert_eq!(out.rows().len(), 1);
    assert_eq!(out.rows()[0].entity_type, "Before");
    assert!(!out.is_closed());
}

#[test]
fn supplied_parameter_drives_the_count() {
    let (result, out) = run_with(
        r#"
- object: Widget
  count: "{num_widgets}"
"#,
        &[("num_widgets", Value::Int(4))],
    );
    let report = result.expect("generation succeeds");
    assert_eq!(report.rows_of("Widget"), 4);
    assert_eq!(ids(&out, "Widget"), [1, 2, 3, 4]);
}

#[test]
fn string_template_concatenates_fields() {
    let (_, out) = run_ok(
        r#"
- object: Person
  fields:
    first: Ada
    last: Lovelace
    full: "{first} {last}"
    code: "P{{{id}}}"
"#,
    );
    let row = &out.rows()[0];
    assert_eq!(row.get("full"), Some(&text("Ada Lovelace")));
    assert_eq!(row.get("code"), Some(&text("P{1}")));
}

#[test]
fn templates_fall_back_to_parameters() {
    let (result, out) = run_with(
        r#"
- object: Greeting
  fields:
    message: "hello {who}"
"#,
        &[("who", text("world"))],
    );
    result.expect("generation succeeds");
    assert_eq!(out.rows()[0].get("message"), Some(&text("hello world")));
}

#[test]
fn unknown_placeholder_is_a_missing_parameter() {
    let (result, _) = run_with(
        r#"
- object: Greeting
  fields:
    message: "hello {who}"
"#,
        &[],
    );
    assert!(matches!(
        result,
        Err(GenerationError::MissingParameter { name }) if name == "who"
    ));
}

#[test]
fn zero_count_skips_friends_entirely() {
    let (report, out) = run_ok(
        r#"
- object: Parent
  count: 0
  friends:
    - object: Child
      count: 3
"#,
    );
    assert!(out.rows().is_empty());
    assert_eq!(report.rows_total, 0);
    assert_eq!(
        report.template("/0").map(|t| t.state),
        Some(TemplateState::Done)
    );
    assert_eq!(
        report.template("/0/friends/0").map(|t| t.state),
        Some(TemplateState::NotStarted)
    );
}

#[test]
fn sibling_templates_share_an_id_sequence() {
    let (_, out) = run_ok(
        r#"
- object: Account
  count: 2
  fields:
    kind: first
- object: Account
  nickname: extra
  fields:
    kind: second
"#,
    );
    assert_eq!(ids(&out, "Account"), [1, 2, 3]);
    assert!(out.find_row("Account", &[("id", Value::Int(3)), ("kind", text("second"))]).is_some());
}

#[test]
fn iterations_continue_counters() {
    let mut out = DebugOutputStream::new();
    let report = generate(
        "- object: Account\n  count: 2\n",
        "inline.yml",
        3,
        &Params::new(),
        &mut out,
        Some(SEED),
    )
    .expect("generation succeeds");
    assert_eq!(report.iterations, 3);
    assert_eq!(report.rows_of("Account"), 6);
    assert_eq!(ids(&out, "Account"), [1, 2, 3, 4, 5, 6]);
}

#[test]
fn references_resolve_to_latest_or_explicit_rows() {
    let (_, out) = run_ok(
        r#"
- object: Account
  count: 3
  fields:
    name: "acct-{id}"
- object: Contact
  fields:
    account: {reference: Account}
    account_name: {reference: {object: Account, field: name}}
    first: {reference: {object: Account, id: 1, field: name}}
    seen: {counter: Account}
"#,
    );
    let contact = out.rows_of("Contact").next().expect("contact row");
    assert_eq!(contact.get("account"), Some(&Value::Int(3)));
    assert_eq!(contact.get("account_name"), Some(&text("acct-3")));
    assert_eq!(contact.get("first"), Some(&text("acct-1")));
    assert_eq!(contact.get("seen"), Some(&Value::Int(3)));
}

#[test]
fn nicknames_select_their_own_rows() {
    let (_, out) = run_ok(
        r#"
- object: User
  nickname: admin
  fields:
    role: admin
- object: User
  fields:
    role: member
- object: Ticket
  fields:
    admin_id: {reference: admin}
    latest_user: {reference: User}
    admin_role: "{admin.role}"
"#,
    );
    let ticket = out.rows_of("Ticket").next().expect("ticket row");
    assert_eq!(ticket.get("admin_id"), Some(&Value::Int(1)));
    assert_eq!(ticket.get("latest_user"), Some(&Value::Int(2)));
    assert_eq!(ticket.get("admin_role"), Some(&text("admin")));
}

#[test]
fn random_references_only_pick_emitted_rows() {
    let (_, out) = run_ok(
        r#"
- object: Account
  count: 5
- object: Contact
  count: 40
  fields:
    account: {random_reference: Account}
"#,
    );
    let picked: BTreeSet<i64> = out
        .rows_of("Contact")
        .map(|row| row.get("account").and_then(Value::as_i64).expect("account id"))
        .collect();
    assert!(picked.iter().all(|id| (1..=5).contains(id)), "{picked:?}");
    assert!(picked.len() > 1, "40 picks should not all land on one row");
}

#[test]
fn latest_reference_prefers_last_emitted_row_over_parent() {
    let (_, out) = run_ok(
        r#"
- object: Account
  friends:
    - object: Account
      nickname: child_account
    - object: Contact
      fields:
        account: {reference: Account}
        parent: {reference: {object: Account, id: 1}}
"#,
    );
    assert_eq!(ids(&out, "Account"), [1, 2]);
    let contact = out.rows_of("Contact").next().expect("contact row");
    assert_eq!(contact.get("account"), Some(&Value::Int(2)));
    assert_eq!(contact.get("parent"), Some(&Value::Int(1)));
}

#[test]
fn failure_in_a_later_field_emits_no_partial_row() {
    let (result, out) = run_with(
        r#"
- object: Account
  count: 2
- object: Contact
  count: 3
  fields:
    name: "contact-{id}"
    link:
      if: "id > 1"
      then: {reference: Ghost}
      else: ok
"#,
        &[],
    );
    assert!(matches!(
        result,
        Err(GenerationError::UnresolvedReference { target, .. }) if target == "Ghost"
    ));
    let types: Vec<&str> = out.rows().iter().map(|row| row.entity_type.as_str()).collect();
    assert_eq!(types, ["Account", "Account", "Contact"]);
    let contact = out.rows_of("Contact").next().expect("first contact");
    assert_eq!(contact.get("name"), Some(&text("contact-1")));
    assert_eq!(contact.get("link"), Some(&text("ok")));
    assert!(out.find_row("Contact", &[("id", Value::Int(2))]).is_none());
    assert!(!out.is_closed());
}

#[test]
fn overflowing_choice_weights_are_an_invalid_formula() {
    let formula = Formula::Faker(FakerCall::RandomChoice(vec![
        WeightedChoice {
            weight: f64::MAX,
            value: Formula::Literal(LiteralValue::Text("x".to_string())),
        },
        WeightedChoice {
            weight: f64::MAX,
            value: Formula::Literal(LiteralValue::Text("y".to_string())),
        },
    ]));
    let mut ctx = GenerationContext::new(Params::new(), SEED, LocaleKey::EnUs);
    let result = evaluate(&formula, &mut ctx, None);
    assert!(matches!(result, Err(GenerationError::InvalidFormula(_))), "{result:?}");
}

#[test]
fn reference_without_rows_is_fatal() {
    let (result, out) = run_with(
        r#"
- object: Contact
  fields:
    account: {reference: Account}
"#,
        &[],
    );
    assert!(matches!(
        result,
        Err(GenerationError::UnresolvedReference { target, .. }) if target == "Account"
    ));
    assert!(out.rows().is_empty(), "no partial row is written");
}

#[test]
fn explicit_id_must_exist() {
    let (result, _) = run_with(
        r#"
- object: Account
- object: Contact
  fields:
    account: {reference: {object: Account, id: 9}}
"#,
        &[],
    );
    assert!(matches!(
        result,
        Err(GenerationError::UnresolvedReference { .. })
    ));
}

#[test]
fn conditional_picks_one_branch() {
    let (_, out) = run_ok(
        r#"
- option: threshold
  default: 5
- object: Score
  count: 20
  fields:
    value: {random_number: {min: 1, max: 10}}
    band:
      if: "value > threshold"
      then: high
      else: low
"#,
    );
    for row in out.rows_of("Score") {
        let value = row.get("value").and_then(Value::as_i64).expect("value");
        let expected = if value > 5 { "high" } else { "low" };
        assert_eq!(row.get("band"), Some(&text(expected)), "value {value}");
    }
}

#[test]
fn textual_comparison_when_not_numeric() {
    let (_, out) = run_ok(
        r#"
- object: Ticket
  fields:
    status: Open
    open:
      if: "status == 'Open'"
      then: true
      else: false
"#,
    );
    assert_eq!(out.rows()[0].get("open"), Some(&Value::Bool(true)));
}

#[test]
fn invalid_counts_are_rejected() {
    let (result, _) = run_with("- object: Widget\n  count: -1\n", &[]);
    assert!(matches!(result, Err(GenerationError::InvalidCount { .. })));

    let (result, _) = run_with(
        "- object: Widget\n  count: \"{n}\"\n",
        &[("n", text("many"))],
    );
    match result {
        Err(GenerationError::InvalidCount { template, value }) => {
            assert_eq!(template, "Widget");
            assert_eq!(value, "many");
        }
        other => panic!("expected invalid count, got {other:?}"),
    }

    let (result, out) = run_with("- object: Widget\n  count: 1.0e20\n", &[]);
    assert!(matches!(result, Err(GenerationError::InvalidCount { .. })));
    assert!(out.rows().is_empty());

    let (result, out) = run_with("- object: Widget\n  count: \"{n}\"\n", &[("n", text("2"))]);
    result.expect("numeric text is a valid count");
    assert_eq!(out.rows().len(), 2);
}

#[test]
fn random_values_respect_their_ranges() {
    let (_, out) = run_ok(
        r#"
- object: Event
  count: 30
  fields:
    n: {random_number: {min: -3, max: 3}}
    day: {date_between: {start: 2020-02-01, end: 2020-02-29}}
    pick: {random_choice: {alpha: 100%, beta: 0%}}
    name: {fake: first_name}
    flag: {fake: boolean}
"#,
    );
    for row in out.rows() {
        let n = row.get("n").and_then(Value::as_i64).expect("n");
        assert!((-3..=3).contains(&n));
        let day = row.get("day").and_then(Value::as_date).expect("day");
        assert!(day.to_string().starts_with("2020-02-"), "{day}");
        assert_eq!(row.get("pick"), Some(&text("alpha")));
        assert!(row.get("name").and_then(Value::as_str).is_some_and(|name| !name.is_empty()));
        assert!(matches!(row.get("flag"), Some(Value::Bool(_))));
    }
}

#[test]
fn recipe_errors_surface_through_generate() {
    let (result, out) = run_with("- object: [unclosed\n", &[]);
    assert!(matches!(
        result,
        Err(GenerationError::Recipe(RecipeError::Syntax(_)))
    ));
    assert!(out.rows().is_empty());
}

struct FailingStream {
    accepted: usize,
}

impl OutputStream for FailingStream {
    fn write_row(&mut self, _entity_type: &str, _fields: &Fields) -> Result<(), OutputError> {
        if self.accepted == 2 {
            return Err(OutputError::Loader("destination unavailable".to_string()));
        }
        self.accepted += 1;
        Ok(())
    }
}

#[test]
fn output_errors_propagate_unchanged() {
    let recipe = rowsmith_recipe::parse_recipe("- object: Widget\n  count: 5\n", "inline.yml")
        .expect("parse");
    let mut out = FailingStream { accepted: 0 };
    let err = GenerationEngine::new(GenerateOptions::default(), &mut out)
        .run(&recipe, &Params::new())
        .expect_err("third row fails");
    assert!(matches!(err, GenerationError::Output(OutputError::Loader(_))));
    assert_eq!(out.accepted, 2);
}

#[test]
fn successful_run_closes_output_and_reports() {
    let (report, out) = run_ok("- object: Widget\n  count: 2\n  friends:\n    - object: Part\n");
    assert!(out.is_closed());
    assert_eq!(report.seed, SEED);
    assert_eq!(report.rows_total, 4);
    assert_eq!(report.rows_of("Part"), 2);
    assert!(
        report
            .templates
            .iter()
            .all(|template| template.state == TemplateState::Done)
    );
}

#[test]
fn random_seed_is_reported() {
    let recipe = rowsmith_recipe::parse_recipe("- object: Widget\n", "inline.yml").expect("parse");
    let mut out = DebugOutputStream::new();
    let report = GenerationEngine::new(GenerateOptions::default(), &mut out)
        .run(&recipe, &Params::new())
        .expect("generation succeeds");

    let mut replay = DebugOutputStream::new();
    let options = GenerateOptions {
        seed: Some(report.seed),
        ..GenerateOptions::default()
    };
    let replayed = GenerationEngine::new(options, &mut replay)
        .run(&recipe, &Params::new())
        .expect("replay succeeds");
    assert_eq!(replayed.seed, report.seed);
    assert_eq!(out.rows(), replay.rows());
}

#[test]
fn character_recipe_generates_expected_rows() {
    let recipe = load_recipe(&recipe_path("character_gen.yml")).expect("parse recipe");
    let mut out = DebugOutputStream::new();
    let options = GenerateOptions {
        seed: Some(SEED),
        ..GenerateOptions::default()
    };
    let report = GenerationEngine::new(options, &mut out)
        .run(
            &recipe,
            &params(&[("num_fighters", Value::Int(1)), ("num_druids", Value::Int(2))]),
        )
        .expect("generation succeeds");

    assert_eq!(report.rows_of("Equipment"), 2);
    assert_eq!(report.rows_of("Druid"), 2);
    assert_eq!(report.rows_of("Fighter"), 1);
    assert_eq!(report.rows_of("Paladin"), 1);

    assert!(out.find_row("Druid", &[("id", Value::Int(2))]).is_some());
    assert!(out.find_row("Fighter", &[("id", Value::Int(2))]).is_none());

    for druid in out.rows_of("Druid") {
        let gear = druid.get("Gear").and_then(Value::as_i64).expect("gear id");
        assert!((1..=2).contains(&gear));
    }

    let fighter = out.rows_of("Fighter").next().expect("fighter");
    let fighter_name = fighter.get("Name").and_then(Value::as_str).expect("name");
    let paladin = out
        .find_row("Paladin", &[("Fighter", Value::Int(1))])
        .expect("paladin references its fighter");
    assert_eq!(
        paladin.get("Name"),
        Some(&text(&format!("{fighter_name} the Paladin")))
    );
}

#[test]
fn accounts_recipe_links_contacts_to_their_account() {
    let recipe = load_recipe(&recipe_path("accounts.yml")).expect("parse recipe");
    let mut out = DebugOutputStream::new();
    let options = GenerateOptions {
        seed: Some(SEED),
        ..GenerateOptions::default()
    };
    GenerationEngine::new(options, &mut out)
        .run(&recipe, &Params::new())
        .expect("generation succeeds");

    assert_eq!(ids(&out, "User"), [1, 2]);
    assert_eq!(ids(&out, "Account"), [1, 2, 3]);
    assert_eq!(ids(&out, "Contact"), [1, 2, 3, 4, 5, 6]);

    for account in out.rows_of("Account") {
        assert_eq!(account.get("Seq"), account.get("id"));
        let label = account.get("Label").and_then(Value::as_str).expect("label");
        assert!(label.ends_with("(North)"), "{label}");
        let owner = account.get("Owner").and_then(Value::as_i64).expect("owner");
        assert!((1..=2).contains(&owner));
    }

    let account_ids: Vec<i64> = out
        .rows_of("Contact")
        .map(|contact| contact.get("AccountId").and_then(Value::as_i64).expect("account id"))
        .collect();
    assert_eq!(account_ids, [1, 1, 2, 2, 3, 3]);

    for contact in out.rows_of("Contact") {
        let first = contact.get("FirstName").and_then(Value::as_str).expect("first");
        let last = contact.get("LastName").and_then(Value::as_str).expect("last");
        assert_eq!(
            contact.get("FullName"),
            Some(&text(&format!("{first} {last}")))
        );
        assert_eq!(contact.get("FirstAccount"), Some(&Value::Int(1)));
        let account_id = contact.get("AccountId").and_then(Value::as_i64).expect("account");
        let account = out
            .find_row("Account", &[("id", Value::Int(account_id))])
            .expect("referenced account was emitted");
        assert_eq!(contact.get("AccountName"), account.get("Name"));
    }
}

#[test]
fn parameters_override_option_defaults() {
    let recipe = load_recipe(&recipe_path("accounts.yml")).expect("parse recipe");
    let mut out = DebugOutputStream::new();
    let options = GenerateOptions {
        seed: Some(SEED),
        ..GenerateOptions::default()
    };
    let report = GenerationEngine::new(options, &mut out)
        .run(
            &recipe,
            &params(&[("num_accounts", Value::Int(1)), ("region", text("South"))]),
        )
        .expect("generation succeeds");
    assert_eq!(report.rows_of("Account"), 1);
    assert_eq!(report.rows_of("Contact"), 2);
    let label = out
        .rows_of("Account")
        .next()
        .and_then(|row| row.get("Label"))
        .and_then(Value::as_str)
        .expect("label");
    assert!(label.ends_with("(South)"), "{label}");
}
