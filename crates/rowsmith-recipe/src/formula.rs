use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use schemars::JsonSchema;
use schemars::r#gen::SchemaGenerator;
use schemars::schema::{InstanceType, Schema, SchemaObject, SingleOrVec, SubschemaValidation};
use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

/// Constant scalar written directly in a recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum LiteralValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for LiteralValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiteralValue::Null => f.write_str("null"),
            LiteralValue::Bool(value) => write!(f, "{value}"),
            LiteralValue::Int(value) => write!(f, "{value}"),
            LiteralValue::Float(value) => write!(f, "{value}"),
            LiteralValue::Text(value) => write!(f, "'{value}'"),
        }
    }
}

/// How a field (or a count) obtains its value.
#[derive(Debug, Clone, PartialEq)]
pub enum Formula {
    Literal(LiteralValue),
    Faker(FakerCall),
    /// Current id of `object`, or of the row's own entity type when omitted.
    Counter { object: Option<String> },
    Reference(ReferenceSpec),
    Template(StringTemplate),
    Conditional(Box<Conditional>),
}

/// Random draws; every variant consumes the run's rng.
#[derive(Debug, Clone, PartialEq)]
pub enum FakerCall {
    Fake(FakeKind),
    RandomNumber { min: i64, max: i64 },
    RandomChoice(Vec<WeightedChoice>),
    DateBetween { start: NaiveDate, end: NaiveDate },
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeightedChoice {
    pub weight: f64,
    pub value: Formula,
}

/// Faker providers available through `{fake: <provider>}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FakeKind {
    FirstName,
    LastName,
    Name,
    NameWithTitle,
    Title,
    Email,
    SafeEmail,
    FreeEmail,
    Username,
    Company,
    CatchPhrase,
    Buzzword,
    Industry,
    JobTitle,
    StreetName,
    BuildingNumber,
    City,
    State,
    StateAbbr,
    Country,
    ZipCode,
    Postcode,
    PhoneNumber,
    CellNumber,
    Word,
    Sentence,
    Paragraph,
    Ipv4,
    Uuid,
    Boolean,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceSpec {
    /// Object type or nickname.
    pub target: String,
    pub selector: Selector,
    pub field: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    /// Innermost ancestor, else the most recently emitted row.
    Latest,
    Id(u64),
    Random,
}

/// Text with `{name}` and `{Target.field}` placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct StringTemplate {
    pub source: String,
    pub segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Text(String),
    Placeholder(Placeholder),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Placeholder {
    pub name: String,
    pub field: Option<String>,
}

impl StringTemplate {
    pub fn placeholders(&self) -> impl Iterator<Item = &Placeholder> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Placeholder(placeholder) => Some(placeholder),
            Segment::Text(_) => None,
        })
    }

    /// The parameter name when the template is exactly `"{name}"`.
    pub fn single_identifier(&self) -> Option<&str> {
        match self.segments.as_slice() {
            [Segment::Placeholder(Placeholder { name, field: None })] => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conditional {
    pub guard: Guard,
    pub then: Formula,
    pub otherwise: Formula,
}

/// `<operand> <op> <operand>` comparison used by `if:`.
#[derive(Debug, Clone, PartialEq)]
pub struct Guard {
    pub source: String,
    pub left: Operand,
    pub op: CompareOp,
    pub right: Operand,
}

impl Guard {
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        [&self.left, &self.right]
            .into_iter()
            .filter_map(|operand| match operand {
                Operand::Identifier(name) => Some(name.as_str()),
                _ => None,
            })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Identifier(String),
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "==" => Some(CompareOp::Eq),
            "!=" => Some(CompareOp::Ne),
            "<" => Some(CompareOp::Lt),
            "<=" => Some(CompareOp::Le),
            ">" => Some(CompareOp::Gt),
            ">=" => Some(CompareOp::Ge),
            _ => None,
        }
    }

    /// Whether an ordering between the two sides satisfies the operator.
    pub fn holds(self, ordering: Option<std::cmp::Ordering>) -> bool {
        use std::cmp::Ordering::{Equal, Greater, Less};
        match (self, ordering) {
            (CompareOp::Ne, None) => true,
            (_, None) => false,
            (CompareOp::Eq, Some(ord)) => ord == Equal,
            (CompareOp::Ne, Some(ord)) => ord != Equal,
            (CompareOp::Lt, Some(ord)) => ord == Less,
            (CompareOp::Le, Some(ord)) => ord != Greater,
            (CompareOp::Gt, Some(ord)) => ord == Greater,
            (CompareOp::Ge, Some(ord)) => ord != Less,
        }
    }
}

impl Formula {
    /// Classify a YAML string: plain text or a placeholder template.
    pub fn from_text(text: &str) -> Result<Self, String> {
        let template = parse_template(text)?;
        match template.segments.as_slice() {
            [] => Ok(Formula::Literal(LiteralValue::Text(String::new()))),
            [Segment::Text(plain)] => Ok(Formula::Literal(LiteralValue::Text(plain.clone()))),
            _ => Ok(Formula::Template(template)),
        }
    }

    /// Call `visit` on this formula and every formula nested inside it.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Formula)) {
        visit(self);
        match self {
            Formula::Faker(FakerCall::RandomChoice(choices)) => {
                for choice in choices {
                    choice.value.walk(visit);
                }
            }
            Formula::Conditional(conditional) => {
                conditional.then.walk(visit);
                conditional.otherwise.walk(visit);
            }
            _ => {}
        }
    }
}

pub(crate) fn parse_template(text: &str) -> Result<StringTemplate, String> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                literal.push('}');
            }
            '{' => {
                let mut inner = String::new();
                let mut closed = false;
                for next in chars.by_ref() {
                    match next {
                        '}' => {
                            closed = true;
                            break;
                        }
                        '{' => return Err(format!("nested '{{' in placeholder of \"{text}\"")),
                        other => inner.push(other),
                    }
                }
                if !closed {
                    return Err(format!("unclosed placeholder in \"{text}\""));
                }
                let placeholder = parse_placeholder(&inner)
                    .ok_or_else(|| format!("empty placeholder in \"{text}\""))?;
                if !literal.is_empty() {
                    segments.push(Segment::Text(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Placeholder(placeholder));
            }
            '}' => return Err(format!("unbalanced '}}' in \"{text}\" (use '}}}}')")),
            other => literal.push(other),
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Text(literal));
    }

    Ok(StringTemplate {
        source: text.to_string(),
        segments,
    })
}

fn parse_placeholder(inner: &str) -> Option<Placeholder> {
    let inner = inner.trim();
    if inner.is_empty() {
        return None;
    }
    match inner.split_once('.') {
        Some((name, field)) if !name.trim().is_empty() && !field.trim().is_empty() => {
            Some(Placeholder {
                name: name.trim().to_string(),
                field: Some(field.trim().to_string()),
            })
        }
        Some(_) => None,
        None => Some(Placeholder {
            name: inner.to_string(),
            field: None,
        }),
    }
}

fn guard_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*(.+?)\s*(==|!=|<=|>=|<|>)\s*(.+?)\s*$").expect("guard regex is valid")
    })
}

pub(crate) fn parse_guard(source: &str) -> Result<Guard, String> {
    let captures = guard_pattern().captures(source).ok_or_else(|| {
        format!("guard \"{source}\" must look like '<operand> <op> <operand>' with one of == != < <= > >=")
    })?;
    let op = CompareOp::parse(&captures[2])
        .ok_or_else(|| format!("unknown operator '{}' in guard \"{source}\"", &captures[2]))?;
    Ok(Guard {
        source: source.to_string(),
        left: parse_operand(&captures[1]),
        op,
        right: parse_operand(&captures[3]),
    })
}

fn parse_operand(raw: &str) -> Operand {
    let raw = raw.trim();
    for quote in ['"', '\''] {
        if raw.len() >= 2 && raw.starts_with(quote) && raw.ends_with(quote) {
            return Operand::Text(raw[1..raw.len() - 1].to_string());
        }
    }
    match raw.parse::<f64>() {
        Ok(number) => Operand::Number(number),
        Err(_) => Operand::Identifier(raw.to_string()),
    }
}

/// Mapping form of a formula, as written in YAML.
#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct FormulaCall {
    #[serde(default)]
    pub fake: Option<FakeKind>,
    #[serde(default)]
    pub random_number: Option<NumberRange>,
    #[serde(default)]
    pub random_choice: Option<Choices>,
    #[serde(default)]
    pub date_between: Option<DateRange>,
    /// `{counter}` deserializes as `Some(None)`.
    #[serde(default, deserialize_with = "present")]
    #[schemars(with = "Option<String>")]
    pub counter: Option<Option<String>>,
    #[serde(default)]
    pub reference: Option<ReferenceTarget>,
    #[serde(default)]
    pub random_reference: Option<ReferenceTarget>,
    #[serde(default, rename = "if")]
    pub guard: Option<String>,
    #[serde(default)]
    pub then: Option<Formula>,
    #[serde(default, rename = "else")]
    pub otherwise: Option<Formula>,
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct NumberRange {
    pub min: i64,
    pub max: i64,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// `Target` or `{object, id?, field?}`.
#[derive(Debug, Clone)]
pub struct ReferenceTarget {
    pub object: String,
    pub id: Option<u64>,
    pub field: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct ReferenceDetail {
    object: String,
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    field: Option<String>,
}

impl<'de> Deserialize<'de> for ReferenceTarget {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TargetVisitor;

        impl<'de> Visitor<'de> for TargetVisitor {
            type Value = ReferenceTarget;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object name or a mapping with 'object', 'id' and 'field'")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
                if value.trim().is_empty() {
                    return Err(E::custom("reference target must not be empty"));
                }
                Ok(ReferenceTarget {
                    object: value.trim().to_string(),
                    id: None,
                    field: None,
                })
            }

            fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<Self::Value, A::Error> {
                let detail =
                    ReferenceDetail::deserialize(de::value::MapAccessDeserializer::new(map))?;
                Ok(ReferenceTarget {
                    object: detail.object,
                    id: detail.id,
                    field: detail.field,
                })
            }
        }

        deserializer.deserialize_any(TargetVisitor)
    }
}

impl JsonSchema for ReferenceTarget {
    fn schema_name() -> String {
        "ReferenceTarget".to_string()
    }

    fn json_schema(generator: &mut SchemaGenerator) -> Schema {
        any_of(vec![
            generator.subschema_for::<String>(),
            generator.subschema_for::<ReferenceDetail>(),
        ])
    }
}

/// Choice weight: a number or a `"N%"` string.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(untagged)]
enum Weight {
    Number(f64),
    Percent(String),
}

impl Weight {
    fn value(&self) -> Result<f64, String> {
        let weight = match self {
            Weight::Number(number) => *number,
            Weight::Percent(text) => text
                .trim()
                .trim_end_matches('%')
                .trim()
                .parse::<f64>()
                .map_err(|_| format!("invalid choice weight '{text}'"))?,
        };
        if weight.is_finite() && weight >= 0.0 {
            Ok(weight)
        } else {
            Err(format!("choice weight must be a non-negative number, got {weight}"))
        }
    }
}

/// `[a, b]` (uniform) or `{a: 30%, b: 70%}` (weighted).
#[derive(Debug, Clone)]
pub struct Choices(pub Vec<WeightedChoice>);

impl<'de> Deserialize<'de> for Choices {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ChoicesVisitor;

        impl<'de> Visitor<'de> for ChoicesVisitor {
            type Value = Choices;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a list of choices or a mapping of choice to weight")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut choices = Vec::new();
                while let Some(value) = seq.next_element::<Formula>()? {
                    choices.push(WeightedChoice { weight: 1.0, value });
                }
                Ok(Choices(choices))
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut choices = Vec::new();
                while let Some((key, weight)) = map.next_entry::<String, Weight>()? {
                    let value = Formula::from_text(&key).map_err(de::Error::custom)?;
                    let weight = weight.value().map_err(de::Error::custom)?;
                    choices.push(WeightedChoice { weight, value });
                }
                let total: f64 = choices.iter().map(|choice| choice.weight).sum();
                if !total.is_finite() {
                    return Err(de::Error::custom("choice weights must add up to a finite total"));
                }
                Ok(Choices(choices))
            }
        }

        deserializer.deserialize_any(ChoicesVisitor)
    }
}

impl JsonSchema for Choices {
    fn schema_name() -> String {
        "Choices".to_string()
    }

    fn json_schema(generator: &mut SchemaGenerator) -> Schema {
        any_of(vec![
            generator.subschema_for::<Vec<Formula>>(),
            generator.subschema_for::<BTreeMap<String, Weight>>(),
        ])
    }
}

impl TryFrom<FormulaCall> for Formula {
    type Error = String;

    fn try_from(call: FormulaCall) -> Result<Self, Self::Error> {
        let FormulaCall {
            fake,
            random_number,
            random_choice,
            date_between,
            counter,
            reference,
            random_reference,
            guard,
            then,
            otherwise,
        } = call;

        let kinds = [
            fake.is_some(),
            random_number.is_some(),
            random_choice.is_some(),
            date_between.is_some(),
            counter.is_some(),
            reference.is_some(),
            random_reference.is_some(),
            guard.is_some(),
        ]
        .into_iter()
        .filter(|named| *named)
        .count();

        if guard.is_none() && (then.is_some() || otherwise.is_some()) {
            return Err("'then' and 'else' are only valid together with 'if'".to_string());
        }
        if kinds == 0 {
            return Err("formula mapping must name one of fake, random_number, random_choice, \
                 date_between, counter, reference, random_reference or if"
                .to_string());
        }
        if kinds > 1 {
            return Err("formula mapping names more than one formula kind".to_string());
        }

        if let Some(kind) = fake {
            return Ok(Formula::Faker(FakerCall::Fake(kind)));
        }
        if let Some(range) = random_number {
            return Ok(Formula::Faker(FakerCall::RandomNumber {
                min: range.min,
                max: range.max,
            }));
        }
        if let Some(Choices(choices)) = random_choice {
            return Ok(Formula::Faker(FakerCall::RandomChoice(choices)));
        }
        if let Some(range) = date_between {
            return Ok(Formula::Faker(FakerCall::DateBetween {
                start: range.start,
                end: range.end,
            }));
        }
        if let Some(object) = counter {
            return Ok(Formula::Counter { object });
        }
        if let Some(target) = reference {
            return Ok(Formula::Reference(ReferenceSpec {
                target: target.object,
                selector: target.id.map_or(Selector::Latest, Selector::Id),
                field: target.field.unwrap_or_else(|| "id".to_string()),
            }));
        }
        if let Some(target) = random_reference {
            if target.id.is_some() {
                return Err("'random_reference' does not accept an 'id'".to_string());
            }
            return Ok(Formula::Reference(ReferenceSpec {
                target: target.object,
                selector: Selector::Random,
                field: target.field.unwrap_or_else(|| "id".to_string()),
            }));
        }

        let source = guard.unwrap_or_default();
        Ok(Formula::Conditional(Box::new(Conditional {
            guard: parse_guard(&source)?,
            then: then.unwrap_or(Formula::Literal(LiteralValue::Null)),
            otherwise: otherwise.unwrap_or(Formula::Literal(LiteralValue::Null)),
        })))
    }
}

impl<'de> Deserialize<'de> for Formula {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(FormulaVisitor)
    }
}

struct FormulaVisitor;

impl<'de> Visitor<'de> for FormulaVisitor {
    type Value = Formula;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a literal, a template string or a formula mapping")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(Formula::Literal(LiteralValue::Null))
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(Formula::Literal(LiteralValue::Null))
    }

    fn visit_bool<E: de::Error>(self, value: bool) -> Result<Self::Value, E> {
        Ok(Formula::Literal(LiteralValue::Bool(value)))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
        Ok(Formula::Literal(LiteralValue::Int(value)))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
        i64::try_from(value)
            .map(|value| Formula::Literal(LiteralValue::Int(value)))
            .map_err(|_| E::custom(format!("integer {value} is out of range")))
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<Self::Value, E> {
        Ok(Formula::Literal(LiteralValue::Float(value)))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
        Formula::from_text(value).map_err(E::custom)
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<Self::Value, A::Error> {
        let call = FormulaCall::deserialize(de::value::MapAccessDeserializer::new(map))?;
        Formula::try_from(call).map_err(de::Error::custom)
    }
}

impl JsonSchema for Formula {
    fn schema_name() -> String {
        "Formula".to_string()
    }

    fn json_schema(generator: &mut SchemaGenerator) -> Schema {
        let scalar = SchemaObject {
            instance_type: Some(SingleOrVec::Vec(vec![
                InstanceType::Null,
                InstanceType::Boolean,
                InstanceType::Integer,
                InstanceType::Number,
                InstanceType::String,
            ])),
            ..Default::default()
        };
        any_of(vec![scalar.into(), generator.subschema_for::<FormulaCall>()])
    }
}

fn any_of(schemas: Vec<Schema>) -> Schema {
    SchemaObject {
        subschemas: Some(Box::new(SubschemaValidation {
            any_of: Some(schemas),
            ..Default::default()
        })),
        ..Default::default()
    }
    .into()
}
