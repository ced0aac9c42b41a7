use super::value::{Condition, Field, FieldValue, ValueType};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleLoadError {
    #[error("malformed rules json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cannot read rules file: {0}")]
    Io(#[from] std::io::Error),
    #[error("version is required")]
    MissingVersion,
    #[error("partner id cannot be empty")]
    EmptyPartnerId,
    #[error("unknown field '{0}'")]
    UnknownField(String),
    #[error("unknown condition '{0}'")]
    UnknownCondition(String),
    #[error("unknown value type '{0}'")]
    UnknownValueType(String),
    #[error("condition {condition} requires exactly 2 values, got {got}")]
    BadArity { condition: Condition, got: usize },
    #[error("condition {0} requires a numeric value type")]
    RangeNeedsNumeric(Condition),
    #[error("range endpoints must be ordered low to high")]
    UnorderedRange,
    #[error("invalid {expected} value for condition {condition}")]
    InvalidValue {
        expected: ValueType,
        condition: Condition,
    },
    #[error("string value cannot be empty for condition {0}")]
    EmptyString(Condition),
    #[error("duplicate rule for partner {partner}: {field}_{condition}")]
    DuplicateRule {
        partner: String,
        field: Field,
        condition: Condition,
    },
}

/// One rule as written in the rules file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleRule {
    pub field: String,
    pub condition: String,
    pub value_type: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartnerRules {
    #[serde(default)]
    pub rules: Vec<SimpleRule>,
}

/// On-disk rule config: `{version, dsps: {...}, spps: {...}}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleFile {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub dsps: HashMap<String, PartnerRules>,
    #[serde(default)]
    pub spps: HashMap<String, PartnerRules>,
}

impl RuleFile {
    pub fn parse(data: &[u8]) -> Result<Self, RuleLoadError> {
        Ok(serde_json::from_slice(data)?)
    }
}

/// Typed rule value, one or two elements depending on the condition.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleValue {
    Int(Vec<i64>),
    Float(Vec<f64>),
    Str(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledRule {
    pub field: Field,
    pub condition: Condition,
    pub value: RuleValue,
}

impl CompiledRule {
    /// Whether the extracted value satisfies this rule. Type disagreement
    /// between the rule and the extracted value is a non-match, never an
    /// error.
    pub fn matches(&self, extracted: FieldValue<'_>) -> bool {
        match (&self.value, extracted) {
            (RuleValue::Int(vals), FieldValue::Int(x)) => compare_ord(self.condition, x, vals),
            (RuleValue::Float(vals), FieldValue::Float(x)) => compare_ord(self.condition, x, vals),
            (RuleValue::Str(vals), FieldValue::Str(s)) => match self.condition {
                Condition::Eq => s == vals[0],
                Condition::Ne => s != vals[0],
                Condition::Exists => !s.is_empty(),
                _ => false,
            },
            _ => false,
        }
    }
}

fn compare_ord<T: PartialOrd + Copy>(condition: Condition, x: T, vals: &[T]) -> bool {
    match condition {
        Condition::Eq => x == vals[0],
        Condition::Ne => x != vals[0],
        Condition::Gt => x > vals[0],
        Condition::Ge => x >= vals[0],
        Condition::Lt => x < vals[0],
        Condition::Le => x <= vals[0],
        Condition::Between => x >= vals[0] && x <= vals[1],
        Condition::NotBetween => x < vals[0] || x > vals[1],
        // Numeric extraction zero-fills absent paths, so existence always holds.
        Condition::Exists => true,
    }
}

/// Rules for one partner, grouped by projected field.
#[derive(Debug, Clone, Default)]
pub struct CompiledRuleSet {
    groups: Vec<(Field, Vec<CompiledRule>)>,
}

impl CompiledRuleSet {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn rule_count(&self) -> usize {
        self.groups.iter().map(|(_, rules)| rules.len()).sum()
    }

    /// Evaluates every rule against the extractor, rejecting on the first
    /// failure. Each field is extracted once for its whole group.
    pub fn evaluate<'a, F>(&self, extract: F) -> bool
    where
        F: Fn(Field) -> FieldValue<'a>,
    {
        for (field, rules) in &self.groups {
            let value = extract(*field);
            for rule in rules {
                if !rule.matches(value) {
                    return false;
                }
            }
        }

        true
    }
}

/// Compiles one partner's rules, enforcing `(field, condition)` uniqueness.
pub fn compile_partner(
    partner: &str,
    rules: &[SimpleRule],
) -> Result<CompiledRuleSet, RuleLoadError> {
    if partner.is_empty() {
        return Err(RuleLoadError::EmptyPartnerId);
    }

    let mut seen = HashSet::new();
    let mut groups: Vec<(Field, Vec<CompiledRule>)> = Vec::new();

    for simple in rules {
        let compiled = compile_rule(simple)?;

        if !seen.insert((compiled.field, compiled.condition)) {
            return Err(RuleLoadError::DuplicateRule {
                partner: partner.to_string(),
                field: compiled.field,
                condition: compiled.condition,
            });
        }

        match groups.iter_mut().find(|(field, _)| *field == compiled.field) {
            Some((_, group)) => group.push(compiled),
            None => groups.push((compiled.field, vec![compiled])),
        }
    }

    Ok(CompiledRuleSet { groups })
}

pub fn compile_rule(simple: &SimpleRule) -> Result<CompiledRule, RuleLoadError> {
    let field = Field::from_str(&simple.field)
        .map_err(|_| RuleLoadError::UnknownField(simple.field.clone()))?;
    let condition = Condition::from_str(&simple.condition)
        .map_err(|_| RuleLoadError::UnknownCondition(simple.condition.clone()))?;
    let value_type = ValueType::from_str(&simple.value_type)
        .map_err(|_| RuleLoadError::UnknownValueType(simple.value_type.clone()))?;

    let value = parse_value(condition, value_type, &simple.value)?;

    Ok(CompiledRule {
        field,
        condition,
        value,
    })
}

fn parse_value(
    condition: Condition,
    value_type: ValueType,
    raw: &serde_json::Value,
) -> Result<RuleValue, RuleLoadError> {
    // Existence checks ignore the configured value entirely.
    if condition == Condition::Exists {
        return Ok(match value_type {
            ValueType::Int => RuleValue::Int(vec![0, 0]),
            ValueType::Float => RuleValue::Float(vec![0.0, 0.0]),
            ValueType::String => RuleValue::Str(vec![String::new()]),
        });
    }

    if condition.is_range() && value_type == ValueType::String {
        return Err(RuleLoadError::RangeNeedsNumeric(condition));
    }

    match value_type {
        ValueType::Int => {
            let vals = parse_numeric(condition, raw, |v| v.as_i64(), value_type)?;
            if condition.is_range() && vals[0] > vals[1] {
                return Err(RuleLoadError::UnorderedRange);
            }
            Ok(RuleValue::Int(vals))
        }
        ValueType::Float => {
            let vals = parse_numeric(condition, raw, |v| v.as_f64(), value_type)?;
            if condition.is_range() && vals[0] > vals[1] {
                return Err(RuleLoadError::UnorderedRange);
            }
            Ok(RuleValue::Float(vals))
        }
        ValueType::String => {
            let single = raw.as_str().ok_or(RuleLoadError::InvalidValue {
                expected: value_type,
                condition,
            })?;
            if single.is_empty() {
                return Err(RuleLoadError::EmptyString(condition));
            }
            Ok(RuleValue::Str(vec![single.to_string()]))
        }
    }
}

fn parse_numeric<T, F>(
    condition: Condition,
    raw: &serde_json::Value,
    cast: F,
    expected: ValueType,
) -> Result<Vec<T>, RuleLoadError>
where
    F: Fn(&serde_json::Value) -> Option<T>,
{
    if condition.is_range() {
        let arr = raw.as_array().ok_or(RuleLoadError::InvalidValue {
            expected,
            condition,
        })?;
        if arr.len() != 2 {
            return Err(RuleLoadError::BadArity {
                condition,
                got: arr.len(),
            });
        }
        arr.iter()
            .map(|v| {
                cast(v).ok_or(RuleLoadError::InvalidValue {
                    expected,
                    condition,
                })
            })
            .collect()
    } else {
        let single = cast(raw).ok_or(RuleLoadError::InvalidValue {
            expected,
            condition,
        })?;
        Ok(vec![single])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(field: &str, condition: &str, value_type: &str, value: serde_json::Value) -> SimpleRule {
        SimpleRule {
            field: field.into(),
            condition: condition.into(),
            value_type: value_type.into(),
            value,
        }
    }

    #[test]
    fn compiles_each_value_type() {
        let compiled =
            compile_rule(&rule("banner.w", "ge", "int", serde_json::json!(300))).unwrap();
        assert!(compiled.matches(FieldValue::Int(320)));
        assert!(!compiled.matches(FieldValue::Int(250)));

        let compiled =
            compile_rule(&rule("bid.price", "gt", "float", serde_json::json!(1.5))).unwrap();
        assert!(compiled.matches(FieldValue::Float(2.0)));
        assert!(!compiled.matches(FieldValue::Float(1.5)));

        let compiled = compile_rule(&rule(
            "device.geo.country",
            "eq",
            "string",
            serde_json::json!("US"),
        ))
        .unwrap();
        assert!(compiled.matches(FieldValue::Str("US")));
        assert!(!compiled.matches(FieldValue::Str("CA")));
    }

    #[test]
    fn type_disagreement_never_matches() {
        let compiled =
            compile_rule(&rule("banner.w", "ge", "int", serde_json::json!(300))).unwrap();

        assert!(!compiled.matches(FieldValue::Float(400.0)));
        assert!(!compiled.matches(FieldValue::Str("400")));
        assert!(!compiled.matches(FieldValue::Absent));
    }

    #[test]
    fn between_is_closed_on_both_ends() {
        let compiled = compile_rule(&rule(
            "bidfloor",
            "between",
            "float",
            serde_json::json!([0.5, 2.0]),
        ))
        .unwrap();

        assert!(compiled.matches(FieldValue::Float(0.5)));
        assert!(compiled.matches(FieldValue::Float(1.0)));
        assert!(compiled.matches(FieldValue::Float(2.0)));
        assert!(!compiled.matches(FieldValue::Float(0.49)));
        assert!(!compiled.matches(FieldValue::Float(2.01)));
    }

    #[test]
    fn not_between_is_the_complement() {
        let compiled = compile_rule(&rule(
            "banner.w",
            "not_between",
            "int",
            serde_json::json!([100, 200]),
        ))
        .unwrap();

        assert!(compiled.matches(FieldValue::Int(99)));
        assert!(compiled.matches(FieldValue::Int(201)));
        assert!(!compiled.matches(FieldValue::Int(100)));
        assert!(!compiled.matches(FieldValue::Int(150)));
        assert!(!compiled.matches(FieldValue::Int(200)));
    }

    #[test]
    fn exists_on_strings_requires_non_empty() {
        let compiled =
            compile_rule(&rule("bid.nurl", "exists", "string", serde_json::Value::Null)).unwrap();

        assert!(compiled.matches(FieldValue::Str("http://x")));
        assert!(!compiled.matches(FieldValue::Str("")));
    }

    #[test]
    fn exists_on_numerics_always_holds() {
        let compiled =
            compile_rule(&rule("banner.w", "exists", "int", serde_json::Value::Null)).unwrap();

        assert!(compiled.matches(FieldValue::Int(0)));
        assert!(compiled.matches(FieldValue::Int(300)));
    }

    #[test]
    fn rejects_unknown_names() {
        assert!(matches!(
            compile_rule(&rule("nope", "eq", "int", serde_json::json!(1))),
            Err(RuleLoadError::UnknownField(_))
        ));
        assert!(matches!(
            compile_rule(&rule("banner.w", "almost", "int", serde_json::json!(1))),
            Err(RuleLoadError::UnknownCondition(_))
        ));
        assert!(matches!(
            compile_rule(&rule("banner.w", "eq", "decimal", serde_json::json!(1))),
            Err(RuleLoadError::UnknownValueType(_))
        ));
    }

    #[test]
    fn rejects_bad_range_values() {
        assert!(matches!(
            compile_rule(&rule("banner.w", "between", "int", serde_json::json!([1]))),
            Err(RuleLoadError::BadArity { .. })
        ));
        assert!(matches!(
            compile_rule(&rule(
                "banner.w",
                "between",
                "int",
                serde_json::json!([5, 1])
            )),
            Err(RuleLoadError::UnorderedRange)
        ));
        assert!(matches!(
            compile_rule(&rule(
                "bid.id",
                "between",
                "string",
                serde_json::json!(["a", "b"])
            )),
            Err(RuleLoadError::RangeNeedsNumeric(_))
        ));
    }

    #[test]
    fn rejects_empty_string_for_non_exists() {
        assert!(matches!(
            compile_rule(&rule("bid.id", "eq", "string", serde_json::json!(""))),
            Err(RuleLoadError::EmptyString(_))
        ));
    }

    #[test]
    fn rejects_duplicate_field_condition_pairs() {
        let rules = vec![
            rule("banner.w", "ge", "int", serde_json::json!(100)),
            rule("banner.w", "le", "int", serde_json::json!(600)),
            rule("banner.w", "ge", "int", serde_json::json!(200)),
        ];

        assert!(matches!(
            compile_partner("dsp1", &rules),
            Err(RuleLoadError::DuplicateRule { .. })
        ));
    }

    #[test]
    fn groups_rules_by_field() {
        let rules = vec![
            rule("banner.w", "ge", "int", serde_json::json!(100)),
            rule("banner.w", "le", "int", serde_json::json!(600)),
            rule("device.geo.country", "eq", "string", serde_json::json!("US")),
        ];

        let set = compile_partner("dsp1", &rules).unwrap();
        assert_eq!(set.rule_count(), 3);
        assert_eq!(set.groups.len(), 2);
    }

    #[test]
    fn emit_parse_compile_round_trip() {
        let rules = vec![
            rule("banner.w", "between", "int", serde_json::json!([100, 600])),
            rule("device.geo.country", "ne", "string", serde_json::json!("RU")),
        ];
        let original = compile_partner("dsp1", &rules).unwrap();

        let emitted = serde_json::to_vec(&rules).unwrap();
        let parsed: Vec<SimpleRule> = serde_json::from_slice(&emitted).unwrap();
        let recompiled = compile_partner("dsp1", &parsed).unwrap();

        assert_eq!(original.groups, recompiled.groups);
    }
}
