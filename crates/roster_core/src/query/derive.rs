//! Method-name query derivation.
//!
//! Grammar (snake_case):
//! `(find|read|get|query|search|count|exists)[_<subject>]_by_<criteria>[_order_by_<orders>]`
//! where criteria are `_and_`-joined `<property>[_<operator>]` terms and
//! orders are `<property>[_asc|_desc]` terms.

use crate::query::descriptor::{Operator, Subject};
use crate::query::error::QueryDerivationError;
use crate::query::sort::{ColumnOrder, Direction};
use crate::store::entity::{resolve_column, Entity};
use once_cell::sync::OnceCell;
use regex::Regex;

static METHOD_PATTERN: OnceCell<Regex> = OnceCell::new();

const OPERATOR_SUFFIXES: &[(&str, Operator)] = &[
    ("_greater_than_equal", Operator::GreaterThanEqual),
    ("_greater_than", Operator::GreaterThan),
    ("_less_than_equal", Operator::LessThanEqual),
    ("_less_than", Operator::LessThan),
    ("_after", Operator::GreaterThan),
    ("_before", Operator::LessThan),
    ("_between", Operator::Between),
    ("_is_not_null", Operator::IsNotNull),
    ("_not_null", Operator::IsNotNull),
    ("_is_null", Operator::IsNull),
    ("_null", Operator::IsNull),
    ("_not_in", Operator::NotIn),
    ("_in", Operator::In),
    ("_not_like", Operator::NotLike),
    ("_like", Operator::Like),
    ("_starting_with", Operator::StartingWith),
    ("_ending_with", Operator::EndingWith),
    ("_containing", Operator::Containing),
    ("_is_not", Operator::NotEqual),
    ("_not", Operator::NotEqual),
    ("_equals", Operator::Equal),
    ("_is", Operator::Equal),
];

/// Keywords recognized by the grammar family but not translated.
const UNSUPPORTED_SUFFIXES: &[&str] = &[
    "_ignore_case",
    "_is_not_empty",
    "_is_empty",
    "_true",
    "_false",
    "_near",
    "_within",
    "_regex",
    "_matches",
    "_exists",
];

/// Structural result of decomposing a method name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMethod {
    pub subject: Subject,
    /// `(column, operator)` terms joined with AND.
    pub criteria: Vec<(&'static str, Operator)>,
    pub ordering: Vec<ColumnOrder>,
}

impl ParsedMethod {
    /// Total number of arguments the criteria consume.
    pub fn arity(&self) -> usize {
        self.criteria.iter().map(|(_, operator)| operator.arity()).sum()
    }
}

pub fn parse_method<E: Entity>(method: &str) -> Result<ParsedMethod, QueryDerivationError> {
    let unrecognized = || QueryDerivationError::UnrecognizedMethod {
        method: method.to_string(),
    };

    let pattern = METHOD_PATTERN.get_or_try_init(|| {
        Regex::new(r"^(find|read|get|query|search|count|exists)(?:_([a-z0-9_]+?))??_by_([a-z0-9_]+)$")
    });
    let pattern = pattern.map_err(|err| QueryDerivationError::MalformedQuery {
        name: method.to_string(),
        detail: err.to_string(),
    })?;
    let captures = pattern.captures(method).ok_or_else(unrecognized)?;

    let subject = match captures.get(1).map(|m| m.as_str()) {
        Some("count") => Subject::Count,
        Some("exists") => Subject::Exists,
        _ => Subject::Find,
    };
    if captures
        .get(2)
        .is_some_and(|m| m.as_str() == "order" || m.as_str().ends_with("_order"))
    {
        return Err(unrecognized());
    }

    let tail = captures.get(3).map(|m| m.as_str()).ok_or_else(unrecognized)?;
    let (criteria_text, order_text) = match tail.split_once("_order_by_") {
        Some((criteria, orders)) => (criteria, Some(orders)),
        None => (tail, None),
    };

    let criteria = criteria_text
        .split("_and_")
        .map(|part| resolve_term::<E>(method, part))
        .collect::<Result<Vec<_>, _>>()?;

    if subject != Subject::Find && order_text.is_some() {
        return Err(QueryDerivationError::UnsupportedOperator {
            method: method.to_string(),
            keyword: "order_by".to_string(),
        });
    }
    let ordering = match order_text {
        Some(text) => parse_orders::<E>(method, text)?,
        None => Vec::new(),
    };

    Ok(ParsedMethod {
        subject,
        criteria,
        ordering,
    })
}

fn resolve_term<E: Entity>(
    method: &str,
    part: &str,
) -> Result<(&'static str, Operator), QueryDerivationError> {
    if part.is_empty() {
        return Err(QueryDerivationError::UnrecognizedMethod {
            method: method.to_string(),
        });
    }
    if part.contains("_or_") {
        return Err(QueryDerivationError::UnsupportedOperator {
            method: method.to_string(),
            keyword: "or".to_string(),
        });
    }
    if let Some(column) = resolve_column::<E>(part) {
        return Ok((column, Operator::Equal));
    }

    for (suffix, operator) in OPERATOR_SUFFIXES {
        if let Some(column) = part
            .strip_suffix(*suffix)
            .and_then(|property| resolve_column::<E>(property))
        {
            return Ok((column, *operator));
        }
    }

    if let Some(keyword) = UNSUPPORTED_SUFFIXES
        .iter()
        .find(|keyword| part.ends_with(**keyword))
    {
        return Err(QueryDerivationError::UnsupportedOperator {
            method: method.to_string(),
            keyword: keyword.trim_start_matches('_').to_string(),
        });
    }

    Err(QueryDerivationError::UnknownProperty {
        method: method.to_string(),
        property: part.to_string(),
    })
}

fn parse_orders<E: Entity>(
    method: &str,
    text: &str,
) -> Result<Vec<ColumnOrder>, QueryDerivationError> {
    let mut orders = Vec::new();
    for group in text.split("_and_") {
        let mut rest = group;
        loop {
            let cut = [("_asc_", Direction::Asc), ("_desc_", Direction::Desc)]
                .into_iter()
                .filter_map(|(marker, direction)| {
                    rest.find(marker).map(|at| (at, marker, direction))
                })
                .min_by_key(|(at, _, _)| *at);
            match cut {
                Some((at, marker, direction)) => {
                    orders.push(order_term::<E>(method, &rest[..at], direction)?);
                    rest = &rest[at + marker.len()..];
                }
                None => {
                    let (property, direction) = if let Some(p) = rest.strip_suffix("_desc") {
                        (p, Direction::Desc)
                    } else if let Some(p) = rest.strip_suffix("_asc") {
                        (p, Direction::Asc)
                    } else {
                        (rest, Direction::Asc)
                    };
                    orders.push(order_term::<E>(method, property, direction)?);
                    break;
                }
            }
        }
    }
    Ok(orders)
}

fn order_term<E: Entity>(
    method: &str,
    property: &str,
    direction: Direction,
) -> Result<ColumnOrder, QueryDerivationError> {
    resolve_column::<E>(property)
        .map(|column| ColumnOrder::new(column, direction))
        .ok_or_else(|| QueryDerivationError::UnknownProperty {
            method: method.to_string(),
            property: property.to_string(),
        })
}

/// Registry key a method resolves to by convention: `Entity.lowerCamelMethod`.
pub fn conventional_key(entity: &str, method: &str) -> String {
    let mut camel = String::with_capacity(method.len());
    for (index, word) in method.split('_').filter(|w| !w.is_empty()).enumerate() {
        if index == 0 {
            camel.push_str(word);
            continue;
        }
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            camel.extend(first.to_uppercase());
            camel.push_str(chars.as_str());
        }
    }
    format!("{entity}.{camel}")
}

#[cfg(test)]
mod tests {
    use super::{conventional_key, parse_method};
    use crate::model::member::Member;
    use crate::query::descriptor::{Operator, Subject};
    use crate::query::error::QueryDerivationError;
    use crate::query::sort::{ColumnOrder, Direction};

    #[test]
    fn decomposes_and_joined_criteria() {
        let parsed = parse_method::<Member>("find_by_username_and_age_greater_than").unwrap();
        assert_eq!(parsed.subject, Subject::Find);
        assert_eq!(
            parsed.criteria,
            vec![("username", Operator::Equal), ("age", Operator::GreaterThan)]
        );
        assert_eq!(parsed.arity(), 2);
    }

    #[test]
    fn subject_words_between_prefix_and_by_are_ignored() {
        let parsed = parse_method::<Member>("find_optional_member_by_username").unwrap();
        assert_eq!(parsed.criteria, vec![("username", Operator::Equal)]);
    }

    #[test]
    fn count_exists_and_ordering_are_recognized() {
        assert_eq!(
            parse_method::<Member>("count_by_age").unwrap().subject,
            Subject::Count
        );
        assert_eq!(
            parse_method::<Member>("exists_by_team_id_is_null")
                .unwrap()
                .criteria,
            vec![("team_id", Operator::IsNull)]
        );

        let parsed =
            parse_method::<Member>("find_by_age_between_order_by_age_desc_username").unwrap();
        assert_eq!(parsed.criteria, vec![("age", Operator::Between)]);
        assert_eq!(parsed.arity(), 2);
        assert_eq!(
            parsed.ordering,
            vec![
                ColumnOrder::new("age", Direction::Desc),
                ColumnOrder::new("username", Direction::Asc)
            ]
        );
    }

    #[test]
    fn unsupported_keywords_fail() {
        let err = parse_method::<Member>("find_by_username_ignore_case").unwrap_err();
        assert!(matches!(
            err,
            QueryDerivationError::UnsupportedOperator { ref keyword, .. } if keyword == "ignore_case"
        ));

        let err = parse_method::<Member>("find_by_username_or_age").unwrap_err();
        assert!(matches!(
            err,
            QueryDerivationError::UnsupportedOperator { ref keyword, .. } if keyword == "or"
        ));
    }

    #[test]
    fn unknown_properties_and_shapes_fail() {
        assert!(matches!(
            parse_method::<Member>("find_by_nickname").unwrap_err(),
            QueryDerivationError::UnknownProperty { .. }
        ));
        assert!(matches!(
            parse_method::<Member>("load_everything").unwrap_err(),
            QueryDerivationError::UnrecognizedMethod { .. }
        ));
    }

    #[test]
    fn conventional_key_uses_lower_camel_case() {
        assert_eq!(
            conventional_key("Member", "find_by_username"),
            "Member.findByUsername"
        );
        assert_eq!(
            conventional_key("Member", "find_member_list_by_username"),
            "Member.findMemberListByUsername"
        );
    }
}
