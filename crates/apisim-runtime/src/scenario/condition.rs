//! Evaluation of a single scenario condition.

use super::request::MatchRequest;
use crate::mock_api::{ConditionOperator, ConditionType, ScenarioCondition};
use std::borrow::Cow;

/// Evaluate one condition against the request.
///
/// An absent attribute never satisfies any operator.
pub fn evaluate_condition(condition: &ScenarioCondition, request: &MatchRequest<'_>) -> bool {
    let actual: Option<Cow<'_, str>> = match condition.condition_type {
        ConditionType::Header => request.header(&condition.key).map(Cow::Borrowed),
        ConditionType::Query => request.query_param(&condition.key).map(Cow::Borrowed),
        ConditionType::Body => request.body_field(&condition.key).map(Cow::Owned),
    };

    let Some(actual) = actual else {
        return false;
    };

    match condition.operator {
        ConditionOperator::Exists => !actual.is_empty(),
        ConditionOperator::Equals => condition
            .value
            .as_deref()
            .is_some_and(|expected| actual == expected),
        ConditionOperator::Contains => condition
            .value
            .as_deref()
            .is_some_and(|expected| actual.contains(expected)),
    }
}
