//! Scenario selection for matched endpoints.
//!
//! Given an endpoint and an inbound request, pick the canned response to return:
//!
//! 1. the first scenario (in declaration order) that has conditions and whose
//!    conditions all hold,
//! 2. otherwise the scenario named by the endpoint's `default_scenario_id`,
//! 3. otherwise the first scenario flagged `is_default`,
//! 4. otherwise the first scenario,
//! 5. otherwise nothing.
//!
//! # Module Structure
//!
//! - `request` - Borrowed view of the request attributes conditions can inspect
//! - `condition` - Single-condition evaluation

mod condition;
mod request;

pub use condition::evaluate_condition;
pub use request::{parse_query_string, MatchRequest};

use crate::mock_api::{EndpointConfig, ScenarioConfig};
use serde::Serialize;

/// Which rule picked the scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SelectionReason {
    Conditions,
    ExplicitDefault,
    FlaggedDefault,
    FirstScenario,
}

/// A selected scenario together with the rule that chose it.
#[derive(Debug, Clone, Copy)]
pub struct ScenarioSelection<'a> {
    pub scenario: &'a ScenarioConfig,
    pub reason: SelectionReason,
}

/// Select the scenario for `request`, or `None` if the endpoint has no scenarios.
pub fn select_scenario<'a>(
    endpoint: &'a EndpointConfig,
    request: &MatchRequest<'_>,
) -> Option<ScenarioSelection<'a>> {
    let conditional = endpoint.scenarios.iter().find(|scenario| {
        !scenario.conditions.is_empty()
            && scenario
                .conditions
                .iter()
                .all(|condition| evaluate_condition(condition, request))
    });

    if let Some(scenario) = conditional {
        return Some(ScenarioSelection {
            scenario,
            reason: SelectionReason::Conditions,
        });
    }

    fallback_scenario(endpoint)
}

/// Convenience wrapper over [`select_scenario`] returning just the scenario.
pub fn match_scenario<'a>(
    endpoint: &'a EndpointConfig,
    request: &MatchRequest<'_>,
) -> Option<&'a ScenarioConfig> {
    select_scenario(endpoint, request).map(|selection| selection.scenario)
}

/// The scenario returned when no conditional scenario matches.
pub fn fallback_scenario(endpoint: &EndpointConfig) -> Option<ScenarioSelection<'_>> {
    if let Some(ref default_id) = endpoint.default_scenario_id {
        if let Some(scenario) = endpoint.scenarios.iter().find(|s| &s.id == default_id) {
            return Some(ScenarioSelection {
                scenario,
                reason: SelectionReason::ExplicitDefault,
            });
        }
    }

    if let Some(scenario) = endpoint.scenarios.iter().find(|s| s.is_default) {
        return Some(ScenarioSelection {
            scenario,
            reason: SelectionReason::FlaggedDefault,
        });
    }

    endpoint.scenarios.first().map(|scenario| ScenarioSelection {
        scenario,
        reason: SelectionReason::FirstScenario,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_api::{ConditionOperator, ConditionType, HttpMethod, ScenarioCondition};
    use hyper::HeaderMap;

    fn scenario(id: &str, status: u16) -> ScenarioConfig {
        ScenarioConfig {
            id: id.to_string(),
            name: id.to_string(),
            status_code: status,
            headers: Default::default(),
            body: serde_json::Value::Null,
            conditions: vec![],
            is_default: false,
        }
    }

    fn header_condition(key: &str, operator: ConditionOperator, value: Option<&str>) -> ScenarioCondition {
        ScenarioCondition {
            condition_type: ConditionType::Header,
            key: key.to_string(),
            operator,
            value: value.map(str::to_string),
        }
    }

    fn endpoint(scenarios: Vec<ScenarioConfig>) -> EndpointConfig {
        EndpointConfig {
            id: "ep".to_string(),
            method: HttpMethod::Post,
            path: "/orders".to_string(),
            scenarios,
            default_scenario_id: None,
        }
    }

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, v.parse().unwrap());
        }
        map
    }

    #[test]
    fn test_no_conditions_prefers_flagged_default() {
        let mut second = scenario("second", 201);
        second.is_default = true;
        let ep = endpoint(vec![scenario("first", 200), second, scenario("third", 202)]);

        let h = HeaderMap::new();
        let request = MatchRequest::new(&h, None, None);
        let selection = select_scenario(&ep, &request).unwrap();
        assert_eq!(selection.scenario.id, "second");
        assert_eq!(selection.reason, SelectionReason::FlaggedDefault);
    }

    #[test]
    fn test_no_conditions_no_default_picks_first() {
        let ep = endpoint(vec![scenario("first", 200), scenario("second", 201)]);

        let h = HeaderMap::new();
        let request = MatchRequest::new(&h, None, None);
        let selection = select_scenario(&ep, &request).unwrap();
        assert_eq!(selection.scenario.id, "first");
        assert_eq!(selection.reason, SelectionReason::FirstScenario);
    }

    #[test]
    fn test_explicit_default_overrides_flag() {
        let mut flagged = scenario("flagged", 200);
        flagged.is_default = true;
        let mut ep = endpoint(vec![flagged, scenario("explicit", 202)]);
        ep.default_scenario_id = Some("explicit".to_string());

        let h = HeaderMap::new();
        let request = MatchRequest::new(&h, None, None);
        let selection = select_scenario(&ep, &request).unwrap();
        assert_eq!(selection.scenario.id, "explicit");
        assert_eq!(selection.reason, SelectionReason::ExplicitDefault);
    }

    #[test]
    fn test_dangling_default_id_falls_through() {
        let mut flagged = scenario("flagged", 200);
        flagged.is_default = true;
        let mut ep = endpoint(vec![scenario("first", 201), flagged]);
        ep.default_scenario_id = Some("deleted".to_string());

        let h = HeaderMap::new();
        let request = MatchRequest::new(&h, None, None);
        assert_eq!(match_scenario(&ep, &request).unwrap().id, "flagged");
    }

    #[test]
    fn test_empty_endpoint_selects_nothing() {
        let ep = endpoint(vec![]);
        let h = HeaderMap::new();
        let request = MatchRequest::new(&h, None, None);
        assert!(select_scenario(&ep, &request).is_none());
    }

    #[test]
    fn test_header_equals_condition() {
        let mut default = scenario("default", 200);
        default.is_default = true;
        let mut test = scenario("test", 299);
        test.conditions = vec![header_condition("x-test", ConditionOperator::Equals, Some("1"))];
        let ep = endpoint(vec![default, test]);

        let with = headers(&[("x-test", "1")]);
        let request = MatchRequest::new(&with, None, None);
        let selection = select_scenario(&ep, &request).unwrap();
        assert_eq!(selection.scenario.id, "test");
        assert_eq!(selection.reason, SelectionReason::Conditions);

        let other = headers(&[("x-test", "2")]);
        let request = MatchRequest::new(&other, None, None);
        assert_eq!(match_scenario(&ep, &request).unwrap().id, "default");

        let none = HeaderMap::new();
        let request = MatchRequest::new(&none, None, None);
        assert_eq!(match_scenario(&ep, &request).unwrap().id, "default");
    }

    #[test]
    fn test_first_matching_conditional_wins() {
        let mut a = scenario("a", 400);
        a.conditions = vec![header_condition("x-mode", ConditionOperator::Exists, None)];
        let mut b = scenario("b", 401);
        b.conditions = vec![header_condition("x-mode", ConditionOperator::Equals, Some("auth"))];
        let ep = endpoint(vec![a, b]);

        let h = headers(&[("x-mode", "auth")]);
        let request = MatchRequest::new(&h, None, None);
        assert_eq!(match_scenario(&ep, &request).unwrap().id, "a");
    }

    #[test]
    fn test_conditions_are_and_combined() {
        let mut gated = scenario("gated", 403);
        gated.conditions = vec![
            header_condition("x-user", ConditionOperator::Exists, None),
            ScenarioCondition {
                condition_type: ConditionType::Query,
                key: "role".to_string(),
                operator: ConditionOperator::Equals,
                value: Some("guest".to_string()),
            },
        ];
        let ep = endpoint(vec![scenario("ok", 200), gated]);

        let h = headers(&[("x-user", "bob")]);
        let request = MatchRequest::new(&h, Some("role=guest"), None);
        assert_eq!(match_scenario(&ep, &request).unwrap().id, "gated");

        let request = MatchRequest::new(&h, Some("role=admin"), None);
        assert_eq!(match_scenario(&ep, &request).unwrap().id, "ok");

        let empty = HeaderMap::new();
        let request = MatchRequest::new(&empty, Some("role=guest"), None);
        assert_eq!(match_scenario(&ep, &request).unwrap().id, "ok");
    }

    #[test]
    fn test_conditional_scenario_still_used_as_fallback() {
        // Only scenario is conditional and unmatched: first-in-list still applies
        let mut only = scenario("only", 422);
        only.conditions = vec![header_condition("x-force-error", ConditionOperator::Exists, None)];
        let ep = endpoint(vec![only]);

        let h = HeaderMap::new();
        let request = MatchRequest::new(&h, None, None);
        let selection = select_scenario(&ep, &request).unwrap();
        assert_eq!(selection.scenario.id, "only");
        assert_eq!(selection.reason, SelectionReason::FirstScenario);
    }
}
