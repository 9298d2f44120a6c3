//! Plan steps returned by the planning backend.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{ExcelError, Result};

/// One step of an agent plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlanStep {
    #[serde(deserialize_with = "lenient_index")]
    pub step_index: i64,
    #[serde(deserialize_with = "nullable_string")]
    pub step_title: String,
    #[serde(deserialize_with = "nullable_string")]
    pub step_past_tense_description: String,
    #[serde(rename = "validVBACode", deserialize_with = "nullable_string")]
    pub valid_vba_code: String,
}

// The backend sends indices as numbers or numeric strings.
fn lenient_index<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<i64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let index = match &value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        Value::Null => Some(0),
        _ => None,
    };
    index.ok_or_else(|| serde::de::Error::custom(format!("invalid stepIndex: {value}")))
}

fn nullable_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl PlanStep {
    /// A step is executable when its VBA declares a `Sub`.
    pub fn is_executable(&self) -> bool {
        !self.valid_vba_code.trim().is_empty() && self.valid_vba_code.contains("Sub ")
    }

    /// The step title, or `Step {index}` when the backend sent none.
    pub fn title(&self) -> String {
        if self.step_title.is_empty() {
            format!("Step {}", self.step_index)
        } else {
            self.step_title.clone()
        }
    }
}

#[derive(Deserialize)]
struct PlanStepsBody {
    value: Vec<PlanStep>,
}

/// Parse the `value` array of a plan-steps query response, in backend order.
pub fn parse_plan_steps(json: &str) -> Result<Vec<PlanStep>> {
    let body: PlanStepsBody = serde_json::from_str(json)
        .map_err(|e| ExcelError::InvalidPlanSteps(e.to_string()))?;
    Ok(body.value)
}

/// The executable steps sorted by `stepIndex`. The sort is stable, so steps
/// sharing an index keep their backend order.
pub fn executable_steps(steps: &[PlanStep]) -> Vec<&PlanStep> {
    let mut runnable: Vec<&PlanStep> = steps.iter().filter(|s| s.is_executable()).collect();
    runnable.sort_by_key(|s| s.step_index);
    runnable
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_plan_steps() {
        let json = r#"{"value":[
            {"stepIndex":2,"stepTitle":"Format","stepPastTenseDescription":"Formatted","validVBACode":"Sub Main()\nEnd Sub"},
            {"stepIndex":"1","stepTitle":"Explain","stepPastTenseDescription":"Explained","validVBACode":null}
        ],"nextPageToken":null}"#;
        let steps = parse_plan_steps(json).unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].step_title, "Format");
        assert_eq!(steps[1].step_index, 1);
        assert_eq!(steps[1].valid_vba_code, "");
        assert!(steps[0].is_executable());
        assert!(!steps[1].is_executable());
    }

    #[test]
    fn test_missing_value_is_invalid() {
        assert!(matches!(
            parse_plan_steps(r#"{"data":[]}"#),
            Err(ExcelError::InvalidPlanSteps(_))
        ));
    }

    #[test]
    fn test_executable_steps_sorted() {
        let step = |i: i64, code: &str| PlanStep {
            step_index: i,
            valid_vba_code: code.to_string(),
            ..Default::default()
        };
        let steps = vec![
            step(2, "' comment only"),
            step(3, "Sub Main()\nEnd Sub"),
            step(1, "Sub Main()\nEnd Sub"),
            step(0, "   "),
        ];
        let order: Vec<i64> = executable_steps(&steps).iter().map(|s| s.step_index).collect();
        assert_eq!(order, vec![1, 3]);
    }

    #[test]
    fn test_title_fallback() {
        let step = PlanStep {
            step_index: 4,
            ..Default::default()
        };
        assert_eq!(step.title(), "Step 4");
    }
}
