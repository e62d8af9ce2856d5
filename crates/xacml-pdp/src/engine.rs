//! Reference evaluation of candidate policies.
//!
//! Policies are matched by Target, and the rules of applicable policies by their own Targets.
//! Results combine with deny-overrides at every level, whatever combining algorithm the
//! document names. Rule conditions are not interpreted: a conditional Permit rule never
//! applies, a conditional Deny rule always does.

use std::cmp::Ordering;

use regex::Regex;
use xacml_common::{
    attribute::{AttributeType, AttributeValue, Category},
    context::RequestContext,
    decision::Decision,
    id::function,
    policy::{Effect, PolicyDocument, PolicyKind, Target, TargetMatch},
};

/// Evaluation error.
#[derive(thiserror::Error, Clone, PartialEq, Eq, Debug)]
pub enum EvalError {
    /// The match function is not implemented.
    #[error("unsupported match function {0}")]
    UnknownFunction(String),

    /// A policy literal could not be interpreted.
    #[error("invalid policy value `{0}`")]
    InvalidValue(String),

    /// The match uses an attribute selector.
    #[error("attribute selectors are not supported")]
    Selector,
}

/// A tracer used to collect debugging information from the evaluator.
#[allow(unused)]
pub trait PolicyTracer {
    /// Reports the candidate policies about to be evaluated.
    fn report_candidates<'a>(&mut self, policies: impl Iterator<Item = &'a str>) {}

    /// Report start of a policy evaluation.
    fn report_policy_eval_start(&mut self, policy_id: &str) {}

    /// Reports the decision of a policy after it has been evaluated.
    fn report_policy_eval_end(&mut self, decision: Decision) {}
}

/// A [PolicyTracer] that does nothing.
pub struct NoOpPolicyTracer;

impl PolicyTracer for NoOpPolicyTracer {}

/// A [PolicyTracer] that emits `tracing` debug events.
pub struct LogPolicyTracer;

impl PolicyTracer for LogPolicyTracer {
    fn report_candidates<'a>(&mut self, policies: impl Iterator<Item = &'a str>) {
        let policies: Vec<&str> = policies.collect();
        tracing::debug!(?policies, "candidate policies");
    }

    fn report_policy_eval_start(&mut self, policy_id: &str) {
        tracing::debug!(policy_id, "evaluating policy");
    }

    fn report_policy_eval_end(&mut self, decision: Decision) {
        tracing::debug!(?decision, "policy evaluated");
    }
}

/// Evaluates requests against candidate policies.
#[derive(Default, Debug)]
pub struct TargetEvaluator;

impl TargetEvaluator {
    /// Evaluate `request` against `policies`.
    ///
    /// `NotApplicable` when no policy applies. An error from one policy is reported unless
    /// another policy denies.
    pub fn eval(
        &self,
        request: &RequestContext,
        policies: &[PolicyDocument],
        tracer: &mut impl PolicyTracer,
    ) -> Result<Decision, EvalError> {
        tracer.report_candidates(policies.iter().map(|policy| policy.id.as_str()));

        combine_deny_overrides(policies.iter().map(|policy| {
            tracer.report_policy_eval_start(&policy.id);
            let result = eval_policy(request, policy);
            tracer.report_policy_eval_end(*result.as_ref().unwrap_or(&Decision::Indeterminate));
            result
        }))
    }
}

fn combine_deny_overrides(
    results: impl Iterator<Item = Result<Decision, EvalError>>,
) -> Result<Decision, EvalError> {
    let mut permit = false;
    let mut first_error = None;

    for result in results {
        match result {
            Ok(Decision::Deny) => return Ok(Decision::Deny),
            Ok(Decision::Permit) => permit = true,
            Ok(Decision::NotApplicable) => {}
            Ok(Decision::Indeterminate) => {
                first_error.get_or_insert(EvalError::InvalidValue("indeterminate".to_string()));
            }
            Err(err) => {
                first_error.get_or_insert(err);
            }
        }
    }

    match (first_error, permit) {
        (Some(err), _) => Err(err),
        (None, true) => Ok(Decision::Permit),
        (None, false) => Ok(Decision::NotApplicable),
    }
}

fn eval_policy(request: &RequestContext, policy: &PolicyDocument) -> Result<Decision, EvalError> {
    if !target_matches(request, &policy.target)? {
        return Ok(Decision::NotApplicable);
    }

    match policy.kind {
        PolicyKind::Policy => combine_deny_overrides(policy.rules.iter().map(|rule| {
            if !target_matches(request, &rule.target)? {
                return Ok(Decision::NotApplicable);
            }
            Ok(match (rule.effect, rule.has_condition) {
                (Effect::Permit, true) => Decision::NotApplicable,
                (Effect::Permit, false) => Decision::Permit,
                (Effect::Deny, _) => Decision::Deny,
            })
        })),
        PolicyKind::PolicySet => combine_deny_overrides(
            policy
                .children
                .iter()
                .map(|child| eval_policy(request, child)),
        ),
    }
}

fn target_matches(request: &RequestContext, target: &Target) -> Result<bool, EvalError> {
    for category in Category::ALL {
        let category_target = target.category(category);
        if category_target.any {
            continue;
        }

        let mut matched = false;
        for alternative in &category_target.alternatives {
            let mut all = true;
            for m in alternative {
                if !match_values(request, category, m)? {
                    all = false;
                    break;
                }
            }
            if all {
                matched = true;
                break;
            }
        }

        if !matched {
            return Ok(false);
        }
    }

    Ok(true)
}

/// Whether the match function holds for the policy literal and some request value.
fn match_values(
    request: &RequestContext,
    category: Category,
    m: &TargetMatch,
) -> Result<bool, EvalError> {
    let attribute_id = m.attribute_id.as_deref().ok_or(EvalError::Selector)?;
    let values = request.values(category, attribute_id);

    if function::is_regexp(&m.match_id) {
        let regex = Regex::new(&format!("^(?:{})$", m.value))
            .map_err(|_| EvalError::InvalidValue(m.value.clone()))?;
        return Ok(values.map(AttributeValue::encode).any(|v| regex.is_match(&v)));
    }

    let ty = m
        .data_type
        .ok_or_else(|| EvalError::InvalidValue(m.value.clone()))?;
    let literal =
        AttributeValue::decode(ty, &m.value).map_err(|_| EvalError::InvalidValue(m.value.clone()))?;

    let wanted: &[Ordering] = match m.match_id.as_str() {
        id if function::is_equality(id) => &[Ordering::Equal],
        function::DATETIME_LESS_THAN | function::INTEGER_LESS_THAN => &[Ordering::Less],
        function::DATETIME_GREATER_THAN | function::INTEGER_GREATER_THAN => &[Ordering::Greater],
        other => return Err(EvalError::UnknownFunction(other.to_string())),
    };

    Ok(values
        .filter_map(|value| convert(value, ty))
        .filter_map(|value| compare(&literal, &value))
        .any(|ordering| wanted.contains(&ordering)))
}

fn convert(value: &AttributeValue, ty: AttributeType) -> Option<AttributeValue> {
    if value.ty() == ty {
        return Some(value.clone());
    }
    AttributeValue::decode(ty, &value.encode()).ok()
}

fn compare(a: &AttributeValue, b: &AttributeValue) -> Option<Ordering> {
    use AttributeValue as V;
    match (a, b) {
        (V::String(a), V::String(b)) | (V::AnyUri(a), V::AnyUri(b)) => Some(a.cmp(b)),
        (V::DateTime(a), V::DateTime(b)) => Some(a.cmp(b)),
        (V::Date(a), V::Date(b)) => Some(a.cmp(b)),
        (V::Time(a), V::Time(b)) => Some(a.cmp(b)),
        (V::Integer(a), V::Integer(b)) => Some(a.cmp(b)),
        (V::Boolean(a), V::Boolean(b)) => Some(a.cmp(b)),
        _ => None,
    }
}
