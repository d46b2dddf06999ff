use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::types::{ModuleKey, WorkflowId};

/// Analysis task types understood by the AI orchestration collaborator.
///
/// Workflow authors reference these through step action names; the mapping is
/// resolved when a definition is registered, so an unknown action fails fast
/// at load time instead of silently defaulting during execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiTaskType {
    /// Generic customer behavior analysis.
    CustomerAnalysis,
    /// Sentiment scoring over call transcripts or messages.
    SentimentAnalysis,
    /// Headcount / hiring demand forecast for the HR module.
    HiringForecast,
    /// Revenue and cash-flow projection for the accounting module.
    FinancialForecast,
    /// Likelihood that an open invoice will be paid.
    PaymentRisk,
    /// Post-call summary and next-step extraction.
    CallSummary,
}

impl AiTaskType {
    /// Resolve a step action name to a task type.
    ///
    /// Returns `None` for unmapped actions; callers reject the definition.
    #[must_use]
    pub fn from_action(action: &str) -> Option<Self> {
        match action {
            "analyze_customer" => Some(Self::CustomerAnalysis),
            "analyze_sentiment" => Some(Self::SentimentAnalysis),
            "forecast_hiring" => Some(Self::HiringForecast),
            "forecast_financials" => Some(Self::FinancialForecast),
            "score_payment_risk" => Some(Self::PaymentRisk),
            "summarize_call" => Some(Self::CallSummary),
            _ => None,
        }
    }

    /// Return a string representation of the task type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CustomerAnalysis => "customer_analysis",
            Self::SentimentAnalysis => "sentiment_analysis",
            Self::HiringForecast => "hiring_forecast",
            Self::FinancialForecast => "financial_forecast",
            Self::PaymentRisk => "payment_risk",
            Self::CallSummary => "call_summary",
        }
    }
}

impl std::fmt::Display for AiTaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of work a workflow step performs.
///
/// A tagged variant rather than a free-form type string: the step kind is
/// fixed at definition time and dispatch never falls through to a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    /// Delegate to the AI orchestration collaborator.
    AiAnalysis { task: AiTaskType },
    /// Apply a change to the target module and publish the resulting event.
    DataSync,
    /// Dispatch a notification (delivery is not verified).
    Notification,
    /// Pause the execution until an approval decision arrives.
    Approval,
    /// Call an external API keyed by an `endpoint` parameter.
    ExternalApi,
}

impl StepKind {
    /// Short tag used in logs and step results.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AiAnalysis { .. } => "ai_analysis",
            Self::DataSync => "data_sync",
            Self::Notification => "notification",
            Self::Approval => "approval",
            Self::ExternalApi => "external_api",
        }
    }
}

/// One unit of work within a workflow.
///
/// Steps form a directed graph via `next_step` and `fallback_steps`. A step
/// has at most one successor — the engine executes strictly sequentially —
/// while `fallback_steps` lists alternatives of which only the first is run
/// when the primary action fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Unique step identifier within the workflow.
    pub id: String,
    /// Human-readable step name.
    pub name: String,
    /// What kind of work this step performs.
    pub kind: StepKind,
    /// Module the step acts against.
    pub target_module: ModuleKey,
    /// Action name within the target module.
    pub action: String,
    /// Free-form parameters passed to the step executor.
    #[serde(default)]
    pub parameters: serde_json::Value,
    /// Successor step id, if any. `None` completes the execution.
    #[serde(default)]
    pub next_step: Option<String>,
    /// Alternative steps on failure; only the first entry is executed.
    #[serde(default)]
    pub fallback_steps: Vec<String>,
}

impl WorkflowStep {
    /// Create a new step.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: StepKind,
        target_module: impl Into<ModuleKey>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            target_module: target_module.into(),
            action: action.into(),
            parameters: serde_json::Value::Null,
            next_step: None,
            fallback_steps: Vec::new(),
        }
    }

    /// Set the step parameters.
    #[must_use]
    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }

    /// Set the successor step.
    #[must_use]
    pub fn with_next(mut self, step_id: impl Into<String>) -> Self {
        self.next_step = Some(step_id.into());
        self
    }

    /// Add a fallback step.
    #[must_use]
    pub fn with_fallback(mut self, step_id: impl Into<String>) -> Self {
        self.fallback_steps.push(step_id.into());
        self
    }
}

/// Comparison operator for workflow conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    GreaterThan,
    LessThan,
    Contains,
    Exists,
}

/// A gating predicate evaluated against a trigger payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowCondition {
    /// Dot-notation path into the trigger payload.
    pub field: String,
    /// The comparison operator.
    pub operator: ConditionOperator,
    /// Expected value. Ignored for the `exists` operator.
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    /// Module the field originates from, for documentation purposes.
    #[serde(default)]
    pub source_module: Option<ModuleKey>,
}

impl WorkflowCondition {
    /// Create a new condition.
    #[must_use]
    pub fn new(
        field: impl Into<String>,
        operator: ConditionOperator,
        value: Option<serde_json::Value>,
    ) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
            source_module: None,
        }
    }

    /// Tag the condition with its source module.
    #[must_use]
    pub fn from_module(mut self, module: impl Into<ModuleKey>) -> Self {
        self.source_module = Some(module.into());
        self
    }

    /// Evaluate this condition against a trigger payload.
    #[must_use]
    pub fn evaluate(&self, payload: &serde_json::Value) -> bool {
        let field_value = resolve_path(payload, &self.field);
        match self.operator {
            ConditionOperator::Equals => {
                self.value.as_ref().is_some_and(|v| field_value == *v)
            }
            ConditionOperator::GreaterThan => match (
                field_value.as_f64(),
                self.value.as_ref().and_then(serde_json::Value::as_f64),
            ) {
                (Some(actual), Some(expected)) => actual > expected,
                _ => false,
            },
            ConditionOperator::LessThan => match (
                field_value.as_f64(),
                self.value.as_ref().and_then(serde_json::Value::as_f64),
            ) {
                (Some(actual), Some(expected)) => actual < expected,
                _ => false,
            },
            ConditionOperator::Contains => match (&field_value, self.value.as_ref()) {
                (serde_json::Value::String(haystack), Some(serde_json::Value::String(needle))) => {
                    haystack.contains(needle.as_str())
                }
                (serde_json::Value::Array(items), Some(needle)) => items.contains(needle),
                _ => false,
            },
            ConditionOperator::Exists => !field_value.is_null(),
        }
    }
}

/// Resolve a dotted path against a JSON value.
#[must_use]
pub fn resolve_path(value: &serde_json::Value, path: &str) -> serde_json::Value {
    let mut current = value.clone();
    for segment in path.split('.') {
        match current {
            serde_json::Value::Object(ref map) => {
                current = map.get(segment).cloned().unwrap_or(serde_json::Value::Null);
            }
            _ => return serde_json::Value::Null,
        }
    }
    current
}

/// An (event type, source module) pair that starts workflow evaluation,
/// with optional trigger-level matching conditions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerSpec {
    /// Event type published on the bus (e.g. `deal.won`).
    pub event_type: String,
    /// Module the event originates from.
    pub source_module: ModuleKey,
    /// Conditions that must hold for the trigger to match. Empty = always.
    #[serde(default)]
    pub conditions: Vec<WorkflowCondition>,
}

impl TriggerSpec {
    /// Create a new trigger spec.
    #[must_use]
    pub fn new(event_type: impl Into<String>, source_module: impl Into<ModuleKey>) -> Self {
        Self {
            event_type: event_type.into(),
            source_module: source_module.into(),
            conditions: Vec::new(),
        }
    }

    /// Add a matching condition.
    #[must_use]
    pub fn with_condition(mut self, condition: WorkflowCondition) -> Self {
        self.conditions.push(condition);
        self
    }
}

/// A declarative cross-module workflow definition, immutable at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Unique workflow identifier.
    pub id: WorkflowId,
    /// Human-readable name.
    pub name: String,
    /// What the workflow does.
    pub description: String,
    /// Modules that must all be active for the owning tenant.
    pub required_modules: BTreeSet<ModuleKey>,
    /// Events that start workflow evaluation.
    pub trigger_events: Vec<TriggerSpec>,
    /// Id of the step executions begin at.
    pub entry_step: String,
    /// The step graph.
    pub steps: Vec<WorkflowStep>,
    /// Global gating predicates evaluated before execution starts.
    #[serde(default)]
    pub conditions: Vec<WorkflowCondition>,
    /// Inactive workflows are skipped silently when triggered.
    pub is_active: bool,
}

impl WorkflowDefinition {
    /// Create a new definition. The first step added becomes the entry step
    /// unless [`with_entry`](Self::with_entry) overrides it.
    #[must_use]
    pub fn new(id: impl Into<WorkflowId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            required_modules: BTreeSet::new(),
            trigger_events: Vec::new(),
            entry_step: String::new(),
            steps: Vec::new(),
            conditions: Vec::new(),
            is_active: true,
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add a required module.
    #[must_use]
    pub fn require_module(mut self, module: impl Into<ModuleKey>) -> Self {
        self.required_modules.insert(module.into());
        self
    }

    /// Add a trigger.
    #[must_use]
    pub fn with_trigger(mut self, trigger: TriggerSpec) -> Self {
        self.trigger_events.push(trigger);
        self
    }

    /// Add a step. The first step added becomes the entry step.
    #[must_use]
    pub fn with_step(mut self, step: WorkflowStep) -> Self {
        if self.entry_step.is_empty() {
            self.entry_step = step.id.clone();
        }
        self.steps.push(step);
        self
    }

    /// Override the entry step.
    #[must_use]
    pub fn with_entry(mut self, step_id: impl Into<String>) -> Self {
        self.entry_step = step_id.into();
        self
    }

    /// Add a global condition.
    #[must_use]
    pub fn with_condition(mut self, condition: WorkflowCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Mark the workflow inactive.
    #[must_use]
    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Look up a step by id.
    #[must_use]
    pub fn step(&self, id: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Build a map from step id to step index for quick lookups.
    #[must_use]
    pub fn step_index_map(&self) -> HashMap<String, usize> {
        self.steps
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.clone(), i))
            .collect()
    }

    /// Validate the definition, checking for:
    /// - An empty step list or missing trigger events
    /// - Duplicate step ids
    /// - An entry step that does not exist
    /// - `next_step` / `fallback_steps` referencing non-existent steps
    /// - Cycles in the step graph (a step must not be reachable from itself)
    ///
    /// Returns a list of validation error messages. An empty list means valid.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.steps.is_empty() {
            errors.push(format!("workflow `{}` has no steps", self.id));
            return errors;
        }
        if self.trigger_events.is_empty() {
            errors.push(format!("workflow `{}` has no trigger events", self.id));
        }

        let step_ids: HashSet<&str> = self.steps.iter().map(|s| s.id.as_str()).collect();

        // Check for duplicate step ids.
        if step_ids.len() != self.steps.len() {
            let mut seen = HashSet::new();
            for step in &self.steps {
                if !seen.insert(&step.id) {
                    errors.push(format!("duplicate step id: `{}`", step.id));
                }
            }
        }

        if !step_ids.contains(self.entry_step.as_str()) {
            errors.push(format!(
                "entry step `{}` does not exist in workflow `{}`",
                self.entry_step, self.id
            ));
        }

        // Check that all step references point at existing steps.
        for step in &self.steps {
            if let Some(ref next) = step.next_step
                && !step_ids.contains(next.as_str())
            {
                errors.push(format!(
                    "step `{}` continues to non-existent step `{next}`",
                    step.id
                ));
            }
            for fallback in &step.fallback_steps {
                if !step_ids.contains(fallback.as_str()) {
                    errors.push(format!(
                        "step `{}` falls back to non-existent step `{fallback}`",
                        step.id
                    ));
                }
            }
        }

        // Check for cycles using BFS from each step over next/fallback edges.
        let index_map = self.step_index_map();
        for (i, step) in self.steps.iter().enumerate() {
            let mut visited = HashSet::new();
            let mut queue: VecDeque<usize> = Self::successors(step, &index_map).collect();
            while let Some(idx) = queue.pop_front() {
                if idx == i {
                    errors.push(format!(
                        "cycle detected: step `{}` is reachable from itself",
                        step.id
                    ));
                    break;
                }
                if !visited.insert(idx) {
                    continue;
                }
                if let Some(target) = self.steps.get(idx) {
                    queue.extend(Self::successors(target, &index_map));
                }
            }
        }

        errors
    }

    /// Iterate the indices of a step's direct successors (next + fallbacks).
    fn successors<'a>(
        step: &'a WorkflowStep,
        index_map: &'a HashMap<String, usize>,
    ) -> impl Iterator<Item = usize> + 'a {
        step.next_step
            .iter()
            .chain(step.fallback_steps.iter())
            .filter_map(|id| index_map.get(id).copied())
    }
}
