use crossflow_core::{
    AiTaskType, ConditionOperator, StepKind, TriggerSpec, WorkflowCondition, WorkflowDefinition,
    WorkflowStep,
};

/// The built-in cross-module workflow catalog.
///
/// These are the platform's shipped workflows; deployments register them at
/// wiring time and may add their own alongside.
#[must_use]
pub fn builtin_workflows() -> Vec<WorkflowDefinition> {
    vec![lead_to_hire(), voice_call_follow_up(), invoice_chase()]
}

/// A won CRM deal forecasts hiring demand and opens an HR hiring plan.
fn lead_to_hire() -> WorkflowDefinition {
    WorkflowDefinition::new("lead-to-hire", "Lead to hire")
        .with_description(
            "When a deal closes, forecast the hiring demand it creates and \
             open a hiring plan in the HR module.",
        )
        .require_module("crm")
        .require_module("hr")
        .with_trigger(TriggerSpec::new("deal.won", "crm"))
        .with_step(
            WorkflowStep::new(
                "forecast-hiring",
                "Forecast hiring demand",
                StepKind::AiAnalysis {
                    task: AiTaskType::HiringForecast,
                },
                "hr",
                "forecast_hiring",
            )
            .with_parameters(serde_json::json!({"horizon_months": 6}))
            .with_next("create-hiring-plan"),
        )
        .with_step(
            WorkflowStep::new(
                "create-hiring-plan",
                "Create hiring plan",
                StepKind::DataSync,
                "hr",
                "hiring_plan.create",
            )
            .with_parameters(serde_json::json!({"source": "deal.won"}))
            .with_next("notify-hr")
            // If the HR module rejects the plan, still tell the team a deal
            // landed so they can plan manually.
            .with_fallback("notify-hr"),
        )
        .with_step(WorkflowStep::new(
            "notify-hr",
            "Notify HR team",
            StepKind::Notification,
            "hr",
            "notify_team",
        ))
}

/// A completed voice call is summarized, synced to the CRM lead, and a
/// follow-up is sent after human sign-off.
fn voice_call_follow_up() -> WorkflowDefinition {
    WorkflowDefinition::new("voice-call-follow-up", "Voice call follow-up")
        .with_description(
            "Summarize a finished call, update the CRM lead, and send a \
             follow-up once approved.",
        )
        .require_module("voice")
        .require_module("crm")
        .with_trigger(TriggerSpec::new("call.completed", "voice"))
        .with_step(
            WorkflowStep::new(
                "summarize-call",
                "Summarize call",
                StepKind::AiAnalysis {
                    task: AiTaskType::CallSummary,
                },
                "crm",
                "summarize_call",
            )
            .with_next("update-lead"),
        )
        .with_step(
            WorkflowStep::new(
                "update-lead",
                "Update CRM lead",
                StepKind::DataSync,
                "crm",
                "lead.update",
            )
            .with_next("approve-follow-up"),
        )
        .with_step(
            WorkflowStep::new(
                "approve-follow-up",
                "Approve follow-up",
                StepKind::Approval,
                "crm",
                "approve_follow_up",
            )
            .with_next("send-follow-up"),
        )
        .with_step(WorkflowStep::new(
            "send-follow-up",
            "Send follow-up",
            StepKind::Notification,
            "crm",
            "notify_owner",
        ))
}

/// Large overdue invoices are risk-scored and chased; if scoring is down,
/// escalate straight to the external collections service.
fn invoice_chase() -> WorkflowDefinition {
    WorkflowDefinition::new("invoice-chase", "Overdue invoice chase")
        .with_description(
            "Score the payment risk of large overdue invoices and notify \
             collections, escalating externally when scoring fails.",
        )
        .require_module("accounting")
        .require_module("crm")
        .with_trigger(TriggerSpec::new("invoice.overdue", "accounting"))
        .with_condition(
            WorkflowCondition::new(
                "amount",
                ConditionOperator::GreaterThan,
                Some(serde_json::json!(1000)),
            )
            .from_module("accounting"),
        )
        .with_step(
            WorkflowStep::new(
                "score-risk",
                "Score payment risk",
                StepKind::AiAnalysis {
                    task: AiTaskType::PaymentRisk,
                },
                "accounting",
                "score_payment_risk",
            )
            .with_next("notify-collections")
            .with_fallback("escalate-external"),
        )
        .with_step(WorkflowStep::new(
            "notify-collections",
            "Notify collections",
            StepKind::Notification,
            "accounting",
            "notify_collections",
        ))
        .with_step(
            WorkflowStep::new(
                "escalate-external",
                "Escalate to collections service",
                StepKind::ExternalApi,
                "accounting",
                "collections.escalate",
            )
            .with_parameters(
                serde_json::json!({"endpoint": "https://collections.example.com/escalate"}),
            ),
        )
}
