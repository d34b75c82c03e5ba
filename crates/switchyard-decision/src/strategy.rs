use serde::Serialize;

use switchyard_core::config::StrategyConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyMode {
    Single,
    Hybrid,
}

/// When an external workflow runtime should switch from the primary to the
/// fallback engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwitchConditions {
    pub error_rate_threshold: f64,
    pub cost_threshold: f64,
    pub cooldown_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowStrategy {
    pub mode: StrategyMode,
    pub primary_engine: String,
    /// Set only in hybrid mode.
    pub fallback_engine: Option<String>,
    pub switch_conditions: Option<SwitchConditions>,
    pub reasons: Vec<String>,
}

/// Choose between a single engine and a primary/fallback pair.
pub fn decide_strategy(
    complexity: f64,
    steps: usize,
    recent_failures: u32,
    needs_observability: bool,
    needs_long_horizon: bool,
    config: &StrategyConfig,
) -> WorkflowStrategy {
    let mut reasons = Vec::new();
    if complexity >= config.complexity_threshold {
        reasons.push(format!(
            "complexity {:.0} >= {:.0}",
            complexity, config.complexity_threshold
        ));
    }
    if steps > config.max_single_steps {
        reasons.push(format!("{} steps > {}", steps, config.max_single_steps));
    }
    if recent_failures >= config.failure_threshold {
        reasons.push(format!(
            "{} recent failures >= {}",
            recent_failures, config.failure_threshold
        ));
    }
    let hybrid = !reasons.is_empty();

    let (primary, secondary) = if needs_observability || needs_long_horizon {
        if needs_observability {
            reasons.push("observability required".into());
        }
        if needs_long_horizon {
            reasons.push("long-horizon state required".into());
        }
        (&config.graph_engine, &config.linear_engine)
    } else {
        (&config.linear_engine, &config.graph_engine)
    };

    if !hybrid {
        reasons.push("simple workload, single engine".into());
        return WorkflowStrategy {
            mode: StrategyMode::Single,
            primary_engine: primary.clone(),
            fallback_engine: None,
            switch_conditions: None,
            reasons,
        };
    }

    WorkflowStrategy {
        mode: StrategyMode::Hybrid,
        primary_engine: primary.clone(),
        fallback_engine: Some(secondary.clone()),
        switch_conditions: Some(SwitchConditions {
            error_rate_threshold: config.error_rate_threshold,
            cost_threshold: config.cost_threshold,
            cooldown_secs: config.cooldown_secs,
        }),
        reasons,
    }
}
