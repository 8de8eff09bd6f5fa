//! Opportunity ranker: thin adapter around the external decision engine
//!
//! The engine receives a batch of opportunities and returns the approved
//! subset, ordered for execution, with a risk classification per entry used
//! by the trade executor for position sizing. The LLM-backed engine is an
//! external collaborator; the rule-based engine here is the injected default
//! and the test double.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::core::error::AppResult;
use crate::core::types::{Lamports, Opportunity, RiskTier};

/// An opportunity approved for execution with its final risk classification
#[derive(Debug, Clone)]
pub struct RankedOpportunity {
    pub opportunity: Opportunity,
    pub risk_tier: RiskTier,
}

/// External decision engine boundary. Stateless: all context is in the input.
#[async_trait]
pub trait DecisionEngine: Send + Sync {
    /// Return the approved subset, in execution order
    async fn rank(&self, opportunities: Vec<Opportunity>) -> AppResult<Vec<RankedOpportunity>>;
}

/// Stateless adapter the scheduler calls
pub struct OpportunityRanker {
    engine: Arc<dyn DecisionEngine>,
}

impl OpportunityRanker {
    pub fn new(engine: Arc<dyn DecisionEngine>) -> Self {
        Self { engine }
    }

    /// Rank a batch. An engine failure approves nothing this cycle; the next
    /// scan rediscovers the opportunities.
    pub async fn rank(&self, opportunities: Vec<Opportunity>) -> Vec<RankedOpportunity> {
        if opportunities.is_empty() {
            return Vec::new();
        }

        let count = opportunities.len();
        match self.engine.rank(opportunities).await {
            Ok(approved) => {
                debug!(submitted = count, approved = approved.len(), "ranking complete");
                approved
            }
            Err(e) => {
                warn!("decision engine failed, approving nothing this cycle: {}", e);
                Vec::new()
            }
        }
    }
}

impl std::fmt::Debug for OpportunityRanker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpportunityRanker").finish()
    }
}

/// Rule-based engine: approve anything whose expected profit clears the
/// configured floor, highest expected profit first, strategy risk passed
/// through
#[derive(Debug, Clone)]
pub struct ThresholdEngine {
    profit_floor: Lamports,
}

impl ThresholdEngine {
    pub fn new(profit_floor: Lamports) -> Self {
        Self { profit_floor }
    }
}

#[async_trait]
impl DecisionEngine for ThresholdEngine {
    async fn rank(&self, opportunities: Vec<Opportunity>) -> AppResult<Vec<RankedOpportunity>> {
        let mut approved: Vec<RankedOpportunity> = opportunities
            .into_iter()
            .filter(|o| o.expected_profit >= self.profit_floor)
            .map(|opportunity| RankedOpportunity {
                risk_tier: opportunity.risk_tier,
                opportunity,
            })
            .collect();

        approved.sort_by(|a, b| {
            b.opportunity
                .expected_profit
                .cmp(&a.opportunity.expected_profit)
        });

        Ok(approved)
    }
}
