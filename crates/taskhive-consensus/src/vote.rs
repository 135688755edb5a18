use crate::decision::Decision;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use taskhive_core::{HiveError, HiveResult};
use tracing::info;

/// One agent's vote in a consensus round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentOpinion {
    pub agent_id: String,
    pub decision: Decision,
    /// 0.0 to 1.0.
    pub confidence: f64,
    pub reasoning: String,
}

impl AgentOpinion {
    pub fn new(agent_id: impl Into<String>, decision: impl Into<Decision>, confidence: f64) -> Self {
        Self {
            agent_id: agent_id.into(),
            decision: decision.into(),
            confidence: confidence.clamp(0.0, 1.0),
            reasoning: String::new(),
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }

    /// Parse an agent's raw output into an opinion. Structured replies use
    /// `{"decision": .., "confidence": .., "reasoning": ..}`; anything else
    /// is taken as the decision itself at full confidence.
    pub fn from_output(agent_id: &str, output: &serde_json::Value) -> Self {
        if let Some(decision) = output.get("decision") {
            let confidence = output
                .get("confidence")
                .and_then(|c| c.as_f64())
                .unwrap_or(1.0);
            let reasoning = output
                .get("reasoning")
                .and_then(|r| r.as_str())
                .unwrap_or_default();
            Self::new(agent_id, Decision::from_value(decision), confidence)
                .with_reasoning(reasoning)
        } else {
            Self::new(agent_id, Decision::from_value(output), 1.0)
        }
    }
}

/// Rule by which opinions become one decision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "strategy", content = "threshold")]
pub enum VoteStrategy {
    Majority,
    Weighted,
    Unanimous,
    Threshold(f64),
}

impl std::fmt::Display for VoteStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VoteStrategy::Majority => write!(f, "majority"),
            VoteStrategy::Weighted => write!(f, "weighted"),
            VoteStrategy::Unanimous => write!(f, "unanimous"),
            VoteStrategy::Threshold(p) => write!(f, "threshold({p})"),
        }
    }
}

/// Outcome of a consensus round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub decision: Decision,
    pub confidence: f64,
    pub participants: Vec<String>,
    pub opinions: Vec<AgentOpinion>,
    pub strategy: VoteStrategy,
}

/// Turns sets of agent opinions into decisions.
///
/// Per-agent weights default to 1.0. Every tie-break is a total order:
/// a tied plurality (and a tied weighted score) resolves to the smallest
/// decision in the `Decision` ordering, so identical inputs always produce
/// identical outcomes.
pub struct ConsensusEngine {
    default_strategy: VoteStrategy,
    weights: HashMap<String, f64>,
}

impl ConsensusEngine {
    pub fn new(default_strategy: VoteStrategy) -> Self {
        Self {
            default_strategy,
            weights: HashMap::new(),
        }
    }

    /// Set the voting weight for an agent (0.0 to 1.0).
    pub fn set_agent_weight(&mut self, agent_id: impl Into<String>, weight: f64) -> HiveResult<()> {
        if !(0.0..=1.0).contains(&weight) {
            return Err(HiveError::Validation(format!(
                "weight must be within [0, 1], got {weight}"
            )));
        }
        self.weights.insert(agent_id.into(), weight);
        Ok(())
    }

    fn weight_of(&self, agent_id: &str) -> f64 {
        self.weights.get(agent_id).copied().unwrap_or(1.0)
    }

    pub fn vote(
        &self,
        opinions: &[AgentOpinion],
        strategy: Option<VoteStrategy>,
    ) -> HiveResult<ConsensusResult> {
        let strategy = strategy.unwrap_or(self.default_strategy);
        if opinions.is_empty() {
            return Err(HiveError::Validation("no opinions provided".into()));
        }

        let (decision, confidence) = match strategy {
            VoteStrategy::Majority => self.majority(opinions)?,
            VoteStrategy::Weighted => self.weighted(opinions)?,
            VoteStrategy::Unanimous => self.unanimous(opinions)?,
            VoteStrategy::Threshold(p) => self.threshold(opinions, p)?,
        };

        info!(
            strategy = %strategy,
            decision = %decision,
            confidence = confidence,
            "Consensus reached"
        );

        Ok(ConsensusResult {
            decision,
            confidence,
            participants: opinions.iter().map(|o| o.agent_id.clone()).collect(),
            opinions: opinions.to_vec(),
            strategy,
        })
    }

    /// Strict plurality; a tie resolves to the smallest tied decision.
    fn majority(&self, opinions: &[AgentOpinion]) -> HiveResult<(Decision, f64)> {
        let mut counts: BTreeMap<&Decision, usize> = BTreeMap::new();
        for opinion in opinions {
            *counts.entry(&opinion.decision).or_insert(0) += 1;
        }
        // Ascending decision order with a strictly-greater comparison:
        // a tied count keeps the smallest decision.
        let mut best: Option<(&Decision, usize)> = None;
        for (decision, count) in &counts {
            if best.map_or(true, |(_, c)| *count > c) {
                best = Some((decision, *count));
            }
        }
        let (decision, count) = best.expect("non-empty opinions");
        Ok((decision.clone(), count as f64 / opinions.len() as f64))
    }

    /// Sum of `agent_weight × confidence` per decision; a tied score falls
    /// back to majority counting, then the decision order.
    fn weighted(&self, opinions: &[AgentOpinion]) -> HiveResult<(Decision, f64)> {
        let scores = self.weighted_scores(opinions);
        let total: f64 = scores.values().sum();
        if total <= 0.0 {
            // Zero total weight carries no signal; counting heads still does.
            return self.majority(opinions);
        }

        let best = scores.values().fold(f64::MIN, |a, b| a.max(*b));
        let tied: Vec<&Decision> = scores
            .iter()
            .filter(|(_, score)| (best - **score).abs() < f64::EPSILON)
            .map(|(d, _)| *d)
            .collect();

        let decision = if tied.len() == 1 {
            tied[0].clone()
        } else {
            // Tie on score: majority rule over the tied decisions, then the
            // decision total order.
            let tied_opinions: Vec<AgentOpinion> = opinions
                .iter()
                .filter(|o| tied.contains(&&o.decision))
                .cloned()
                .collect();
            self.majority(&tied_opinions)?.0
        };

        let confidence = scores[&decision] / total;
        Ok((decision, confidence))
    }

    /// All opinions must carry the same decision.
    fn unanimous(&self, opinions: &[AgentOpinion]) -> HiveResult<(Decision, f64)> {
        let first = &opinions[0].decision;
        if opinions.iter().any(|o| &o.decision != first) {
            return Err(HiveError::NoConsensus(format!(
                "{} distinct decisions under unanimous rule",
                opinions
                    .iter()
                    .map(|o| &o.decision)
                    .collect::<std::collections::BTreeSet<_>>()
                    .len()
            )));
        }
        let avg_confidence =
            opinions.iter().map(|o| o.confidence).sum::<f64>() / opinions.len() as f64;
        Ok((first.clone(), avg_confidence))
    }

    /// The winning decision must hold at least `p` of the total weight.
    fn threshold(&self, opinions: &[AgentOpinion], p: f64) -> HiveResult<(Decision, f64)> {
        if !(0.0..=1.0).contains(&p) {
            return Err(HiveError::Validation(format!(
                "threshold must be within [0, 1], got {p}"
            )));
        }
        let (decision, share) = {
            let scores = self.weighted_scores(opinions);
            let total: f64 = scores.values().sum();
            if total <= 0.0 {
                return Err(HiveError::NoConsensus("total vote weight is zero".into()));
            }
            let (decision, score) = scores
                .iter()
                .max_by(|a, b| {
                    a.1.partial_cmp(b.1)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        // BTreeMap order: prefer the smaller decision on ties.
                        .then(std::cmp::Ordering::Greater)
                })
                .map(|(d, s)| ((*d).clone(), *s))
                .expect("non-empty scores");
            (decision, score / total)
        };

        if share < p {
            return Err(HiveError::NoConsensus(format!(
                "leading decision holds {share:.2} of weight, needs {p:.2}"
            )));
        }
        Ok((decision, share))
    }

    fn weighted_scores<'a>(&self, opinions: &'a [AgentOpinion]) -> BTreeMap<&'a Decision, f64> {
        let mut scores: BTreeMap<&Decision, f64> = BTreeMap::new();
        for opinion in opinions {
            *scores.entry(&opinion.decision).or_insert(0.0) +=
                self.weight_of(&opinion.agent_id) * opinion.confidence;
        }
        scores
    }
}

impl Default for ConsensusEngine {
    fn default() -> Self {
        Self::new(VoteStrategy::Weighted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn opinion(agent: &str, decision: &str, confidence: f64) -> AgentOpinion {
        AgentOpinion::new(agent, decision, confidence)
    }

    #[test]
    fn test_majority_plurality() {
        let engine = ConsensusEngine::default();
        let opinions = vec![
            opinion("a1", "X", 0.9),
            opinion("a2", "Y", 0.9),
            opinion("a3", "X", 0.5),
        ];
        let result = engine.vote(&opinions, Some(VoteStrategy::Majority)).unwrap();
        assert_eq!(result.decision, Decision::text("X"));
        assert!((result.confidence - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_majority_tie_takes_lowest_decision() {
        let engine = ConsensusEngine::default();
        let opinions = vec![opinion("a1", "beta", 1.0), opinion("a2", "alpha", 1.0)];
        let result = engine.vote(&opinions, Some(VoteStrategy::Majority)).unwrap();
        assert_eq!(result.decision, Decision::text("alpha"));
    }

    #[test]
    fn test_weighted_vote_literal_scenario() {
        // X = 1.0*0.9 + 0.2*0.3 = 0.96; Y = 0.4*0.8 = 0.32.
        let mut engine = ConsensusEngine::default();
        engine.set_agent_weight("a1", 1.0).unwrap();
        engine.set_agent_weight("a2", 0.4).unwrap();
        engine.set_agent_weight("a3", 0.2).unwrap();

        let opinions = vec![
            opinion("a1", "X", 0.9),
            opinion("a2", "Y", 0.8),
            opinion("a3", "X", 0.3),
        ];
        let result = engine.vote(&opinions, Some(VoteStrategy::Weighted)).unwrap();
        assert_eq!(result.decision, Decision::text("X"));
        assert!((result.confidence - 0.96 / 1.28).abs() < 1e-9);
    }

    #[test]
    fn test_weighted_tie_falls_back_to_majority_then_order() {
        let engine = ConsensusEngine::default();
        // Equal weight and confidence: scores tie, counts tie, order decides.
        let opinions = vec![opinion("a1", "zeta", 0.5), opinion("a2", "eta", 0.5)];
        let result = engine.vote(&opinions, Some(VoteStrategy::Weighted)).unwrap();
        assert_eq!(result.decision, Decision::text("eta"));
    }

    #[test]
    fn test_unanimous_success_and_failure() {
        let engine = ConsensusEngine::default();
        let agreed = vec![opinion("a1", "go", 0.8), opinion("a2", "go", 0.6)];
        let result = engine.vote(&agreed, Some(VoteStrategy::Unanimous)).unwrap();
        assert_eq!(result.decision, Decision::text("go"));
        assert!((result.confidence - 0.7).abs() < 1e-9);

        let split = vec![opinion("a1", "go", 0.8), opinion("a2", "stop", 0.9)];
        let err = engine.vote(&split, Some(VoteStrategy::Unanimous)).unwrap_err();
        assert!(matches!(err, HiveError::NoConsensus(_)));
    }

    #[test]
    fn test_threshold_met_and_missed() {
        let engine = ConsensusEngine::default();
        let opinions = vec![
            opinion("a1", "X", 1.0),
            opinion("a2", "X", 1.0),
            opinion("a3", "Y", 1.0),
        ];
        let result = engine
            .vote(&opinions, Some(VoteStrategy::Threshold(0.6)))
            .unwrap();
        assert_eq!(result.decision, Decision::text("X"));

        let err = engine
            .vote(&opinions, Some(VoteStrategy::Threshold(0.8)))
            .unwrap_err();
        assert!(matches!(err, HiveError::NoConsensus(_)));
    }

    #[test]
    fn test_empty_opinions_rejected() {
        let engine = ConsensusEngine::default();
        assert!(matches!(
            engine.vote(&[], None).unwrap_err(),
            HiveError::Validation(_)
        ));
    }

    #[test]
    fn test_opinion_from_structured_output() {
        let parsed = AgentOpinion::from_output(
            "a1",
            &json!({"decision": "X", "confidence": 0.75, "reasoning": "strong evidence"}),
        );
        assert_eq!(parsed.decision, Decision::text("X"));
        assert!((parsed.confidence - 0.75).abs() < f64::EPSILON);
        assert_eq!(parsed.reasoning, "strong evidence");

        let bare = AgentOpinion::from_output("a2", &json!("Y"));
        assert_eq!(bare.decision, Decision::text("Y"));
        assert!((bare.confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_invalid_weight_rejected() {
        let mut engine = ConsensusEngine::default();
        assert!(engine.set_agent_weight("a1", 1.5).is_err());
        assert!(engine.set_agent_weight("a1", -0.1).is_err());
    }
}
