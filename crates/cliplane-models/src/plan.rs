//! Plans and priority lanes.
//!
//! A plan is an immutable tier definition. The lane it carries decides
//! scheduling priority: lane P0 is always served before P1, P1 before P2.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Priority lane. Lower lane number is served first.
///
/// The derived `Ord` matches scheduling priority: `P0 < P1 < P2`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
pub enum Lane {
    P0,
    P1,
    P2,
}

impl Lane {
    /// All lanes, highest priority first.
    pub const ALL: [Lane; 3] = [Lane::P0, Lane::P1, Lane::P2];

    /// Numeric priority (0 = highest).
    pub fn index(&self) -> u8 {
        match self {
            Lane::P0 => 0,
            Lane::P1 => 1,
            Lane::P2 => 2,
        }
    }

    /// Lane for a numeric priority. Out-of-range values map to the slowest lane.
    pub fn from_index(index: u8) -> Self {
        match index {
            0 => Lane::P0,
            1 => Lane::P1,
            _ => Lane::P2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Lane::P0 => "P0",
            Lane::P1 => "P1",
            Lane::P2 => "P2",
        }
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Plan tier identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PlanId {
    Express,
    Priority,
    Standard,
}

impl PlanId {
    /// Parse from string (case-insensitive). Unknown ids are an admission
    /// error for the caller, not a silent default.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "express" => Some(PlanId::Express),
            "priority" => Some(PlanId::Priority),
            "standard" => Some(PlanId::Standard),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanId::Express => "express",
            PlanId::Priority => "priority",
            PlanId::Standard => "standard",
        }
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable tier definition.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Plan {
    /// Plan identifier.
    pub id: PlanId,
    /// Priority lane jobs on this plan are admitted into.
    pub lane: Lane,
    /// Admission ceiling for job input length, in minutes.
    pub max_input_minutes: u32,
    /// Expected processing minutes per input minute.
    pub target_multiplier: f64,
    /// Billing multiplier. Carried for the billing layer, never read here.
    pub credit_multiplier: f64,
}

impl Plan {
    /// Built-in definition for a tier.
    pub fn for_id(id: PlanId) -> Self {
        match id {
            PlanId::Express => Self {
                id,
                lane: Lane::P0,
                max_input_minutes: 30,
                target_multiplier: 0.80,
                credit_multiplier: 2.0,
            },
            PlanId::Priority => Self {
                id,
                lane: Lane::P1,
                max_input_minutes: 120,
                target_multiplier: 1.20,
                credit_multiplier: 1.5,
            },
            PlanId::Standard => Self {
                id,
                lane: Lane::P2,
                max_input_minutes: 240,
                target_multiplier: 1.60,
                credit_multiplier: 1.0,
            },
        }
    }
}

/// Plan lookup by id.
///
/// Holds exactly one plan per id. The built-in catalog covers the three
/// shipping tiers; tests may substitute their own set.
#[derive(Debug, Clone)]
pub struct PlanCatalog {
    plans: Vec<Plan>,
}

impl PlanCatalog {
    /// Catalog of the built-in tiers.
    pub fn builtin() -> Self {
        Self {
            plans: vec![
                Plan::for_id(PlanId::Express),
                Plan::for_id(PlanId::Priority),
                Plan::for_id(PlanId::Standard),
            ],
        }
    }

    /// Catalog over a custom plan set. Later duplicates of an id are ignored.
    pub fn with_plans(plans: Vec<Plan>) -> Self {
        let mut unique: Vec<Plan> = Vec::with_capacity(plans.len());
        for plan in plans {
            if !unique.iter().any(|p| p.id == plan.id) {
                unique.push(plan);
            }
        }
        Self { plans: unique }
    }

    /// Look up a plan by its typed id.
    pub fn get(&self, id: PlanId) -> Option<&Plan> {
        self.plans.iter().find(|p| p.id == id)
    }

    /// Resolve a plan from its string id, e.g. `"express"`.
    pub fn resolve(&self, id: &str) -> Option<&Plan> {
        PlanId::parse(id).and_then(|id| self.get(id))
    }
}

impl Default for PlanCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lane_ordering_matches_priority() {
        assert!(Lane::P0 < Lane::P1);
        assert!(Lane::P1 < Lane::P2);
        assert_eq!(Lane::from_index(0), Lane::P0);
        assert_eq!(Lane::from_index(7), Lane::P2);
    }

    #[test]
    fn plan_id_parse_is_case_insensitive() {
        assert_eq!(PlanId::parse("express"), Some(PlanId::Express));
        assert_eq!(PlanId::parse("Priority"), Some(PlanId::Priority));
        assert_eq!(PlanId::parse("STANDARD"), Some(PlanId::Standard));
        assert_eq!(PlanId::parse("enterprise"), None);
    }

    #[test]
    fn builtin_catalog_resolves_all_tiers() {
        let catalog = PlanCatalog::builtin();
        let express = catalog.resolve("express").expect("express plan");
        assert_eq!(express.lane, Lane::P0);
        assert_eq!(express.max_input_minutes, 30);
        assert!((express.target_multiplier - 0.80).abs() < f64::EPSILON);

        assert!(catalog.resolve("priority").is_some());
        assert!(catalog.resolve("standard").is_some());
        assert!(catalog.resolve("free").is_none());
    }

    #[test]
    fn catalog_keeps_one_plan_per_id() {
        let mut dup = Plan::for_id(PlanId::Express);
        dup.max_input_minutes = 999;
        let catalog = PlanCatalog::with_plans(vec![Plan::for_id(PlanId::Express), dup]);
        assert_eq!(
            catalog.get(PlanId::Express).map(|p| p.max_input_minutes),
            Some(30)
        );
    }
}
