//! Live odds pricing.
//!
//! - [`solver`] - Fixed-point margin solver
//! - [`calculator`] - Stake-aware live odds with the posted-odds cap

pub mod calculator;
pub mod solver;

pub use calculator::{
    calc_min_odds, FundDistribution, LiveOddsCalculator, ProbabilityDistribution,
};
pub use solver::LiveOddsSolver;
