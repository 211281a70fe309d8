pub mod constraints;
pub mod mean_variance;
pub mod solver;

pub use constraints::{Constraints, FeasibleSet, ReturnTarget};
pub use mean_variance::{
    efficient_frontier, optimize, optimize_with_cache, project_weights, Action,
    AssetContribution, CovarianceSource, EfficientFrontier, FrontierPoint, Objective,
    OptimizationRequest, OptimizationResult, Recommendation,
};
pub use solver::SolverSettings;
