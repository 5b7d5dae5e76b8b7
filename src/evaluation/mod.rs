pub mod expression;
pub mod fitness;
