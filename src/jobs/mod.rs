pub mod match_processor;
pub mod reconciler;
