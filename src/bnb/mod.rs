pub mod bounds;
pub mod branch;
pub mod edge_priority;
pub mod executor;
pub mod lower_bound;
pub mod partial_matching;
pub mod search;
pub mod window_search;
