pub mod batch;
pub mod purge;
pub mod skew;
