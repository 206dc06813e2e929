pub mod executor;
pub mod query;
pub mod results;
pub mod sharding;
