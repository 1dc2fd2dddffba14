//! Live parameter state: param arenas, execution state, and the collaborators
//! that materialize them.

pub mod builder;
pub mod gateway;
pub mod param;
pub mod quad;
