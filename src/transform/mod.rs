//! Pure batch transforms over landing-store snapshots
//!
//! Each transform is a function from already-read rows to derived rows,
//! with no store access; the pipeline service wires them to the warehouse.

pub mod companies;
pub mod facts;
pub mod prices;
