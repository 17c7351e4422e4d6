pub mod queue;
pub mod state;
pub mod track;
