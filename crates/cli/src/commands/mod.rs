pub mod inspect;
pub mod predict;
pub mod samples;
pub mod train;
