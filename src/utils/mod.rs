//! Small helpers that don't belong to any one component
mod delete_cell;
mod take_with_output;
mod unwrap_or;

pub(crate) use delete_cell::DeleteCell;
pub(crate) use take_with_output::take_with_output;
pub(crate) use unwrap_or::unwrap_or;
