pub mod image;
pub mod worklist;
