pub mod metric;
pub mod payload;
pub mod source;
