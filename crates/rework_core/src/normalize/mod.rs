pub mod records;
pub mod timestamps;
