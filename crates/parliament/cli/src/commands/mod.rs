pub mod ask;
pub mod constitution;
