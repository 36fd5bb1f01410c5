pub mod config;
pub mod keyword_matcher;
pub mod normalize;
pub mod sponsored;
pub mod urls;
