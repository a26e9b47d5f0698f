pub mod style;
pub mod svg;
pub mod tree;
