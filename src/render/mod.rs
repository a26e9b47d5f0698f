pub mod compose;
pub mod composite;
pub mod env;
pub mod export;
pub mod fonts;
pub mod raster;
