pub mod blur;
pub mod pixel;
