// Route handler modules

pub mod canvas;
pub mod health;
pub mod matting;
pub mod model;
pub mod status;
