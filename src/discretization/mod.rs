pub mod constraints;
pub mod dofs;
pub mod generator;
pub mod mesh;
