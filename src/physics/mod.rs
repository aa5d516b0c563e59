pub mod assembly;
pub mod bc;
pub mod functions;
pub mod initial;
