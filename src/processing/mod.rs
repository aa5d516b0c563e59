pub mod csv_writer;
pub mod output;
pub mod persistence;
pub mod summary;
pub mod verification;
pub mod vtk;
