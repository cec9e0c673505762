pub mod edf;
pub mod table;
pub mod text;
pub mod wfdb;
