pub mod publishing;
pub mod supervision;
