pub mod backend;
pub mod cdb;
pub mod execution_unit;
pub mod register_alias_table;
pub mod reservation_station;
