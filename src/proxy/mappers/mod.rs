// Backend response mappers
pub mod batch;
