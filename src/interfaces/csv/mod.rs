//! CSV request scripts in, CSV bill report out.

pub mod bill_writer;
pub mod request_reader;
pub mod runner;
