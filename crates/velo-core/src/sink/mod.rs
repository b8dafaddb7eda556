// # Trip Sink Implementations

pub mod csv;
pub mod memory;

pub use self::csv::{CsvTripSink, CsvTripSinkFactory};
pub use self::memory::{MemoryTripSink, MemoryTripSinkFactory};
