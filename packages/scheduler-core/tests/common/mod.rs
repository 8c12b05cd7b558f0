mod harness;
pub mod fixtures;

pub use harness::TestHarness;
