//! Root module for test modules, so that the tests are built into a single binary.

mod conformance;

const fn main() {}
