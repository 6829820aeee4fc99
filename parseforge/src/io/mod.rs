//! Side-effecting operations: filesystem, process execution, external
//! services. Isolated behind narrow traits ([`generator::Generator`],
//! [`sandbox::Sandbox`]) to enable scripting in tests.

pub mod artifact;
pub mod config;
pub mod extract;
pub mod fixture;
pub mod generator;
pub mod process;
pub mod prompt;
pub mod report;
pub mod sandbox;
