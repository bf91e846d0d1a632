//! Generates self-contained prover inputs for Ethereum blocks.
//!
//! A [`Generator`](generator::Generator) runs the [`pipeline`] stages for a
//! block against an archive node reached through a
//! [`ChainClient`](rpc::ChainClient), storing each stage's artifact in a
//! [`Store`](store::Store). The [`daemon`] does so for every new head of the
//! chain.

pub mod daemon;
pub mod env;
pub mod generator;
pub mod pipeline;
pub mod remote;
pub mod rpc;
pub mod store;
pub mod tracing;
