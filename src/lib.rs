pub mod config;
pub mod engine;
pub mod filter;
pub mod geo;
pub mod ingress;
pub mod orchestrator;
pub mod ortb;
pub mod router;
pub mod rpc;
pub mod runtime;
pub mod stats;

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;
