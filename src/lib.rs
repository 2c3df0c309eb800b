pub mod arena;
pub mod canon;
pub mod db;
pub mod fs;
pub mod graph;
pub mod load;
pub mod manifest;
pub mod progress;
pub mod reduce;
pub mod rule;
pub mod run;
mod scanner;
mod signal;
pub mod signature;
mod smallmap;
pub mod trace;
pub mod work;

#[cfg(not(any(windows, target_arch = "wasm32")))]
use jemallocator::Jemalloc;

#[cfg(not(any(windows, target_arch = "wasm32")))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;
