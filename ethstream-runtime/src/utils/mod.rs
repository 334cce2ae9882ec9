/// Spawns a built link graph on a tokio runtime and wires its edges to crossbeam channels.
pub mod runner;
