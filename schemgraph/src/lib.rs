// schemgraph — layout graphs for hardware schematics
//
// Library root. The graph substrate (arena, graph, view, id, net) is built by
// `design`, canonicalized by the passes under `pipeline`, and exported by
// `elk` and `dot`.

pub mod arena;
pub mod design;
pub mod diag;
pub mod dot;
pub mod elk;
pub mod extract_splits;
pub mod flatten_trees;
pub mod graph;
pub mod id;
pub mod merge_splits;
pub mod net;
pub mod origin;
pub mod pass;
pub mod pipeline;
pub mod reduce_assignments;
pub mod shared_connections;
pub mod sort_ports;
pub mod view;
