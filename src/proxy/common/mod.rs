pub mod path_remap;
