//! Platform glue shared by `kernel_core` and the `kernel` binary crate:
//! currently just the flattened device-tree reader (`spec.md` §6).

pub mod device_tree;
