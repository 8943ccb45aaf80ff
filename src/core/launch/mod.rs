pub mod classpath;
pub mod descriptor;
pub mod task;

pub use classpath::{build_classpath, classpath_entries, dependency_order};
pub use descriptor::{discover_entry_point, invalidate, read_main_class, LaunchDescriptor};
pub use task::{build_command, launch, resolve_java_binary, split_forwarded_args};
