pub mod extract;
pub mod fetch;
pub mod types;
pub mod write;

pub use extract::extract;
pub use fetch::{load_layout, read_codebook};
pub use types::{max_end, FieldSpec};
pub use write::write_layout;
