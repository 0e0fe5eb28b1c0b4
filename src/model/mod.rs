pub mod file;
pub mod submission;

pub use file::{ContentHash, FileList, FileRecord, SelectedFile};
pub use submission::{ModuleId, Submission};
