//! Input files and the tasks built from them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where the bytes of an input file come from.
#[derive(Debug, Clone)]
pub enum FileSource {
    /// A file on disk, read by the decoder.
    Path(PathBuf),
    /// An in-memory upload.
    Memory(Arc<[u8]>),
}

/// A file handed to the pool for recognition.
#[derive(Debug, Clone)]
pub struct InputFile {
    name: String,
    source: FileSource,
}

impl InputFile {
    /// Creates an input backed by a file on disk, named after its file name.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            name,
            source: FileSource::Path(path),
        }
    }

    /// Creates an input backed by in-memory bytes.
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            source: FileSource::Memory(bytes.into()),
        }
    }

    /// Overrides the display name of the file.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// The name reported in outcomes and progress events.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Where the file's bytes come from.
    pub fn source(&self) -> &FileSource {
        &self.source
    }

    /// The path on disk, if this input is file-backed.
    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            FileSource::Path(path) => Some(path),
            FileSource::Memory(_) => None,
        }
    }
}

/// Unique identifier of a task within a pool.
pub type TaskId = u64;

/// One file's worth of recognition work.
///
/// A task is owned by the task queue until a worker takes it, and by that
/// worker until its outcome is reported.
#[derive(Debug)]
pub struct Task {
    /// Unique id, used to correlate worker responses.
    pub id: TaskId,
    /// Position of the file in the submitting call's input list.
    pub index: usize,
    /// The file to process.
    pub file: InputFile,
}

impl Task {
    /// Creates a new task.
    pub fn new(id: TaskId, index: usize, file: InputFile) -> Self {
        Self { id, index, file }
    }

    /// The name of the file this task processes.
    pub fn file_name(&self) -> &str {
        self.file.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_inputs_are_named_after_the_file() {
        let file = InputFile::from_path("/scans/2024/invoice_001.png");
        assert_eq!(file.name(), "invoice_001.png");
        assert_eq!(file.path(), Some(Path::new("/scans/2024/invoice_001.png")));
    }

    #[test]
    fn memory_inputs_keep_their_name() {
        let file = InputFile::from_bytes("upload.jpg", vec![1_u8, 2, 3]);
        assert_eq!(file.name(), "upload.jpg");
        assert!(file.path().is_none());
        assert!(matches!(file.source(), FileSource::Memory(bytes) if bytes.len() == 3));
    }

    #[test]
    fn names_can_be_overridden() {
        let file = InputFile::from_path("a.png").with_name("page 1");
        assert_eq!(Task::new(7, 0, file).file_name(), "page 1");
    }
}
