//! TensorFlow artifact loading (SavedModel directories, HDF5 files)

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::loader::{Framework, FrameworkLoader, ModelHandle};

/// On-disk layout the artifact was recognized as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorflowFormat {
    /// Directory containing `saved_model.pb`
    SavedModelDir,
    /// Single `.h5` / `.keras` HDF5 file
    Hdf5,
}

/// A structurally validated TensorFlow artifact
#[derive(Debug)]
pub struct SavedModel {
    pub format: TensorflowFormat,
    pub root: PathBuf,
}

const HDF5_MAGIC: &[u8] = b"\x89HDF\r\n\x1a\n";

pub(super) struct TensorflowLoader;

impl FrameworkLoader for TensorflowLoader {
    fn framework(&self) -> Framework {
        Framework::Tensorflow
    }

    fn load(&self, path: &Path) -> Result<ModelHandle> {
        let fail = |reason: String| Error::Load {
            framework: Framework::Tensorflow,
            path: path.to_path_buf(),
            reason,
        };

        let format = if path.is_dir() {
            let graph = path.join("saved_model.pb");
            if !graph.is_file() {
                return Err(fail(
                    "directory is not a SavedModel (no saved_model.pb)".into(),
                ));
            }
            TensorflowFormat::SavedModelDir
        } else {
            let mut magic = [0u8; 8];
            let bytes = fs::read(path).map_err(|e| fail(format!("read failed: {e}")))?;
            if bytes.len() < magic.len() {
                return Err(fail("file too short to be an HDF5 container".into()));
            }
            magic.copy_from_slice(&bytes[..8]);
            if magic != HDF5_MAGIC {
                return Err(fail("not an HDF5 container (bad signature)".into()));
            }
            TensorflowFormat::Hdf5
        };

        Ok(ModelHandle::Tensorflow(SavedModel {
            format,
            root: path.to_path_buf(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn saved_model_directory_is_accepted() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("tf_model");
        fs::create_dir_all(root.join("variables")).unwrap();
        fs::write(root.join("saved_model.pb"), b"\x08\x01").unwrap();

        let handle = TensorflowLoader.load(&root).unwrap();
        match handle {
            ModelHandle::Tensorflow(model) => {
                assert_eq!(model.format, TensorflowFormat::SavedModelDir)
            }
            other => panic!("expected tensorflow handle, got {other:?}"),
        }
    }

    #[test]
    fn directory_without_graph_def_fails() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("not_a_model");
        fs::create_dir(&root).unwrap();

        let err = TensorflowLoader.load(&root).unwrap_err();
        assert!(err.to_string().contains("saved_model.pb"));
    }

    #[test]
    fn hdf5_magic_is_recognized() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.h5");
        let mut bytes = HDF5_MAGIC.to_vec();
        bytes.extend_from_slice(&[0u8; 64]);
        fs::write(&path, bytes).unwrap();

        let handle = TensorflowLoader.load(&path).unwrap();
        match handle {
            ModelHandle::Tensorflow(model) => assert_eq!(model.format, TensorflowFormat::Hdf5),
            other => panic!("expected tensorflow handle, got {other:?}"),
        }
    }

    #[test]
    fn plain_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.h5");
        fs::write(&path, "definitely not hdf5 content").unwrap();

        assert!(matches!(
            TensorflowLoader.load(&path),
            Err(Error::Load { .. })
        ));
    }
}
