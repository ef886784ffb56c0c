//! scikit-learn artifact loading (joblib / pickle containers)

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::loader::pickle;
use crate::loader::{Framework, FrameworkLoader, ModelHandle};

/// Summary of a deserialized estimator artifact
#[derive(Debug)]
pub struct SklearnEstimator {
    /// Full class path of the pickled estimator, when the stream names one
    /// (e.g. `sklearn.linear_model.LogisticRegression`)
    pub class_path: Option<String>,
    pub pickle_protocol: u8,
}

pub(super) struct SklearnLoader;

impl FrameworkLoader for SklearnLoader {
    fn framework(&self) -> Framework {
        Framework::Sklearn
    }

    fn load(&self, path: &Path) -> Result<ModelHandle> {
        let fail = |reason: String| Error::Load {
            framework: Framework::Sklearn,
            path: path.to_path_buf(),
            reason,
        };

        let bytes = fs::read(path).map_err(|e| fail(format!("read failed: {e}")))?;
        if bytes.is_empty() {
            return Err(fail("empty file".into()));
        }
        // joblib dumps are pickle streams; the PROTO opcode is mandatory
        // for every protocol joblib emits.
        if bytes[0] != 0x80 {
            return Err(fail("not a pickle stream (missing PROTO header)".into()));
        }

        let summary = pickle::scan(&bytes).map_err(|e| fail(format!("invalid pickle: {e}")))?;

        let class_path = summary
            .globals
            .iter()
            .find(|(module, _)| module.starts_with("sklearn"))
            .or_else(|| summary.globals.first())
            .map(|(module, name)| format!("{module}.{name}"));

        Ok(ModelHandle::Sklearn(SklearnEstimator {
            class_path,
            pickle_protocol: summary.protocol,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_estimator(dir: &TempDir) -> std::path::PathBuf {
        let mut p = vec![0x80, 0x02];
        p.extend_from_slice(b"csklearn.linear_model\nLogisticRegression\n");
        p.extend_from_slice(b")\x81}b.");
        let path = dir.path().join("model.pkl");
        fs::write(&path, p).unwrap();
        path
    }

    #[test]
    fn valid_estimator_yields_predicting_handle() {
        let dir = TempDir::new().unwrap();
        let path = write_estimator(&dir);

        let handle = SklearnLoader.load(&path).unwrap();
        assert!(handle.supports_prediction());
        match handle {
            ModelHandle::Sklearn(est) => {
                assert_eq!(
                    est.class_path.as_deref(),
                    Some("sklearn.linear_model.LogisticRegression")
                );
                assert_eq!(est.pickle_protocol, 2);
            }
            other => panic!("expected sklearn handle, got {other:?}"),
        }
    }

    #[test]
    fn text_junk_fails_to_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("invalid.pkl");
        fs::write(&path, "This is not a valid model").unwrap();

        let err = SklearnLoader.load(&path).unwrap_err();
        assert!(matches!(err, Error::Load { .. }));
        assert!(err.to_string().contains("invalid.pkl"));
    }

    #[test]
    fn oversized_length_prefix_fails_to_load() {
        // a PROTO header followed by BINBYTES8 claiming u64::MAX bytes
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("corrupt.pkl");
        let mut bytes = vec![0x80, 0x02, 0x8e];
        bytes.extend_from_slice(&[0xff; 8]);
        fs::write(&path, bytes).unwrap();

        let err = SklearnLoader.load(&path).unwrap_err();
        assert!(matches!(err, Error::Load { .. }));
        assert!(err.to_string().contains("corrupt.pkl"));
    }

    #[test]
    fn truncated_pickle_fails_to_load() {
        let dir = TempDir::new().unwrap();
        let path = write_estimator(&dir);
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 2]).unwrap();

        assert!(matches!(
            SklearnLoader.load(&path),
            Err(Error::Load { .. })
        ));
    }
}
