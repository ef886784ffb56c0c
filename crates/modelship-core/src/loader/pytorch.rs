//! PyTorch artifact loading
//!
//! Accepts the three containers a saved parameter set shows up in:
//! torch's zip checkpoint (a zip archive with a pickled `data.pkl` index),
//! safetensors, and legacy bare-pickle dumps.

use std::collections::BTreeMap;
use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;

use crate::error::{Error, Result};
use crate::loader::pickle;
use crate::loader::{Framework, FrameworkLoader, ModelHandle};

/// Container format the parameter set was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointFormat {
    TorchZip,
    Safetensors,
    Pickle,
}

/// Per-tensor metadata; shape and dtype are only available from
/// safetensors headers
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TensorInfo {
    pub dtype: Option<String>,
    pub shape: Option<Vec<u64>>,
}

/// A structurally validated parameter set
#[derive(Debug)]
pub struct StateDict {
    pub format: CheckpointFormat,
    /// Parameter names keyed to whatever metadata the container exposes
    pub tensors: BTreeMap<String, TensorInfo>,
}

impl StateDict {
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.tensors.contains_key(key)
    }
}

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const PICKLE_PROTO: u8 = 0x80;

pub(super) struct PytorchLoader;

impl FrameworkLoader for PytorchLoader {
    fn framework(&self) -> Framework {
        Framework::Pytorch
    }

    fn load(&self, path: &Path) -> Result<ModelHandle> {
        let fail = |reason: String| Error::Load {
            framework: Framework::Pytorch,
            path: path.to_path_buf(),
            reason,
        };

        let bytes = fs::read(path).map_err(|e| fail(format!("read failed: {e}")))?;
        if bytes.is_empty() {
            return Err(fail("empty file".into()));
        }

        let state = if bytes.starts_with(ZIP_MAGIC) {
            load_torch_zip(&bytes).map_err(fail)?
        } else if is_safetensors(path, &bytes) {
            load_safetensors(&bytes).map_err(fail)?
        } else if bytes[0] == PICKLE_PROTO {
            load_bare_pickle(&bytes).map_err(fail)?
        } else {
            return Err(fail(
                "unrecognized checkpoint container (expected torch zip, safetensors, or pickle)"
                    .into(),
            ));
        };

        Ok(ModelHandle::Pytorch(state))
    }
}

fn is_safetensors(path: &Path, bytes: &[u8]) -> bool {
    if path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("safetensors"))
    {
        return true;
    }
    // 8-byte LE header length followed by a JSON object
    if bytes.len() < 9 {
        return false;
    }
    let header_len = u64::from_le_bytes(bytes[..8].try_into().unwrap());
    header_len as usize <= bytes.len() - 8 && bytes[8] == b'{'
}

/// torch checkpoint: zip archive whose `data.pkl` entry pickles the state
/// dict (tensor payloads live in sibling entries we never touch)
fn load_torch_zip(bytes: &[u8]) -> std::result::Result<StateDict, String> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| format!("invalid zip archive: {e}"))?;

    let index_name = (0..archive.len())
        .filter_map(|i| archive.by_index(i).ok().map(|f| f.name().to_string()))
        .find(|name| name == "data.pkl" || name.ends_with("/data.pkl"))
        .ok_or_else(|| "zip archive has no data.pkl entry".to_string())?;

    let mut pickled = Vec::new();
    archive
        .by_name(&index_name)
        .map_err(|e| format!("cannot open {index_name}: {e}"))?
        .read_to_end(&mut pickled)
        .map_err(|e| format!("cannot read {index_name}: {e}"))?;

    let summary =
        pickle::scan(&pickled).map_err(|e| format!("invalid pickle in {index_name}: {e}"))?;

    Ok(StateDict {
        format: CheckpointFormat::TorchZip,
        tensors: summary
            .dict_keys
            .into_iter()
            .map(|k| (k, TensorInfo::default()))
            .collect(),
    })
}

/// safetensors: `u64` header length, then a JSON table of
/// `name -> { dtype, shape, data_offsets }`
fn load_safetensors(bytes: &[u8]) -> std::result::Result<StateDict, String> {
    if bytes.len() < 8 {
        return Err("file shorter than the safetensors header prefix".into());
    }
    let header_len = u64::from_le_bytes(bytes[..8].try_into().unwrap()) as usize;
    let header = bytes
        .get(8..8 + header_len)
        .ok_or_else(|| "header length exceeds file size".to_string())?;

    let table: serde_json::Map<String, serde_json::Value> =
        serde_json::from_slice(header).map_err(|e| format!("invalid header JSON: {e}"))?;

    let tensors = table
        .into_iter()
        .filter(|(name, _)| name != "__metadata__")
        .map(|(name, entry)| {
            let dtype = entry
                .get("dtype")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            let shape = entry.get("shape").and_then(|v| v.as_array()).map(|dims| {
                dims.iter().filter_map(serde_json::Value::as_u64).collect()
            });
            (name, TensorInfo { dtype, shape })
        })
        .collect();

    Ok(StateDict {
        format: CheckpointFormat::Safetensors,
        tensors,
    })
}

/// legacy torch.save output: one pickle stream, no container
fn load_bare_pickle(bytes: &[u8]) -> std::result::Result<StateDict, String> {
    let summary = pickle::scan(bytes).map_err(|e| format!("invalid pickle: {e}"))?;
    Ok(StateDict {
        format: CheckpointFormat::Pickle,
        tensors: summary
            .dict_keys
            .into_iter()
            .map(|k| (k, TensorInfo::default()))
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn state_dict_pickle() -> Vec<u8> {
        let mut p = vec![0x80, 0x02, b'}', b'('];
        for (key, val) in [("layer.weight", 1u8), ("layer.bias", 2u8)] {
            p.push(b'X');
            p.extend_from_slice(&(key.len() as u32).to_le_bytes());
            p.extend_from_slice(key.as_bytes());
            p.push(b'K');
            p.push(val);
        }
        p.extend_from_slice(b"u.");
        p
    }

    fn torch_zip_checkpoint() -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        zip.start_file("archive/data.pkl", options).unwrap();
        zip.write_all(&state_dict_pickle()).unwrap();
        zip.start_file("archive/data/0", options).unwrap();
        zip.write_all(&[0u8; 16]).unwrap();
        zip.finish().unwrap().into_inner()
    }

    fn safetensors_file() -> Vec<u8> {
        let header = serde_json::json!({
            "layer.weight": { "dtype": "F32", "shape": [2, 10], "data_offsets": [0, 80] },
            "layer.bias": { "dtype": "F32", "shape": [2], "data_offsets": [80, 88] },
        })
        .to_string();
        let mut bytes = (header.len() as u64).to_le_bytes().to_vec();
        bytes.extend_from_slice(header.as_bytes());
        bytes.extend_from_slice(&[0u8; 88]);
        bytes
    }

    fn expect_state_dict(handle: ModelHandle) -> StateDict {
        match handle {
            ModelHandle::Pytorch(state) => state,
            other => panic!("expected pytorch handle, got {other:?}"),
        }
    }

    #[test]
    fn torch_zip_checkpoint_exposes_parameter_names() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.pt");
        fs::write(&path, torch_zip_checkpoint()).unwrap();

        let state = expect_state_dict(PytorchLoader.load(&path).unwrap());
        assert_eq!(state.format, CheckpointFormat::TorchZip);
        assert!(state.contains_key("layer.weight"));
        assert!(state.contains_key("layer.bias"));
    }

    #[test]
    fn safetensors_header_exposes_dtype_and_shape() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.safetensors");
        fs::write(&path, safetensors_file()).unwrap();

        let state = expect_state_dict(PytorchLoader.load(&path).unwrap());
        assert_eq!(state.format, CheckpointFormat::Safetensors);
        let weight = &state.tensors["layer.weight"];
        assert_eq!(weight.dtype.as_deref(), Some("F32"));
        assert_eq!(weight.shape.as_deref(), Some(&[2, 10][..]));
    }

    #[test]
    fn bare_pickle_state_dict_is_accepted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("legacy.pt");
        fs::write(&path, state_dict_pickle()).unwrap();

        let state = expect_state_dict(PytorchLoader.load(&path).unwrap());
        assert_eq!(state.format, CheckpointFormat::Pickle);
        assert_eq!(state.keys().collect::<Vec<_>>(), ["layer.bias", "layer.weight"]);
    }

    #[test]
    fn zip_without_index_entry_fails() {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("weights.bin", SimpleFileOptions::default())
            .unwrap();
        zip.write_all(&[0u8; 4]).unwrap();
        let bytes = zip.finish().unwrap().into_inner();

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.pt");
        fs::write(&path, bytes).unwrap();

        let err = PytorchLoader.load(&path).unwrap_err();
        assert!(err.to_string().contains("data.pkl"));
    }

    #[test]
    fn foreign_bytes_fail_with_load_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.pt");
        fs::write(&path, "dummy model data").unwrap();

        assert!(matches!(
            PytorchLoader.load(&path),
            Err(Error::Load { .. })
        ));
    }
}
