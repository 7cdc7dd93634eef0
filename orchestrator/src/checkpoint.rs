use std::{collections::HashMap, fs, path::Path};

use log::debug;
use machine_learning::arch::models::ModelKind;
use safetensors::{
    SafeTensors,
    tensor::{Dtype, TensorView},
};

use crate::{OrchestratorError, Result};

const TENSOR: &str = "params";

/// Writes the model's parameters as a safetensors file with a single `params` tensor.
///
/// The file is first written next to `path` and then renamed over it, so an interrupted
/// save never leaves a truncated checkpoint behind.
pub fn save(path: &Path, kind: ModelKind, params: &[f32]) -> Result<()> {
    let bytes: &[u8] = bytemuck::cast_slice(params);
    let view = TensorView::new(Dtype::F32, vec![params.len()], bytes)?;
    let metadata = HashMap::from([
        ("model".to_string(), kind.name().to_string()),
        ("params".to_string(), params.len().to_string()),
    ]);
    let serialized = safetensors::serialize([(TENSOR, view)], &Some(metadata))?;

    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    fs::write(&tmp, serialized)?;
    fs::rename(&tmp, path)?;

    debug!("saved checkpoint: path={} model={kind}", path.display());
    Ok(())
}

/// Reads the parameters saved by `save`.
///
/// # Errors
/// `Checkpoint` when the file was saved by another architecture or holds a different amount
/// of parameters, `Io` when it can't be read.
pub fn load(path: &Path, kind: ModelKind, expected_len: usize) -> Result<Vec<f32>> {
    let buffer = fs::read(path)?;

    let (_, metadata) = SafeTensors::read_metadata(&buffer)?;
    let saved_model = metadata
        .metadata()
        .as_ref()
        .and_then(|m| m.get("model"))
        .map(String::as_str);
    if saved_model != Some(kind.name()) {
        return Err(OrchestratorError::Checkpoint(format!(
            "{} holds a {} model, expected {kind}",
            path.display(),
            saved_model.unwrap_or("unnamed")
        )));
    }

    let tensors = SafeTensors::deserialize(&buffer)?;
    let tensor = tensors.tensor(TENSOR)?;
    if tensor.dtype() != Dtype::F32 {
        return Err(OrchestratorError::Checkpoint(format!(
            "{} stores {:?} parameters",
            path.display(),
            tensor.dtype()
        )));
    }

    let params: Vec<f32> = bytemuck::pod_collect_to_vec(tensor.data());
    if params.len() != expected_len {
        return Err(OrchestratorError::Checkpoint(format!(
            "{} holds {} parameters, expected {expected_len}",
            path.display(),
            params.len()
        )));
    }

    debug!("loaded checkpoint: path={} model={kind}", path.display());
    Ok(params)
}
