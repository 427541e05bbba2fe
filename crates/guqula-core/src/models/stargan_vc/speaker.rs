//! One-hot speaker condition vectors.

use candle_core::{Device, Tensor};

use crate::error::{Error, Result};

/// Build a `[batch, num_speakers]` one-hot f32 tensor from speaker ids.
pub fn one_hot(ids: &[usize], num_speakers: usize, device: &Device) -> Result<Tensor> {
    if num_speakers == 0 {
        return Err(Error::InvalidInput("num_speakers must be nonzero".into()));
    }
    let mut data = vec![0f32; ids.len() * num_speakers];
    for (row, &id) in ids.iter().enumerate() {
        if id >= num_speakers {
            return Err(Error::InvalidInput(format!(
                "speaker id {id} out of range for {num_speakers} speakers"
            )));
        }
        data[row * num_speakers + id] = 1.0;
    }
    Ok(Tensor::from_vec(data, (ids.len(), num_speakers), device)?)
}

/// Validate a source/target condition pair and concatenate it into the
/// `[batch, 2 * num_speakers]` style vector both networks consume.
pub fn concat_condition(
    source: &Tensor,
    target: &Tensor,
    batch: usize,
    num_speakers: usize,
) -> Result<Tensor> {
    for (name, condition) in [("source", source), ("target", target)] {
        let (rows, width) = condition.dims2()?;
        if rows != batch || width != num_speakers {
            return Err(Error::InvalidInput(format!(
                "{name} condition must be [{batch}, {num_speakers}], got {:?}",
                condition.dims()
            )));
        }
    }
    Ok(Tensor::cat(&[source, target], 1)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_hot_sets_single_index_per_row() {
        let t = one_hot(&[0, 2], 3, &Device::Cpu).unwrap();
        assert_eq!(t.dims(), &[2, 3]);
        let values = t.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(values, vec![1.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn one_hot_rejects_out_of_range_id() {
        let err = one_hot(&[3], 3, &Device::Cpu).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn concat_condition_widens_to_double_speakers() {
        let device = Device::Cpu;
        let src = one_hot(&[1], 3, &device).unwrap();
        let tgt = one_hot(&[2], 3, &device).unwrap();
        let style = concat_condition(&src, &tgt, 1, 3).unwrap();
        assert_eq!(style.dims(), &[1, 6]);
        let values = style.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(values, vec![0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn concat_condition_rejects_batch_mismatch() {
        let device = Device::Cpu;
        let src = one_hot(&[1, 0], 3, &device).unwrap();
        let tgt = one_hot(&[2], 3, &device).unwrap();
        let err = concat_condition(&src, &tgt, 2, 3).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
