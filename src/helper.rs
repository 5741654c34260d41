use burn::tensor::{activation::relu, backend::Backend, Tensor};

use crate::error::{Error, Result};

/// `log(1 + exp(x))` without overflow for large `|x|`.
pub fn softplus<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    relu(x.clone()) + x.abs().neg().exp().log1p()
}

/// Copies a `[rows, cols]` tensor to host memory, one `Vec` per row.
pub fn tensor_rows<B: Backend>(x: Tensor<B, 2>) -> Result<Vec<Vec<f32>>> {
    let [_, n_col] = x.dims();
    let values = x
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| Error::data(format!("cannot read tensor values: {e:?}")))?;

    if n_col == 0 {
        return Ok(Vec::new());
    }
    Ok(values.chunks(n_col).map(<[f32]>::to_vec).collect())
}

/// Index of the largest entry of each row.
pub fn argmax_rows(rows: &[Vec<f32>]) -> Vec<usize> {
    rows.iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
                .0
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::TensorData;

    type TestBackend = NdArray<f32>;

    #[test]
    fn softplus_matches_closed_form() {
        let x = Tensor::<TestBackend, 1>::from_data(
            TensorData::new(vec![-30.0f32, 0.0, 2.0, 50.0], [4]),
            &Default::default(),
        );
        let y = softplus(x).into_data().convert::<f32>().to_vec::<f32>().unwrap();

        assert!(y[0] >= 0.0 && y[0] < 1e-6);
        assert!((y[1] - 2.0f32.ln()).abs() < 1e-6);
        assert!((y[2] - (1.0 + 2.0f32.exp()).ln()).abs() < 1e-5);
        assert!((y[3] - 50.0).abs() < 1e-4);
    }

    #[test]
    fn rows_and_argmax() {
        let x = Tensor::<TestBackend, 2>::from_data(
            TensorData::new(vec![0.1f32, 0.7, 0.2, 0.9, 0.05, 0.05], [2, 3]),
            &Default::default(),
        );
        let rows = tensor_rows(x).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(argmax_rows(&rows), vec![1, 0]);
    }
}
