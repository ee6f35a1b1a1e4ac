//! Tensor operations with hand-written backward passes
//!
//! All forward functions take NCHW activation batches. 1x1 convolution is
//! expressed as a per-pixel linear map so both directions reduce to small
//! matrix products.

use crate::error::{Error, Result};
use ndarray::{Array1, Array2, Array4, ArrayD, ArrayView1, ArrayView2, Ix1, Ix2, Zip};

/// Gradients produced by [`conv1x1_backward`]
pub struct Conv1x1Grads {
    pub d_input: Array4<f32>,
    pub d_weight: ArrayD<f32>,
    pub d_bias: ArrayD<f32>,
}

fn weight_view<'a>(weight: &'a ArrayD<f32>, in_c: usize) -> Result<ArrayView2<'a, f32>> {
    let w2 = weight
        .view()
        .into_dimensionality::<Ix2>()
        .map_err(|_| Error::InvalidArgument(format!(
            "conv1x1 weight must be 2-D [out, in], got shape {:?}",
            weight.shape()
        )))?;
    if w2.ncols() != in_c {
        return Err(Error::ShapeMismatch {
            expected: vec![w2.nrows(), in_c],
            got: weight.shape().to_vec(),
        });
    }
    Ok(w2)
}

fn bias_view<'a>(bias: &'a ArrayD<f32>, out_c: usize) -> Result<ArrayView1<'a, f32>> {
    let b1 = bias
        .view()
        .into_dimensionality::<Ix1>()
        .map_err(|_| Error::InvalidArgument(format!(
            "conv1x1 bias must be 1-D, got shape {:?}",
            bias.shape()
        )))?;
    if b1.len() != out_c {
        return Err(Error::ShapeMismatch {
            expected: vec![out_c],
            got: bias.shape().to_vec(),
        });
    }
    Ok(b1)
}

/// 1x1 convolution: `out[n, o, h, w] = sum_i weight[o, i] * input[n, i, h, w] + bias[o]`
pub fn conv1x1_forward(
    input: &Array4<f32>,
    weight: &ArrayD<f32>,
    bias: &ArrayD<f32>,
) -> Result<Array4<f32>> {
    let (n, in_c, h, w) = input.dim();
    let w2 = weight_view(weight, in_c)?;
    let out_c = w2.nrows();
    let b1 = bias_view(bias, out_c)?;

    let hw = h * w;
    let mut out = Array4::zeros((n, out_c, h, w));
    for bn in 0..n {
        let x2 = Array2::from_shape_fn((in_c, hw), |(c, p)| input[[bn, c, p / w, p % w]]);
        let y2 = w2.dot(&x2);
        for c in 0..out_c {
            let b = b1[c];
            for p in 0..hw {
                out[[bn, c, p / w, p % w]] = y2[[c, p]] + b;
            }
        }
    }
    Ok(out)
}

/// Backward pass of [`conv1x1_forward`]
///
/// Returns the gradient with respect to the input and to both parameters;
/// the parameter gradients are summed over the batch.
pub fn conv1x1_backward(
    input: &Array4<f32>,
    weight: &ArrayD<f32>,
    d_out: &Array4<f32>,
) -> Result<Conv1x1Grads> {
    let (n, in_c, h, w) = input.dim();
    let w2 = weight_view(weight, in_c)?;
    let out_c = w2.nrows();
    if d_out.dim() != (n, out_c, h, w) {
        return Err(Error::ShapeMismatch {
            expected: vec![n, out_c, h, w],
            got: d_out.shape().to_vec(),
        });
    }

    let hw = h * w;
    let mut d_weight = Array2::<f32>::zeros((out_c, in_c));
    let mut d_bias = Array1::<f32>::zeros(out_c);
    let mut d_input = Array4::zeros((n, in_c, h, w));
    for bn in 0..n {
        let x2 = Array2::from_shape_fn((in_c, hw), |(c, p)| input[[bn, c, p / w, p % w]]);
        let g2 = Array2::from_shape_fn((out_c, hw), |(c, p)| d_out[[bn, c, p / w, p % w]]);

        d_weight += &g2.dot(&x2.t());
        for c in 0..out_c {
            d_bias[c] += g2.row(c).sum();
        }

        let dx2 = w2.t().dot(&g2);
        for c in 0..in_c {
            for p in 0..hw {
                d_input[[bn, c, p / w, p % w]] = dx2[[c, p]];
            }
        }
    }

    Ok(Conv1x1Grads {
        d_input,
        d_weight: d_weight.into_dyn(),
        d_bias: d_bias.into_dyn(),
    })
}

/// Elementwise rectified linear unit
pub fn relu(x: &Array4<f32>) -> Array4<f32> {
    x.mapv(|v| v.max(0.0))
}

/// Backward pass of [`relu`], given the forward input
pub fn relu_backward(input: &Array4<f32>, d_out: &Array4<f32>) -> Array4<f32> {
    Zip::from(input)
        .and(d_out)
        .map_collect(|&x, &g| if x > 0.0 { g } else { 0.0 })
}

/// Elementwise logistic sigmoid
pub fn sigmoid(x: &Array4<f32>) -> Array4<f32> {
    x.mapv(|v| 1.0 / (1.0 + (-v).exp()))
}

/// Backward pass of [`sigmoid`], given the forward output
pub fn sigmoid_backward(output: &Array4<f32>, d_out: &Array4<f32>) -> Array4<f32> {
    Zip::from(output)
        .and(d_out)
        .map_collect(|&y, &g| g * y * (1.0 - y))
}
