//! Backend selection
//!
//! The default build runs on the CPU via the NdArray backend. Enabling the
//! `cuda` cargo feature swaps the whole stack over to `burn-cuda`. Device
//! choice is made once at startup and never changes mid-run.

use burn::backend::Autodiff;
use burn::tensor::backend::Backend;

#[cfg(feature = "cuda")]
pub type DefaultBackend = burn_cuda::Cuda;

#[cfg(not(feature = "cuda"))]
pub type DefaultBackend = burn::backend::NdArray;

/// The autodiff backend used for training
pub type TrainingBackend = Autodiff<DefaultBackend>;

/// Select the compute device from the `--gpu` flag.
///
/// With the `cuda` feature this returns the first GPU. Without it, asking
/// for the GPU logs a warning and falls back to the CPU.
pub fn select_device(gpu: bool) -> <DefaultBackend as Backend>::Device {
    #[cfg(feature = "cuda")]
    {
        if !gpu {
            tracing::info!("CUDA build always runs on the GPU; ignoring missing --gpu flag");
        }
        burn_cuda::CudaDevice::default()
    }

    #[cfg(not(feature = "cuda"))]
    {
        if gpu {
            tracing::warn!("GPU requested but this build has no CUDA support, using CPU");
        }
        Default::default()
    }
}

/// Human-readable name for the active backend
pub fn backend_name() -> &'static str {
    #[cfg(feature = "cuda")]
    {
        "CUDA (GPU)"
    }

    #[cfg(not(feature = "cuda"))]
    {
        "NdArray (CPU)"
    }
}
