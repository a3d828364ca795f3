//! Tensor-core kernel-name whitelist
//!
//! Usage is inferred from kernel-name substring matching, not hardware
//! telemetry. The substrings cover the cuDNN/cuBLAS tensor-core kernel
//! naming across GPU generations.

const WHITELIST: [&str; 18] = [
    "h884",
    "s884",
    "h1688",
    "s1688",
    "hmma",
    "i8816",
    "16816",
    "dgrad_1x1_stride_2x2",
    "first_layer_wgrad_kernel",
    "conv1x1",
    "conv2d_c1_k1",
    "direct_group",
    "xmma_implicit_gemm",
    "xmma_sparse_conv",
    "xmma_warp_specialized_implicit_gemm",
    "xmma_gemm",
    "xmma_sparse_gemm",
    "c1688",
];

/// Whether a kernel name matches a known tensor-core kernel pattern
pub fn is_tensor_core_kernel(name: &str) -> bool {
    WHITELIST.iter().any(|pattern| name.contains(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_known_patterns() {
        assert!(is_tensor_core_kernel("volta_h884gemm_128x64_nn"));
        assert!(is_tensor_core_kernel("turing_fp16_s1688gemm_fp16_128x128_ldg8_nn"));
        assert!(is_tensor_core_kernel("xmma_gemm_f16f16_f16f32_tn"));
    }

    #[test]
    fn test_rejects_plain_kernels() {
        assert!(!is_tensor_core_kernel("volta_sgemm_128x64_nn"));
        assert!(!is_tensor_core_kernel("vectorized_elementwise_kernel"));
    }
}
