//! Build script for sparmat
//!
//! Compiles the native CUDA kernels to PTX when the `cuda` feature is
//! enabled. The PTX modules are loaded at runtime by the CUDA executor.
//!
//! # Requirements
//!
//! - CUDA Toolkit (nvcc compiler), compute capability 7.0+ (sm_70)
//! - `CUDA_PATH` may point at a custom CUDA installation

fn main() {
    #[cfg(feature = "cuda")]
    compile_cuda_kernels();

    #[cfg(feature = "hip-real")]
    link_hip_runtime();
}

#[cfg(feature = "hip-real")]
fn link_hip_runtime() {
    if let Ok(rocm) = std::env::var("ROCM_PATH").or_else(|_| std::env::var("HIP_PATH")) {
        println!("cargo:rustc-link-search=native={}/lib", rocm);
        println!("cargo:rustc-link-search=native={}/lib64", rocm);
    }
    println!("cargo:rustc-link-lib=dylib=amdhip64");
}

#[cfg(feature = "cuda")]
fn compile_cuda_kernels() {
    use std::env;
    use std::path::PathBuf;
    use std::process::Command;

    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let kernels_dir = PathBuf::from("src/executor/cuda/kernels");

    let kernel_files = ["sparse.cu"];

    let nvcc = env::var("CUDA_PATH")
        .map(|p| format!("{}/bin/nvcc", p))
        .unwrap_or_else(|_| "nvcc".to_string());

    for file in kernel_files {
        let src = kernels_dir.join(file);
        let stem = src.file_stem().unwrap().to_string_lossy().to_string();
        let ptx = out_dir.join(format!("{}.ptx", stem));

        println!("cargo:rerun-if-changed={}", src.display());

        let status = Command::new(&nvcc)
            .args(["-ptx", "-O3", "--std=c++17", "-arch=sm_70", "-o"])
            .arg(&ptx)
            .arg(&src)
            .status()
            .unwrap_or_else(|e| panic!("failed to run nvcc for {}: {}", src.display(), e));

        if !status.success() {
            panic!("nvcc failed for {}", src.display());
        }
    }

    println!("cargo:rustc-env=CUDA_KERNEL_DIR={}", out_dir.display());
    println!("cargo:rerun-if-env-changed=CUDA_PATH");
}
